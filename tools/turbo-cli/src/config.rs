//! CLI configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use turbo_commerce::index::{TenantConfig, TenantDefinition};

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Product index tenants.
    #[serde(default)]
    pub tenants: Vec<TenantDefinition>,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub index: IndexConfig,
}

impl CliConfig {
    /// Load config from a file, JSON or TOML by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse(path, &content)
    }

    pub fn tenant(&self, name: &str) -> Result<TenantConfig> {
        let definition = self
            .tenants
            .iter()
            .find(|t| t.name == name)
            .with_context(|| format!("Tenant '{}' is not configured", name))?;
        definition
            .build()
            .with_context(|| format!("Invalid configuration for tenant '{}'", name))
    }
}

/// Parse `content` as JSON or TOML, picked by the extension of `path`.
pub fn parse<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> Result<T> {
    if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(content)
            .with_context(|| format!("Failed to parse JSON: {}", path.display()))
    } else {
        toml::from_str(content).with_context(|| format!("Failed to parse TOML: {}", path.display()))
    }
}

/// Read and parse a JSON or TOML file.
pub fn read<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    parse(path, &content)
}

/// Default inputs of the `rules` commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Rule documents.
    #[serde(default)]
    pub rules: Option<String>,

    /// Environment document.
    #[serde(default)]
    pub env: Option<String>,
}

/// Default inputs of the `index` commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Schema snapshot to plan against.
    #[serde(default)]
    pub schema: Option<String>,

    /// Where planned DDL is written.
    #[serde(default)]
    pub change_log_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_config() {
        let config: CliConfig = parse(
            Path::new("turbo.toml"),
            r#"
[pricing]
rules = "rules.json"

[[tenants]]
name = "shop"
worker = "mysql"
searchAttributes = ["name"]

[[tenants.attributes]]
name = "name"
type = "varchar(255)"
"#,
        )
        .unwrap();
        assert_eq!(config.pricing.rules.as_deref(), Some("rules.json"));
        let shop = config.tenant("shop").unwrap();
        assert_eq!(shop.search_attributes(), ["name".to_string()]);
        assert!(config.tenant("outlet").is_err());
    }

    #[test]
    fn test_parse_json_by_extension() {
        let config: CliConfig =
            parse(Path::new("turbo.json"), r#"{"index": {"schema": "schema.json"}}"#).unwrap();
        assert_eq!(config.index.schema.as_deref(), Some("schema.json"));
        assert!(config.tenants.is_empty());
    }
}
