//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tracing::debug;

use crate::config::CliConfig;
use crate::output::Output;

/// Config file names, searched from the working directory upwards.
const CONFIG_NAMES: [&str; 3] = ["turbo.toml", ".turbo.toml", "turbo.json"];

/// Execution context for CLI commands.
pub struct Context {
    pub config: CliConfig,
    /// File the config was read from, if any.
    pub config_path: Option<PathBuf>,
    pub output: Output,
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, config_path) = match config_path {
            Some(path) => (CliConfig::load(Path::new(path))?, Some(PathBuf::from(path))),
            None => match find_config(&cwd) {
                Some(path) => (CliConfig::load(&path)?, Some(path)),
                None => (CliConfig::default(), None),
            },
        };
        debug!(config = ?config_path, tenants = config.tenants.len(), "loaded cli config");

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.cwd.join(path)
        }
    }

    /// Path given on the command line, else the one from the config file.
    pub fn path_or_config(&self, arg: Option<&str>, configured: Option<&str>, what: &str) -> Result<PathBuf> {
        arg.or(configured)
            .map(|path| self.resolve_path(path))
            .with_context(|| format!("No {what} file given and none configured"))
    }
}

/// Find a config file in the directory tree above `start`.
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if !current.pop() {
            return None;
        }
    }
}
