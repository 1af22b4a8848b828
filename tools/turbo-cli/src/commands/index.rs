//! Relational index structure commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use serde_json::json;
use turbo_commerce::index::config::WorkerKind;
use turbo_commerce::index::{IndexService, MySqlWorker, TableNames, TenantDefinition, Worker};
use turbo_db::{Db, SchemaSnapshot, SnapshotConnection};

use super::{IndexArgs, IndexCommand};
use crate::config::read;
use crate::context::Context;

/// Run the index command.
pub fn run(args: IndexArgs, ctx: &Context) -> Result<()> {
    match args.command {
        IndexCommand::Plan {
            tenant,
            schema,
            write,
            schema_out,
        } => plan(
            tenant.as_deref(),
            schema.as_deref(),
            write.as_ref().map(|dir| dir.as_deref()),
            schema_out.as_deref(),
            ctx,
        ),
    }
}

/// Relational tenants selected for planning.
fn mysql_tenants<'a>(tenant: Option<&str>, ctx: &'a Context) -> Result<Vec<&'a TenantDefinition>> {
    let mut selected = Vec::new();
    for definition in &ctx.config.tenants {
        if tenant.is_some_and(|name| name != definition.name) {
            continue;
        }
        if definition.worker != WorkerKind::MySql {
            ctx.output
                .warn(&format!("Tenant '{}' has no relational index, skipping", definition.name));
            continue;
        }
        selected.push(definition);
    }
    if selected.is_empty() {
        match tenant {
            Some(name) => bail!("Tenant '{}' is not a configured mysql tenant", name),
            None => bail!("No mysql tenants configured"),
        }
    }
    Ok(selected)
}

fn plan(
    tenant: Option<&str>,
    schema: Option<&str>,
    write: Option<Option<&str>>,
    schema_out: Option<&str>,
    ctx: &Context,
) -> Result<()> {
    let definitions = mysql_tenants(tenant, ctx)?;

    let snapshot = match schema.or(ctx.config.index.schema.as_deref()) {
        Some(path) => read::<SchemaSnapshot>(&ctx.resolve_path(path))?,
        None => SchemaSnapshot::default(),
    };
    let conn = Arc::new(SnapshotConnection::new(snapshot));

    let writing = write.is_some();
    let log_dir: Option<PathBuf> = match write {
        Some(Some(dir)) => Some(ctx.resolve_path(dir)),
        Some(None) => ctx.config.index.change_log_dir.as_deref().map(|dir| ctx.resolve_path(dir)),
        None => None,
    };

    let mut service = IndexService::new();
    let mut workers = Vec::new();
    for definition in definitions {
        let mut definition = definition.clone();
        // Change log file names only carry a timestamp, so every tenant
        // gets a directory of its own.
        if let Some(dir) = &log_dir {
            let dir = dir.join(definition.name.to_lowercase());
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create change log directory: {}", dir.display()))?;
            let mut tables = definition
                .tables
                .clone()
                .unwrap_or_else(|| TableNames::for_tenant(&definition.name));
            tables.change_log_dir = Some(dir);
            definition.tables = Some(tables);
        }
        let config = definition
            .build()
            .with_context(|| format!("Invalid configuration for tenant '{}'", definition.name))?;
        let worker = Arc::new(MySqlWorker::new(Arc::new(config), Db::from_arc(conn.clone())));
        service.register(worker.clone() as Arc<dyn Worker>)?;
        workers.push(worker);
    }

    let pb = ctx.output.progress(workers.len() as u64, "Planning index structures");
    let mut planned = Vec::new();
    let mut failed = Vec::new();
    for worker in &workers {
        let name = worker.tenant_config().tenant_name().to_string();
        pb.set_message(name.clone());
        let report = service.create_or_update_index_structures(Some(&name))?;
        failed.extend(report.failed);

        let statements = if writing {
            let count = worker.helper().change_log().len();
            let path = worker.helper().flush_change_log()?;
            json!({"tenant": name, "statements": count, "changeLog": path})
        } else {
            json!({"tenant": name, "statements": worker.helper().take_change_log()})
        };
        planned.push(statements);
        pb.inc(1);
    }
    pb.finish_and_clear();

    if let Some(path) = schema_out {
        let path = ctx.resolve_path(path);
        std::fs::write(&path, serde_json::to_string_pretty(&conn.schema())?)
            .with_context(|| format!("Failed to write schema: {}", path.display()))?;
        ctx.output.info(&format!("Schema written to {}", path.display()));
    }

    if ctx.output.is_json() {
        let failed: Vec<_> = failed
            .iter()
            .map(|(tenant, error)| json!({"tenant": tenant, "error": error}))
            .collect();
        ctx.output.json(&json!({"tenants": planned, "failed": failed}));
    } else {
        for entry in &planned {
            let name = entry["tenant"].as_str().unwrap_or_default();
            ctx.output.header(&format!("Tenant {}", name));
            if let Some(statements) = entry["statements"].as_array() {
                if statements.is_empty() {
                    ctx.output.success("Index structures are up to date");
                }
                for statement in statements.iter().filter_map(|s| s.as_str()) {
                    ctx.output.sql(statement);
                }
            } else if let Some(path) = entry["changeLog"].as_str() {
                ctx.output.success(&format!(
                    "{} statements written to {}",
                    entry["statements"], path
                ));
            } else {
                ctx.output.success("Index structures are up to date");
            }
        }
        for (tenant, error) in &failed {
            ctx.output.error(&format!("{}: {}", tenant, error));
        }
    }

    if !failed.is_empty() {
        bail!("{} tenant(s) failed", failed.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;
    use crate::output::Output;

    fn context(dir: &std::path::Path) -> Context {
        let config: CliConfig = serde_json::from_value(json!({
            "tenants": [
                {"name": "Shop", "worker": "mysql", "attributes": [{"name": "name", "type": "varchar(255)"}]},
                {"name": "Search", "worker": "opensearch"}
            ]
        }))
        .unwrap();
        Context {
            config,
            config_path: None,
            output: Output::new(false, true),
            cwd: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_mysql_tenants_skips_search_tenants() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let tenants = mysql_tenants(None, &ctx).unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].name, "Shop");
        assert!(mysql_tenants(Some("Search"), &ctx).is_err());
    }

    #[test]
    fn test_plan_writes_change_log_per_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        plan(None, None, Some(Some("logs")), Some("schema.json"), &ctx).unwrap();

        let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs").join("shop"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(logs.len(), 1);
        let sql = std::fs::read_to_string(&logs[0]).unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS `ecommerceframework_productindex_shop`"));

        let schema: SchemaSnapshot = read(&dir.path().join("schema.json")).unwrap();
        assert!(schema.tables.contains_key("ecommerceframework_productindex_shop"));
    }
}
