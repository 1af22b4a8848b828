//! Configuration commands.

use anyhow::{bail, Result};
use serde_json::json;

use super::{ConfigArgs, ConfigCommand};
use crate::context::Context;

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Validate => validate(ctx),
    }
}

fn show(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "path": ctx.config_path,
            "config": ctx.config,
        }));
        return Ok(());
    }

    ctx.output.header("Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(none, using defaults)"),
    }

    ctx.output.header("Tenants");
    if ctx.config.tenants.is_empty() {
        ctx.output.info("No tenants configured");
    }
    for definition in &ctx.config.tenants {
        match definition.build() {
            Ok(config) => {
                ctx.output.list_item(
                    0,
                    &format!("{} ({:?}, index {})", config.tenant_name(), config.worker_kind(), config.index_name()),
                );
                ctx.output
                    .list_item(1, &format!("{} attributes", config.attributes().len()));
                if !config.search_attributes().is_empty() {
                    ctx.output
                        .list_item(1, &format!("search: {}", config.search_attributes().join(", ")));
                }
                let tables = config.tables();
                ctx.output
                    .list_item(1, &format!("tables: {}, {}", tables.table, tables.relation_table));
            }
            Err(e) => ctx
                .output
                .list_item(0, &format!("{}: {}", definition.name, console::style(e).red())),
        }
    }

    ctx.output.header("Pricing");
    ctx.output
        .kv("rules", ctx.config.pricing.rules.as_deref().unwrap_or("(not set)"));
    ctx.output
        .kv("env", ctx.config.pricing.env.as_deref().unwrap_or("(not set)"));

    ctx.output.header("Index");
    ctx.output
        .kv("schema", ctx.config.index.schema.as_deref().unwrap_or("(empty)"));
    ctx.output.kv(
        "change log dir",
        ctx.config.index.change_log_dir.as_deref().unwrap_or("(per tenant)"),
    );
    Ok(())
}

fn validate(ctx: &Context) -> Result<()> {
    let mut errors = Vec::new();
    for definition in &ctx.config.tenants {
        match definition.build() {
            Ok(_) => ctx.output.success(&format!("Tenant '{}'", definition.name)),
            Err(e) => {
                ctx.output.error(&format!("Tenant '{}': {}", definition.name, e));
                errors.push(json!({"tenant": definition.name, "error": e.to_string()}));
            }
        }
    }

    for (what, path) in [
        ("rules", ctx.config.pricing.rules.as_deref()),
        ("env", ctx.config.pricing.env.as_deref()),
        ("schema", ctx.config.index.schema.as_deref()),
    ] {
        if let Some(path) = path {
            if !ctx.resolve_path(path).is_file() {
                ctx.output.warn(&format!("{} file not found: {}", what, path));
            }
        }
    }

    if ctx.output.is_json() {
        ctx.output
            .json(&json!({"tenants": ctx.config.tenants.len(), "errors": errors}));
    }
    if !errors.is_empty() {
        bail!("{} invalid tenant(s)", errors.len());
    }
    ctx.output.success("Configuration is valid");
    Ok(())
}
