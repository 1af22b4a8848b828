//! Product list query commands.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use turbo_commerce::ids::CategoryId;
use turbo_commerce::index::{FilterDefinition, OrderKey, ProductList, SortDirection, VariantMode};

use super::{QueryArgs, QueryCommand};
use crate::config::read;
use crate::context::Context;

/// Run the query command.
pub fn run(args: QueryArgs, ctx: &Context) -> Result<()> {
    match args.command {
        QueryCommand::Build { tenant, list } => build(&tenant, &list, ctx),
    }
}

#[derive(Debug, Deserialize)]
struct FieldCondition {
    field: String,
    condition: Value,
}

#[derive(Debug, Deserialize)]
struct GroupBy {
    field: String,
    #[serde(default)]
    relation: bool,
    #[serde(default = "default_true")]
    exclude: bool,
}

fn default_true() -> bool {
    true
}

/// A product list as described in a file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDescription {
    #[serde(default)]
    conditions: Vec<FieldCondition>,
    #[serde(default)]
    relation_conditions: Vec<FieldCondition>,
    #[serde(default)]
    query_conditions: Vec<FieldCondition>,
    #[serde(default)]
    variant_mode: VariantMode,
    #[serde(default)]
    category: Option<CategoryId>,
    #[serde(default)]
    in_product_list: bool,
    #[serde(default)]
    order_key: Option<OrderKey>,
    #[serde(default)]
    order: Option<SortDirection>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    group_by: Vec<GroupBy>,
    #[serde(default)]
    filters: Option<FilterDefinition>,
    /// Request parameters the filters read their values from.
    #[serde(default)]
    params: Map<String, Value>,
}

impl ListDescription {
    fn apply(&self, list: &mut ProductList) {
        for c in &self.conditions {
            list.add_condition(c.condition.clone(), &c.field);
        }
        for c in &self.relation_conditions {
            list.add_relation_condition(&c.field, c.condition.clone());
        }
        for c in &self.query_conditions {
            list.add_query_condition(c.condition.clone(), &c.field);
        }
        list.set_variant_mode(self.variant_mode);
        list.set_category(self.category);
        list.set_in_product_list(self.in_product_list);
        if let Some(key) = &self.order_key {
            list.set_order_key(key.clone());
        }
        if let Some(order) = self.order {
            list.set_order(order);
        }
        if let Some(limit) = self.limit {
            list.set_limit(limit);
        }
        if let Some(offset) = self.offset {
            list.set_offset(offset);
        }
        for group in &self.group_by {
            if group.relation {
                list.prepare_group_by_relation_values(&group.field, true, group.exclude);
            } else {
                list.prepare_group_by_values(&group.field, true, group.exclude);
            }
        }
    }
}

fn build(tenant: &str, list_path: &str, ctx: &Context) -> Result<()> {
    let config = Arc::new(ctx.config.tenant(tenant)?);
    let description: ListDescription = read(&ctx.resolve_path(list_path))?;

    let mut list = ProductList::new(config.clone());
    description.apply(&mut list);

    let current = match &description.filters {
        Some(filters) => config
            .filter_service()
            .init_filter_service(filters, &mut list, &description.params)
            .context("Failed to apply filters")?,
        None => Map::new(),
    };

    let requests = json!({
        "index": config.index_name(),
        "search": list.query(),
        "facets": list.group_by_query(),
        "currentFilter": current,
    });

    if ctx.output.is_json() {
        ctx.output.json(&requests);
        return Ok(());
    }

    ctx.output.header(&format!("Search request for {}", config.index_name()));
    ctx.output.block(&serde_json::to_string_pretty(&requests["search"])?);
    if let Some(facets) = requests["facets"].as_object() {
        ctx.output.header("Facet request");
        ctx.output.block(&serde_json::to_string_pretty(facets)?);
    }
    if !current.is_empty() {
        ctx.output.header("Current filter");
        for (field, value) in &current {
            ctx.output.kv(field, &value.to_string());
        }
    }
    if list.is_scrolling() {
        ctx.output.info("Unlimited list: results are scrolled in pages");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use turbo_commerce::index::TenantConfig;

    #[test]
    fn test_apply_description() {
        let description: ListDescription = serde_json::from_value(json!({
            "conditions": [{"field": "color", "condition": "red"}],
            "variantMode": "hide",
            "category": 7,
            "orderKey": "name",
            "order": "DESC",
            "limit": 20,
            "offset": 40,
            "groupBy": [{"field": "color"}]
        }))
        .unwrap();
        assert!(description.group_by[0].exclude);

        let config = Arc::new(TenantConfig::builder("shop").build().unwrap());
        let mut list = ProductList::new(config);
        description.apply(&mut list);

        assert_eq!(list.variant_mode(), VariantMode::Hide);
        assert_eq!(list.category(), Some(CategoryId::new(7)));
        assert_eq!(list.order(), Some(SortDirection::Desc));
        assert_eq!(list.limit(), Some(20));
        assert_eq!(list.offset(), 40);
        assert!(list.filter_conditions().get("color").is_some());
        assert!(list.prepared_group_by().contains_key("color"));
    }
}
