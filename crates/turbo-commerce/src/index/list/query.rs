//! Compiles a product list into a search request.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use super::{IndexCondition, OrderKey, ProductList, VariantMode};
use crate::index::attribute::ObjectKind;

/// Set `value` at `path`, creating (or replacing non-object) intermediate nodes.
pub(crate) fn set_path(target: &mut Value, path: &[&str], value: Value) {
    let mut node = target;
    for key in path {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else { return };
        node = map.entry(key.to_string()).or_insert(Value::Null);
    }
    *node = value;
}

impl ProductList {
    /// Search request for the current page: `index`, total hit tracking and
    /// the request `body`.
    pub fn query(&self) -> Value {
        let none = HashSet::new();
        let mut bool_filters = self.system_conditions();
        bool_filters.extend(self.filter_clauses(&none));
        bool_filters.extend(self.relation_clauses(&none));
        let query_filters = self.query_clauses();

        let mut body = Map::new();
        body.insert("_source".to_string(), Value::Bool(true));
        if let Some(limit) = self.limit {
            body.insert("size".to_string(), Value::from(limit));
        }
        body.insert("from".to_string(), Value::from(self.offset));
        if let Some(sort) = self.sort_clause() {
            body.insert("sort".to_string(), sort);
        }
        if !self.search_aggregation.is_empty() {
            body.insert("aggs".to_string(), Value::Object(self.search_aggregation.clone()));
        }

        let mut request = json!({
            "index": self.config.index_name(),
            "track_total_hits": true,
            "rest_total_hits_as_int": true,
            "body": body,
        });
        self.build_query(&mut request, bool_filters, query_filters, self.variant_mode);
        request
    }

    fn sort_clause(&self) -> Option<Value> {
        match self.order_key.as_ref()? {
            OrderKey::Advanced { advanced_sort } => Some(advanced_sort.clone()),
            OrderKey::Fields(fields) if fields.is_empty() => None,
            OrderKey::Fields(fields) => Some(Value::Array(
                fields
                    .iter()
                    .map(|(field, direction)| {
                        json!({ self.config.field_name_mapped(field, false): direction.unwrap_or_default().as_str() })
                    })
                    .collect(),
            )),
            OrderKey::Field(field) if field.is_empty() => None,
            OrderKey::Field(field) => Some(json!([
                { self.config.field_name_mapped(field, false): self.order.unwrap_or_default().as_str() }
            ])),
        }
    }

    /// Conditions every request carries: activity, product list membership,
    /// the sub tenant and the category.
    pub(super) fn system_conditions(&self) -> Vec<Value> {
        let mut filters = vec![
            json!({"term": {"system.active": true}}),
            json!({"term": {"system.virtualProductActive": true}}),
        ];
        if self.in_product_list {
            filters.push(json!({"term": {"system.inProductList": true}}));
        }
        if let Some(condition) = self.config.sub_tenant_condition() {
            filters.push(condition.clone());
        }
        if let Some(category) = self.category {
            filters.push(json!({"term": {"system.parentCategoryIds": category.get()}}));
        }
        filters
    }

    pub(super) fn filter_clauses(&self, excluded: &HashSet<String>) -> Vec<Value> {
        let mut clauses = Vec::new();
        for (field, conditions) in self.filter_conditions.iter() {
            if excluded.contains(field) {
                continue;
            }
            for condition in conditions {
                clauses.push(match condition {
                    IndexCondition::Clause(clause) => clause.clone(),
                    IndexCondition::Literal(value) => {
                        json!({"term": { self.config.field_name_mapped(field, true): value }})
                    }
                });
            }
        }
        clauses
    }

    pub(super) fn relation_clauses(&self, excluded: &HashSet<String>) -> Vec<Value> {
        let mut clauses = Vec::new();
        for (field, conditions) in self.relation_conditions.iter() {
            if excluded.contains(field) {
                continue;
            }
            for condition in conditions {
                clauses.push(match condition {
                    IndexCondition::Clause(clause) => clause.clone(),
                    IndexCondition::Literal(value) => {
                        json!({"term": { self.config.field_name_mapped(field, false): value }})
                    }
                });
            }
        }
        clauses
    }

    pub(super) fn query_clauses(&self) -> Vec<Value> {
        let mut clauses = Vec::new();
        for (field, conditions) in self.query_conditions.iter() {
            for condition in conditions {
                clauses.push(match condition {
                    IndexCondition::Clause(clause) => clause.clone(),
                    IndexCondition::Literal(value) if field.is_empty() => {
                        let fields: Vec<String> = self
                            .config
                            .search_attributes()
                            .iter()
                            .map(|name| self.config.field_name_mapped(name, true))
                            .collect();
                        json!({"multi_match": {"query": value, "fields": fields}})
                    }
                    IndexCondition::Literal(value) => {
                        json!({"match": { self.config.field_name_mapped(field, false): value }})
                    }
                });
            }
        }
        clauses
    }

    /// Put filters and queries into `request.body.query` according to `mode`.
    pub(super) fn build_query(
        &self,
        request: &mut Value,
        mut bool_filters: Vec<Value>,
        query_filters: Vec<Value>,
        mode: VariantMode,
    ) {
        match mode {
            VariantMode::IncludeParentObject => {
                let has_child = json!({
                    "type": ObjectKind::Variant.as_str(),
                    "score_mode": "avg",
                    "query": {
                        "bool": {
                            "must": query_filters,
                            "filter": {"bool": {"must": bool_filters}},
                        }
                    },
                    "inner_hits": {"name": "variants", "_source": false, "size": 100},
                });
                set_path(request, &["body", "query", "bool", "must", "has_child"], has_child);
            }
            _ => {
                match mode {
                    VariantMode::VariantsOnly => {
                        bool_filters.push(json!({"term": {"type": ObjectKind::Variant.as_str()}}))
                    }
                    VariantMode::Hide => {
                        bool_filters.push(json!({"term": {"type": ObjectKind::Object.as_str()}}))
                    }
                    _ => {}
                }
                set_path(
                    request,
                    &["body", "query", "bool", "must", "bool", "must"],
                    Value::Array(query_filters),
                );
                set_path(
                    request,
                    &["body", "query", "bool", "filter", "bool", "must"],
                    Value::Array(bool_filters),
                );
            }
        }
    }
}
