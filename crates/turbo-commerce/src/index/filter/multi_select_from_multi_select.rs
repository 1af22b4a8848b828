use serde_json::{json, Map, Value};

use super::{non_blank, selected_values, CurrentFilter, FilterConfig, FilterType, FilterValues};
use crate::error::Result;
use crate::index::list::{GroupByValue, ProductList};

/// Select any number of values of a multi value attribute.
///
/// Every selected value becomes a `term` clause. With the AND condition each
/// clause is its own condition, otherwise one of them has to match.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiSelectFromMultiSelect;

impl FilterType for MultiSelectFromMultiSelect {
    fn add_condition(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        mut current: CurrentFilter,
        params: &Map<String, Value>,
        _is_precondition: bool,
    ) -> Result<CurrentFilter> {
        let field = filter.field.as_str();
        let value = selected_values(filter, params);
        current.insert(field.to_string(), value.clone());

        let values = non_blank(&value);
        if values.is_empty() {
            return Ok(current);
        }

        let mapped = format!("attributes.{field}");
        let terms = values.into_iter().map(|value| json!({"term": { mapped.as_str(): value }}));
        if filter.use_and_condition {
            for term in terms {
                list.add_condition(term, field);
            }
        } else {
            let should: Vec<Value> = terms.collect();
            list.add_condition(json!({"bool": {"should": should, "minimum_should_match": 1}}), field);
        }
        Ok(current)
    }

    fn prepare_group_by_values(&self, filter: &FilterConfig, list: &mut ProductList) -> Result<()> {
        list.prepare_group_by_values(&filter.field, true, !filter.use_and_condition);
        Ok(())
    }

    /// Facet values, with comma joined keys split into single values.
    fn filter_values(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        current: &CurrentFilter,
    ) -> Result<FilterValues> {
        let raw = list.group_by_values(&filter.field, !filter.use_and_condition)?;
        Ok(FilterValues {
            fieldname: filter.field.clone(),
            current_value: current.get(&filter.field).cloned().unwrap_or(Value::Null),
            values: split_values(raw),
        })
    }
}

fn split_values(raw: Vec<GroupByValue>) -> Vec<GroupByValue> {
    let mut values: Vec<GroupByValue> = Vec::new();
    for entry in raw {
        let parts: Vec<Value> = match &entry.value {
            Value::String(joined) => joined
                .split(',')
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
            other => vec![other.clone()],
        };
        for part in parts {
            match values.iter_mut().find(|v| v.value == part) {
                Some(existing) => existing.count += entry.count,
                None => values.push(GroupByValue::new(part, entry.count)),
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::Attribute;
    use crate::index::config::TenantConfig;
    use crate::index::list::IndexCondition;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn list() -> ProductList {
        let config = TenantConfig::builder("shop")
            .attribute(Attribute::new("features"))
            .build()
            .unwrap();
        ProductList::new(Arc::new(config))
    }

    #[test]
    fn test_or_condition_needs_one_match() {
        let mut list = list();
        let filter = FilterConfig::new("MultiSelectFromMultiSelect", "features");
        let params = json!({"features": ["wifi", "", "gps"]});
        let current = MultiSelectFromMultiSelect
            .add_condition(&filter, &mut list, CurrentFilter::new(), params.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(current["features"], json!(["wifi", "", "gps"]));
        assert_eq!(
            list.filter_conditions().get("features"),
            Some(
                &[IndexCondition::Clause(json!({"bool": {
                    "should": [
                        {"term": {"attributes.features": "wifi"}},
                        {"term": {"attributes.features": "gps"}}
                    ],
                    "minimum_should_match": 1
                }}))][..]
            )
        );

        MultiSelectFromMultiSelect.prepare_group_by_values(&filter, &mut list).unwrap();
        assert!(list.prepared_group_by()["attributes.features"].exclude);
    }

    #[test]
    fn test_and_condition_adds_one_term_per_value() {
        let mut list = list();
        let filter = FilterConfig::new("MultiSelectFromMultiSelect", "features")
            .with_and_condition()
            .with_pre_select(json!("wifi,gps"));
        MultiSelectFromMultiSelect
            .add_condition(&filter, &mut list, CurrentFilter::new(), &Map::new(), false)
            .unwrap();
        assert_eq!(
            list.filter_conditions().get("features"),
            Some(
                &[
                    IndexCondition::Clause(json!({"term": {"attributes.features": "wifi"}})),
                    IndexCondition::Clause(json!({"term": {"attributes.features": "gps"}})),
                ][..]
            )
        );

        MultiSelectFromMultiSelect.prepare_group_by_values(&filter, &mut list).unwrap();
        assert!(!list.prepared_group_by()["attributes.features"].exclude);
    }

    #[test]
    fn test_empty_selection_adds_nothing() {
        let mut list = list();
        let filter = FilterConfig::new("MultiSelectFromMultiSelect", "features");
        let params = json!({"features": ["wifi", "$$EMPTY$$"]});
        let current = MultiSelectFromMultiSelect
            .add_condition(&filter, &mut list, CurrentFilter::new(), params.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(current["features"], Value::Null);
        assert!(list.filter_conditions().is_empty());
    }

    #[test]
    fn test_joined_keys_are_split_and_counted() {
        let values = split_values(vec![
            GroupByValue::new(json!(",wifi,gps,"), 2),
            GroupByValue::new(json!("gps"), 3),
            GroupByValue::new(json!(5), 1),
        ]);
        assert_eq!(
            values,
            vec![
                GroupByValue::new(json!("wifi"), 2),
                GroupByValue::new(json!("gps"), 5),
                GroupByValue::new(json!(5), 1),
            ]
        );
    }
}
