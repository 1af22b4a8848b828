use serde_json::{json, Map, Value};

use super::{non_blank, selected_values, CurrentFilter, FilterConfig, FilterType, FilterValues};
use crate::error::Result;
use crate::index::list::ProductList;

/// Select any number of related objects. Pre-selected objects may be given
/// as ids or as `{"id": ..}` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiSelectRelation;

pub(super) fn object_id(value: Value) -> Value {
    match value {
        Value::Object(mut object) => object.remove("id").unwrap_or(Value::Null),
        other => other,
    }
}

impl FilterType for MultiSelectRelation {
    fn add_condition(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        mut current: CurrentFilter,
        params: &Map<String, Value>,
        _is_precondition: bool,
    ) -> Result<CurrentFilter> {
        let field = filter.field.as_str();
        let value = match selected_values(filter, params) {
            Value::Array(items) => Value::Array(items.into_iter().map(object_id).collect()),
            other => other,
        };
        current.insert(field.to_string(), value.clone());

        let values = non_blank(&value);
        if values.is_empty() {
            return Ok(current);
        }
        if filter.use_and_condition {
            for value in values {
                list.add_relation_condition(field, value);
            }
        } else {
            let mapped = list.tenant_config().field_name_mapped(field, false);
            list.add_relation_condition(field, json!({"terms": { mapped: values }}));
        }
        Ok(current)
    }

    fn prepare_group_by_values(&self, filter: &FilterConfig, list: &mut ProductList) -> Result<()> {
        list.prepare_group_by_relation_values(&filter.field, true, !filter.use_and_condition);
        Ok(())
    }

    fn filter_values(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        current: &CurrentFilter,
    ) -> Result<FilterValues> {
        Ok(FilterValues {
            fieldname: filter.field.clone(),
            current_value: current.get(&filter.field).cloned().unwrap_or(Value::Null),
            values: list.group_by_relation_values(&filter.field, !filter.use_and_condition)?,
        })
    }
}
