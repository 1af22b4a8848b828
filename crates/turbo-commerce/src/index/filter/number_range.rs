use serde_json::{json, Map, Value};

use super::{is_blank, CurrentFilter, FilterConfig, FilterType, FilterValues};
use crate::error::Result;
use crate::index::list::ProductList;

/// Numeric range given as `{"from": .., "to": ..}`, either bound optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberRange;

fn bound_is_set(bound: &Value) -> bool {
    match bound {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

impl FilterType for NumberRange {
    fn add_condition(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        mut current: CurrentFilter,
        params: &Map<String, Value>,
        _is_precondition: bool,
    ) -> Result<CurrentFilter> {
        let field = filter.field.as_str();
        let value = match params.get(field) {
            Some(v) if !is_blank(v) => v.clone(),
            _ => json!({
                "from": filter.pre_select_from.clone().unwrap_or(Value::Null),
                "to": filter.pre_select_to.clone().unwrap_or(Value::Null),
            }),
        };
        current.insert(field.to_string(), value.clone());

        let from = value.get("from").unwrap_or(&Value::Null);
        let to = value.get("to").unwrap_or(&Value::Null);
        if !bound_is_set(from) && !bound_is_set(to) {
            return Ok(current);
        }

        let mut range = Map::new();
        if bound_is_set(from) {
            range.insert("gte".to_string(), from.clone());
        }
        if bound_is_set(to) {
            range.insert("lte".to_string(), to.clone());
        }
        let mapped = list.tenant_config().field_name_mapped(field, false);
        list.add_condition(json!({"range": { mapped: range }}), field);
        Ok(current)
    }

    fn prepare_group_by_values(&self, filter: &FilterConfig, list: &mut ProductList) -> Result<()> {
        list.prepare_group_by_values(&filter.field, true, true);
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
            values: list.group_by_values(&filter.field, true)?,
        })
    }
}
