use serde_json::{json, Map, Value};

use super::{non_blank, selected_values, CurrentFilter, FilterConfig, FilterType, FilterValues};
use crate::error::Result;
use crate::index::list::ProductList;

/// Select any number of values of an attribute.
///
/// Values are OR-ed in a single `terms` clause unless the filter uses the AND
/// condition, in which case every value becomes its own condition and the
/// facet keeps the field's filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiSelect;

impl FilterType for MultiSelect {
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

        let mut values = non_blank(&value);
        if values.is_empty() {
            return Ok(current);
        }

        let config = list.tenant_config().clone();
        let boolean = config
            .attribute(field)
            .and_then(|a| a.column_type())
            .is_some_and(|t| t == "boolean");
        if boolean {
            values = values.into_iter().map(|_| Value::Bool(true)).collect();
        }

        if filter.use_and_condition {
            for value in values {
                list.add_condition(value, field);
            }
        } else {
            let mapped = config.field_name_mapped(field, false);
            list.add_condition(json!({"terms": { mapped: values }}), field);
        }
        Ok(current)
    }

    fn prepare_group_by_values(&self, filter: &FilterConfig, list: &mut ProductList) -> Result<()> {
        list.prepare_group_by_values(&filter.field, true, !filter.use_and_condition);
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
            values: list.group_by_values(&filter.field, !filter.use_and_condition)?,
        })
    }
}
