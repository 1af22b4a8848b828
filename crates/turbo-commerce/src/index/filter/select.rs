use serde_json::{Map, Value};

use super::{is_blank, selected_value, CurrentFilter, FilterConfig, FilterType, FilterValues};
use crate::error::Result;
use crate::index::list::ProductList;

/// Select one value of an attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct Select;

impl FilterType for Select {
    fn add_condition(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        mut current: CurrentFilter,
        params: &Map<String, Value>,
        _is_precondition: bool,
    ) -> Result<CurrentFilter> {
        let value = selected_value(filter, params);
        current.insert(filter.field.clone(), value.clone());
        if !is_blank(&value) {
            list.add_condition(value, &filter.field);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::Attribute;
    use crate::index::config::TenantConfig;
    use crate::index::list::IndexCondition;
    use serde_json::json;
    use std::sync::Arc;

    fn list() -> ProductList {
        let config = TenantConfig::builder("shop")
            .attribute(Attribute::new("color"))
            .build()
            .unwrap();
        ProductList::new(Arc::new(config))
    }

    #[test]
    fn test_selected_value_becomes_term() {
        let mut list = list();
        let filter = FilterConfig::new("Select", "color").with_pre_select(json!("blue"));
        let params = json!({"color": " red "});
        let current = Select
            .add_condition(&filter, &mut list, CurrentFilter::new(), params.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(current["color"], json!("red"));
        assert_eq!(
            list.filter_conditions().get("color"),
            Some(&[IndexCondition::from("red")][..])
        );

        Select.prepare_group_by_values(&filter, &mut list).unwrap();
        assert!(list.prepared_group_by()["attributes.color"].exclude);
    }

    #[test]
    fn test_pre_select_unless_reload() {
        let filter = FilterConfig::new("Select", "color").with_pre_select(json!("blue"));

        let mut first = list();
        let current = Select
            .add_condition(&filter, &mut first, CurrentFilter::new(), &Map::new(), false)
            .unwrap();
        assert_eq!(current["color"], json!("blue"));
        assert_eq!(
            first.filter_conditions().get("color"),
            Some(&[IndexCondition::from("blue")][..])
        );

        let mut reloaded = list();
        let params = json!({"is_reload": "1"});
        let current = Select
            .add_condition(&filter, &mut reloaded, CurrentFilter::new(), params.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(current["color"], Value::Null);
        assert!(reloaded.filter_conditions().is_empty());
    }

    #[test]
    fn test_empty_string_clears_pre_select() {
        let mut list = list();
        let filter = FilterConfig::new("Select", "color").with_pre_select(json!("blue"));
        let params = json!({"color": "$$EMPTY$$"});
        let current = Select
            .add_condition(&filter, &mut list, CurrentFilter::new(), params.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(current["color"], Value::Null);
        assert!(list.filter_conditions().is_empty());
    }
}
