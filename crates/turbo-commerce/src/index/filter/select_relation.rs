use serde_json::{Map, Value};

use super::multi_select_relation::object_id;
use super::{is_blank, selected_value, CurrentFilter, FilterConfig, FilterType, FilterValues};
use crate::error::Result;
use crate::index::list::ProductList;

/// Select one related object. A pre-selected object may be given as id or as
/// `{"id": ..}` document.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectRelation;

impl FilterType for SelectRelation {
    fn add_condition(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        mut current: CurrentFilter,
        params: &Map<String, Value>,
        _is_precondition: bool,
    ) -> Result<CurrentFilter> {
        let value = object_id(selected_value(filter, params));
        current.insert(filter.field.clone(), value.clone());
        if !is_blank(&value) {
            list.add_relation_condition(&filter.field, value);
        }
        Ok(current)
    }

    fn prepare_group_by_values(&self, filter: &FilterConfig, list: &mut ProductList) -> Result<()> {
        list.prepare_group_by_relation_values(&filter.field, true, true);
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
            values: list.group_by_relation_values(&filter.field, true)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::{Attribute, ObjectRelations};
    use crate::index::config::TenantConfig;
    use crate::index::list::IndexCondition;
    use serde_json::json;
    use std::sync::Arc;

    fn list() -> ProductList {
        let config = TenantConfig::builder("shop")
            .attribute(Attribute::new("brand").with_interpreter(Arc::new(ObjectRelations), Map::new()))
            .build()
            .unwrap();
        ProductList::new(Arc::new(config))
    }

    #[test]
    fn test_pre_selected_object() {
        let mut list = list();
        let filter = FilterConfig::new("SelectRelation", "brand").with_pre_select(json!({"id": 7}));
        let current = SelectRelation
            .add_condition(&filter, &mut list, CurrentFilter::new(), &Map::new(), false)
            .unwrap();
        assert_eq!(current["brand"], json!(7));
        assert_eq!(
            list.relation_conditions().get("brand"),
            Some(&[IndexCondition::from(7)][..])
        );

        SelectRelation.prepare_group_by_values(&filter, &mut list).unwrap();
        assert!(list.prepared_group_by()["relations.brand"].exclude);
    }

    #[test]
    fn test_request_value_wins() {
        let mut list = list();
        let filter = FilterConfig::new("SelectRelation", "brand").with_pre_select(json!(7));
        let params = json!({"brand": 3});
        SelectRelation
            .add_condition(&filter, &mut list, CurrentFilter::new(), params.as_object().unwrap(), false)
            .unwrap();
        assert_eq!(
            list.relation_conditions().get("brand"),
            Some(&[IndexCondition::from(3)][..])
        );
        assert!(list.filter_conditions().is_empty());
    }
}
