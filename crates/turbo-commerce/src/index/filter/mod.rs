//! Filter types that turn request parameters into product list conditions.
//!
//! A [`FilterDefinition`] lists the filters shown to the user and the
//! preconditions that always apply. [`FilterService::init_filter_service`]
//! applies both to a [`ProductList`] and prepares the facets the filters
//! display.

mod multi_select;
mod multi_select_from_multi_select;
mod multi_select_relation;
mod number_range;
mod select;
mod select_relation;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CommerceError, Result};
use crate::index::list::{GroupByValue, ProductList};

pub use multi_select::MultiSelect;
pub use multi_select_from_multi_select::MultiSelectFromMultiSelect;
pub use multi_select_relation::MultiSelectRelation;
pub use number_range::NumberRange;
pub use select::Select;
pub use select_relation::SelectRelation;

/// Parameter value that selects "no value" and clears the filter.
pub const EMPTY_STRING: &str = "$$EMPTY$$";

/// Request parameter marking a reload, which suppresses pre-selections.
pub const RELOAD_PARAM: &str = "is_reload";

/// Current value of each filter, keyed by field.
pub type CurrentFilter = Map<String, Value>;

/// One filter of a [`FilterDefinition`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub field: String,
    /// Comma separated list or array of values selected when the request has none.
    #[serde(default)]
    pub pre_select: Option<Value>,
    #[serde(default)]
    pub use_and_condition: bool,
    #[serde(default)]
    pub pre_select_from: Option<Value>,
    #[serde(default)]
    pub pre_select_to: Option<Value>,
}

impl FilterConfig {
    pub fn new(filter_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            filter_type: filter_type.into(),
            field: field.into(),
            ..Self::default()
        }
    }

    pub fn with_pre_select(mut self, pre_select: Value) -> Self {
        self.pre_select = Some(pre_select);
        self
    }

    pub fn with_and_condition(mut self) -> Self {
        self.use_and_condition = true;
        self
    }

    pub fn with_pre_select_range(mut self, from: Value, to: Value) -> Self {
        self.pre_select_from = Some(from);
        self.pre_select_to = Some(to);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    /// Preconditions, applied without request parameters.
    #[serde(default)]
    pub conditions: Vec<FilterConfig>,
}

/// What a filter displays: its current value and the available values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterValues {
    pub fieldname: String,
    pub current_value: Value,
    pub values: Vec<GroupByValue>,
}

pub trait FilterType: Send + Sync {
    /// Add the filter's condition to `list` and record its value in `current`.
    fn add_condition(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        current: CurrentFilter,
        params: &Map<String, Value>,
        is_precondition: bool,
    ) -> Result<CurrentFilter>;

    /// Register the facet the filter displays.
    fn prepare_group_by_values(&self, filter: &FilterConfig, list: &mut ProductList) -> Result<()>;

    fn filter_values(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        current: &CurrentFilter,
    ) -> Result<FilterValues>;
}

/// Registry of filter types by name.
#[derive(Default)]
pub struct FilterService {
    types: BTreeMap<String, Arc<dyn FilterType>>,
}

impl fmt::Debug for FilterService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterService")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FilterService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in filter type, registered under its type name.
    pub fn with_defaults() -> Self {
        let mut service = Self::new();
        service.register("MultiSelect", Arc::new(MultiSelect));
        service.register("MultiSelectFromMultiSelect", Arc::new(MultiSelectFromMultiSelect));
        service.register("MultiSelectRelation", Arc::new(MultiSelectRelation));
        service.register("NumberRange", Arc::new(NumberRange));
        service.register("Select", Arc::new(Select));
        service.register("SelectRelation", Arc::new(SelectRelation));
        service
    }

    pub fn register(&mut self, name: impl Into<String>, filter_type: Arc<dyn FilterType>) {
        self.types.insert(name.into(), filter_type);
    }

    pub fn filter_type(&self, name: &str) -> Result<&Arc<dyn FilterType>> {
        self.types
            .get(name)
            .ok_or_else(|| CommerceError::UnknownFilterType(name.to_string()))
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Apply all filters and preconditions of `definition` to `list` and
    /// return the current value of every filter.
    ///
    /// Facets are prepared only after every filter condition is in place.
    pub fn init_filter_service(
        &self,
        definition: &FilterDefinition,
        list: &mut ProductList,
        params: &Map<String, Value>,
    ) -> Result<CurrentFilter> {
        let mut current = CurrentFilter::new();
        for filter in &definition.filters {
            current = self.add_condition(filter, list, current, params, false)?;
        }
        for filter in &definition.filters {
            self.filter_type(&filter.filter_type)?
                .prepare_group_by_values(filter, list)?;
        }

        // Preconditions do not show up in the current filter.
        let no_params = Map::new();
        for condition in &definition.conditions {
            self.add_condition(condition, list, current.clone(), &no_params, true)?;
        }
        Ok(current)
    }

    pub fn add_condition(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        current: CurrentFilter,
        params: &Map<String, Value>,
        is_precondition: bool,
    ) -> Result<CurrentFilter> {
        self.filter_type(&filter.filter_type)?
            .add_condition(filter, list, current, params, is_precondition)
    }

    pub fn filter_values(
        &self,
        filter: &FilterConfig,
        list: &mut ProductList,
        current: &CurrentFilter,
    ) -> Result<FilterValues> {
        self.filter_type(&filter.filter_type)?
            .filter_values(filter, list, current)
    }
}

/// Whether a parameter value counts as not set: null, false, zero, `""`,
/// `"0"` and empty collections.
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Selected values of a multi value filter: the request parameter, else the
/// pre-selection unless the request is a reload. Selecting [`EMPTY_STRING`]
/// clears the selection.
pub(crate) fn selected_values(filter: &FilterConfig, params: &Map<String, Value>) -> Value {
    let value = match params.get(&filter.field) {
        Some(v) if !is_blank(v) && !v.is_array() => Value::Array(vec![v.clone()]),
        Some(v) => v.clone(),
        None => Value::Null,
    };
    let is_reload = params.get(RELOAD_PARAM).is_some_and(|v| !is_blank(v));

    if is_blank(&value) && !is_reload {
        match &filter.pre_select {
            Some(Value::String(pre)) if !pre.is_empty() => {
                Value::Array(pre.split(',').map(|s| Value::String(s.to_string())).collect())
            }
            Some(Value::Array(pre)) if !pre.is_empty() => Value::Array(pre.clone()),
            Some(pre @ Value::Number(_)) => Value::Array(vec![pre.clone()]),
            _ => value,
        }
    } else if value
        .as_array()
        .is_some_and(|items| items.iter().any(|v| v.as_str() == Some(EMPTY_STRING)))
    {
        Value::Null
    } else {
        value
    }
}

/// Selected value of a single value filter, following the rules of
/// [`selected_values`]. Lists keep their first non blank entry and strings
/// are trimmed.
pub(crate) fn selected_value(filter: &FilterConfig, params: &Map<String, Value>) -> Value {
    let value = match params.get(&filter.field) {
        Some(Value::Array(items)) => items.iter().find(|v| !is_blank(v)).cloned().unwrap_or(Value::Null),
        Some(v) => v.clone(),
        None => Value::Null,
    };
    let is_reload = params.get(RELOAD_PARAM).is_some_and(|v| !is_blank(v));

    let value = if value.as_str() == Some(EMPTY_STRING) {
        Value::Null
    } else if is_blank(&value) && !is_reload {
        filter.pre_select.clone().unwrap_or(value)
    } else {
        value
    };
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}

/// The non blank entries of a selection.
pub(crate) fn non_blank(value: &Value) -> Vec<Value> {
    value
        .as_array()
        .map(|items| items.iter().filter(|v| !is_blank(v)).cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::Attribute;
    use crate::index::config::TenantConfig;
    use crate::index::list::IndexCondition;
    use serde_json::json;

    fn list() -> ProductList {
        let config = TenantConfig::builder("shop")
            .attribute(Attribute::new("color"))
            .attribute(Attribute::new("size"))
            .attribute(Attribute::new("price").with_type("double"))
            .build()
            .unwrap();
        ProductList::new(Arc::new(config))
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_unknown_filter_type() {
        let service = FilterService::with_defaults();
        let definition = FilterDefinition {
            filters: vec![FilterConfig::new("Slider", "price")],
            conditions: vec![],
        };
        let err = service
            .init_filter_service(&definition, &mut list(), &Map::new())
            .unwrap_err();
        assert!(matches!(err, CommerceError::UnknownFilterType(name) if name == "Slider"));
    }

    #[test]
    fn test_init_applies_filters_facets_and_preconditions() {
        let service = FilterService::with_defaults();
        let definition = FilterDefinition {
            filters: vec![
                FilterConfig::new("MultiSelect", "color"),
                FilterConfig::new("NumberRange", "price"),
            ],
            conditions: vec![FilterConfig::new("MultiSelect", "size").with_pre_select(json!("M,L"))],
        };
        let mut list = list();
        let current = service
            .init_filter_service(
                &definition,
                &mut list,
                &params(json!({"color": "red", "price": {"from": 10, "to": ""}})),
            )
            .unwrap();

        assert_eq!(current["color"], json!(["red"]));
        assert_eq!(current["price"], json!({"from": 10, "to": ""}));
        assert!(!current.contains_key("size"));

        assert_eq!(
            list.filter_conditions().get("color"),
            Some(&[IndexCondition::Clause(json!({"terms": {"attributes.color": ["red"]}}))][..])
        );
        assert_eq!(
            list.filter_conditions().get("price"),
            Some(&[IndexCondition::Clause(json!({"range": {"attributes.price": {"gte": 10}}}))][..])
        );
        assert_eq!(
            list.filter_conditions().get("size"),
            Some(&[IndexCondition::Clause(json!({"terms": {"attributes.size": ["M", "L"]}}))][..])
        );

        let prepared = list.prepared_group_by();
        assert!(prepared["attributes.color"].exclude);
        assert!(prepared["attributes.price"].exclude);
        assert!(!prepared.contains_key("attributes.size"));
    }

    #[test]
    fn test_selected_values() {
        let filter = FilterConfig::new("MultiSelect", "color").with_pre_select(json!("0"));
        assert_eq!(selected_values(&filter, &Map::new()), json!(["0"]));
        assert_eq!(
            selected_values(&filter, &params(json!({"is_reload": 1}))),
            Value::Null
        );
        assert_eq!(
            selected_values(&filter, &params(json!({"color": ["red", EMPTY_STRING]}))),
            Value::Null
        );
        assert_eq!(
            selected_values(&filter, &params(json!({"color": "blue"}))),
            json!(["blue"])
        );
        assert_eq!(non_blank(&json!(["", "0", "red", null])), vec![json!("red")]);
    }

    #[test]
    fn test_selected_value() {
        let filter = FilterConfig::new("Select", "color").with_pre_select(json!("blue"));
        assert_eq!(selected_value(&filter, &Map::new()), json!("blue"));
        assert_eq!(selected_value(&filter, &params(json!({"color": ["", " red"]}))), json!("red"));
        assert_eq!(selected_value(&filter, &params(json!({"color": EMPTY_STRING}))), Value::Null);
        assert_eq!(selected_value(&filter, &params(json!({"is_reload": true}))), Value::Null);
    }

    #[test]
    fn test_default_types() {
        let service = FilterService::with_defaults();
        assert_eq!(
            service.type_names().collect::<Vec<_>>(),
            vec![
                "MultiSelect",
                "MultiSelectFromMultiSelect",
                "MultiSelectRelation",
                "NumberRange",
                "Select",
                "SelectRelation"
            ]
        );
    }

    #[test]
    fn test_definition_from_json() {
        let definition: FilterDefinition = serde_json::from_value(json!({
            "filters": [{"type": "MultiSelect", "field": "color", "useAndCondition": true}],
            "conditions": [{"type": "NumberRange", "field": "price", "preSelectFrom": 5, "preSelectTo": 50}]
        }))
        .unwrap();
        assert!(definition.filters[0].use_and_condition);
        assert_eq!(definition.conditions[0].pre_select_to, Some(json!(50)));
    }
}
