//! Product list backed by a search index.
//!
//! The list collects conditions, sorting and paging, compiles them into a
//! search request ([`query`]), loads matching products as mockups and computes
//! facet values ([`facets`]).

mod facets;
mod query;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{CommerceError, Result};
use crate::ids::{CategoryId, ProductId};
use crate::index::backend::{BackendError, Hit, SearchBackend, SearchResponse};
use crate::index::config::TenantConfig;
use crate::index::mockup::{ProductMockup, RelationRef};
use crate::price_system::PriceSystemLocator;

pub use facets::{GroupByValue, PreparedGroupBy};
pub(crate) use query::set_path;

/// Page size used while scrolling through an unlimited list.
pub const SCROLL_PAGE_SIZE: usize = 100;

/// Largest window the index serves in one request.
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// `set_limit` value that loads every match by scrolling.
pub const LIMIT_UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = CommerceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(CommerceError::InvalidDocument(format!("unknown sort direction \"{other}\""))),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of products and variants a list returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantMode {
    /// Products and variants alike.
    #[default]
    Include,
    /// Products only.
    Hide,
    VariantsOnly,
    /// Products that have a matching variant, with the variants as inner hits.
    IncludeParentObject,
}

/// A condition on one field.
///
/// Literals become a `term` (or `match`) on the mapped field name. Clauses
/// are complete query DSL fragments and go into the request as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum IndexCondition {
    Literal(Value),
    Clause(Value),
}

impl IndexCondition {
    pub fn clause(clause: Value) -> Self {
        IndexCondition::Clause(clause)
    }
}

impl From<Value> for IndexCondition {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => IndexCondition::Clause(value),
            other => IndexCondition::Literal(other),
        }
    }
}

impl From<IndexCondition> for Value {
    fn from(condition: IndexCondition) -> Self {
        match condition {
            IndexCondition::Literal(v) | IndexCondition::Clause(v) => v,
        }
    }
}

impl From<&str> for IndexCondition {
    fn from(value: &str) -> Self {
        IndexCondition::Literal(Value::from(value))
    }
}

impl From<String> for IndexCondition {
    fn from(value: String) -> Self {
        IndexCondition::Literal(Value::from(value))
    }
}

impl From<i32> for IndexCondition {
    fn from(value: i32) -> Self {
        IndexCondition::Literal(Value::from(value))
    }
}

impl From<i64> for IndexCondition {
    fn from(value: i64) -> Self {
        IndexCondition::Literal(Value::from(value))
    }
}

impl From<f64> for IndexCondition {
    fn from(value: f64) -> Self {
        IndexCondition::Literal(Value::from(value))
    }
}

impl From<bool> for IndexCondition {
    fn from(value: bool) -> Self {
        IndexCondition::Literal(Value::from(value))
    }
}

/// Conditions grouped by field name, fields in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionBuckets {
    buckets: Vec<(String, Vec<IndexCondition>)>,
}

impl ConditionBuckets {
    pub fn push(&mut self, field: &str, condition: IndexCondition) {
        match self.buckets.iter_mut().find(|(f, _)| f == field) {
            Some((_, conditions)) => conditions.push(condition),
            None => self.buckets.push((field.to_string(), vec![condition])),
        }
    }

    pub fn remove(&mut self, field: &str) {
        self.buckets.retain(|(f, _)| f != field);
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[IndexCondition]> {
        self.buckets
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, c)| c.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|(f, _)| f.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[IndexCondition])> {
        self.buckets.iter().map(|(f, c)| (f.as_str(), c.as_slice()))
    }
}

/// Sort order of a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderKey {
    /// One field, direction from [`ProductList::set_order`].
    Field(String),
    /// Several fields, each with its own direction.
    Fields(Vec<(String, Option<SortDirection>)>),
    /// Sort clause passed through untouched.
    Advanced { advanced_sort: Value },
}

impl OrderKey {
    pub const PRICE: &'static str = "price";

    pub fn field(name: impl Into<String>) -> Self {
        OrderKey::Field(name.into())
    }

    pub fn is_price(&self) -> bool {
        matches!(self, OrderKey::Field(name) if name == Self::PRICE)
    }
}

/// Product list of one tenant.
pub struct ProductList {
    config: Arc<TenantConfig>,
    backend: Option<Arc<dyn SearchBackend>>,
    price_systems: Option<Arc<dyn PriceSystemLocator>>,

    filter_conditions: ConditionBuckets,
    relation_conditions: ConditionBuckets,
    query_conditions: ConditionBuckets,
    price_from: Option<f64>,
    price_to: Option<f64>,
    category: Option<CategoryId>,
    in_product_list: bool,
    variant_mode: VariantMode,
    order_key: Option<OrderKey>,
    order: Option<SortDirection>,
    order_by_price: bool,
    limit: Option<usize>,
    offset: usize,
    scroll: bool,
    scroll_keep_alive: String,
    search_aggregation: Map<String, Value>,

    products: Option<Vec<ProductMockup>>,
    total_count: Option<u64>,
    hit_data: HashMap<ProductId, Hit>,
    position_map: HashMap<ProductId, usize>,

    prepared_group_by: BTreeMap<String, PreparedGroupBy>,
    prepared_group_by_results: HashMap<String, Vec<GroupByValue>>,
    prepared_loaded: bool,
}

impl fmt::Debug for ProductList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductList")
            .field("tenant", &self.config.tenant_name())
            .field("filter_conditions", &self.filter_conditions)
            .field("relation_conditions", &self.relation_conditions)
            .field("query_conditions", &self.query_conditions)
            .field("variant_mode", &self.variant_mode)
            .field("order_key", &self.order_key)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("loaded", &self.products.is_some())
            .finish_non_exhaustive()
    }
}

impl ProductList {
    pub fn new(config: Arc<TenantConfig>) -> Self {
        let scroll_keep_alive = config.client().scroll_keep_alive.clone();
        Self {
            config,
            backend: None,
            price_systems: None,
            filter_conditions: ConditionBuckets::default(),
            relation_conditions: ConditionBuckets::default(),
            query_conditions: ConditionBuckets::default(),
            price_from: None,
            price_to: None,
            category: None,
            in_product_list: false,
            variant_mode: VariantMode::default(),
            order_key: None,
            order: None,
            order_by_price: false,
            limit: None,
            offset: 0,
            scroll: false,
            scroll_keep_alive,
            search_aggregation: Map::new(),
            products: None,
            total_count: None,
            hit_data: HashMap::new(),
            position_map: HashMap::new(),
            prepared_group_by: BTreeMap::new(),
            prepared_group_by_results: HashMap::new(),
            prepared_loaded: false,
        }
    }

    /// Send requests to `backend` instead of the tenant worker's backend.
    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Price systems consulted when sorting by price.
    pub fn with_price_systems(mut self, locator: Arc<dyn PriceSystemLocator>) -> Self {
        self.price_systems = Some(locator);
        self
    }

    pub fn tenant_config(&self) -> &Arc<TenantConfig> {
        &self.config
    }

    fn invalidate(&mut self) {
        self.products = None;
        self.prepared_loaded = false;
    }

    /// Add a filter condition for `field`.
    pub fn add_condition(&mut self, condition: impl Into<IndexCondition>, field: &str) {
        self.filter_conditions.push(field, condition.into());
        self.invalidate();
    }

    pub fn reset_condition(&mut self, field: &str) {
        self.filter_conditions.remove(field);
        self.invalidate();
    }

    pub fn add_relation_condition(&mut self, field: &str, condition: impl Into<IndexCondition>) {
        self.relation_conditions.push(field, condition.into());
        self.invalidate();
    }

    pub fn reset_relation_condition(&mut self, field: &str) {
        self.relation_conditions.remove(field);
        self.invalidate();
    }

    /// Add a full text condition. An empty `field` searches all search attributes.
    pub fn add_query_condition(&mut self, condition: impl Into<IndexCondition>, field: &str) {
        self.query_conditions.push(field, condition.into());
        self.invalidate();
    }

    pub fn reset_query_condition(&mut self, field: &str) {
        self.query_conditions.remove(field);
        self.invalidate();
    }

    /// Drop filter, relation and query conditions.
    pub fn reset_conditions(&mut self) {
        self.filter_conditions.clear();
        self.relation_conditions.clear();
        self.query_conditions.clear();
        self.invalidate();
    }

    pub fn filter_conditions(&self) -> &ConditionBuckets {
        &self.filter_conditions
    }

    pub fn relation_conditions(&self) -> &ConditionBuckets {
        &self.relation_conditions
    }

    pub fn query_conditions(&self) -> &ConditionBuckets {
        &self.query_conditions
    }

    pub fn add_price_condition(&mut self, from: Option<f64>, to: Option<f64>) {
        self.price_from = from;
        self.price_to = to;
        self.invalidate();
    }

    pub fn set_in_product_list(&mut self, in_product_list: bool) {
        self.in_product_list = in_product_list;
        self.invalidate();
    }

    pub fn in_product_list(&self) -> bool {
        self.in_product_list
    }

    pub fn set_category(&mut self, category: Option<CategoryId>) {
        self.category = category;
        self.invalidate();
    }

    pub fn category(&self) -> Option<CategoryId> {
        self.category
    }

    pub fn set_variant_mode(&mut self, mode: VariantMode) {
        self.variant_mode = mode;
        self.invalidate();
    }

    pub fn variant_mode(&self) -> VariantMode {
        self.variant_mode
    }

    pub fn set_order(&mut self, order: SortDirection) {
        self.order = Some(order);
        self.products = None;
    }

    pub fn order(&self) -> Option<SortDirection> {
        self.order
    }

    /// Sort key. Sorting by `"price"` is done by the price system after the search.
    pub fn set_order_key(&mut self, key: OrderKey) {
        self.order_by_price = key.is_price();
        self.order_key = Some(key);
        self.products = None;
    }

    pub fn order_key(&self) -> Option<&OrderKey> {
        self.order_key.as_ref()
    }

    /// Page size. [`LIMIT_UNLIMITED`] loads every match by scrolling in
    /// pages of [`SCROLL_PAGE_SIZE`]; other negative values clear the limit.
    pub fn set_limit(&mut self, limit: i64) {
        let (new_limit, scroll) = if limit == LIMIT_UNLIMITED {
            (Some(SCROLL_PAGE_SIZE), true)
        } else {
            (usize::try_from(limit).ok(), false)
        };
        if self.limit != new_limit || self.scroll != scroll {
            self.products = None;
        }
        self.limit = new_limit;
        self.scroll = scroll;
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn is_scrolling(&self) -> bool {
        self.scroll
    }

    pub fn set_offset(&mut self, offset: usize) {
        if self.offset != offset {
            self.products = None;
        }
        self.offset = offset;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn set_scroll_keep_alive(&mut self, keep_alive: impl Into<String>) {
        self.scroll_keep_alive = keep_alive.into();
    }

    /// Extra aggregations sent along with the product search.
    pub fn set_search_aggregation(&mut self, aggregations: Map<String, Value>) {
        self.search_aggregation = aggregations;
        self.products = None;
    }

    pub fn search_aggregation(&self) -> &Map<String, Value> {
        &self.search_aggregation
    }

    /// Products of the current page, loading them on first access.
    pub fn products(&mut self) -> Result<&[ProductMockup]> {
        if self.products.is_none() {
            self.load()?;
        }
        Ok(self.products.as_deref().unwrap_or_default())
    }

    /// Total number of matches.
    pub fn count(&mut self) -> Result<u64> {
        self.products()?;
        Ok(self.total_count.unwrap_or(0))
    }

    /// Position of each loaded product in the current page.
    pub fn product_position_map(&self) -> &HashMap<ProductId, usize> {
        &self.position_map
    }

    /// Relevance score of a loaded product, `0.0` when unknown.
    pub fn score_from_loaded_list(&self, id: ProductId) -> f64 {
        self.hit_data.get(&id).and_then(|hit| hit.score).unwrap_or(0.0)
    }

    /// Products `offset..offset + count`.
    pub fn items(&mut self, offset: usize, count: usize) -> Result<Vec<ProductMockup>> {
        self.set_offset(offset);
        self.set_limit(i64::try_from(count).unwrap_or(i64::MAX));
        Ok(self.products()?.to_vec())
    }

    /// Run the search and build the mockups of the current page.
    pub fn load(&mut self) -> Result<&[ProductMockup]> {
        let price_filtered = self.price_from.is_some() || self.price_to.is_some();
        let ids = match (self.order_by_price, price_filtered) {
            (false, false) => self.load_without_price_sorting()?,
            (true, false) => self.load_with_price_sorting()?,
            (false, true) => {
                return Err(CommerceError::UnsupportedQuery(
                    "price filtering is not supported by the search index".to_string(),
                ))
            }
            (true, true) => {
                return Err(CommerceError::UnsupportedQuery(
                    "price filtering with price sorting is not supported by the search index".to_string(),
                ))
            }
        };

        let mut products = Vec::with_capacity(ids.len());
        self.position_map.clear();
        for id in ids {
            if let Some(mockup) = self.mockup_from_hit(id) {
                self.position_map.insert(id, products.len());
                products.push(mockup);
            }
        }
        self.products = Some(products);
        Ok(self.products.as_deref().unwrap_or_default())
    }

    fn load_without_price_sorting(&mut self) -> Result<Vec<ProductId>> {
        let request = self.query();
        let response = self.send_request(request, self.scroll)?;
        Ok(self.record_hits(response))
    }

    fn load_with_price_sorting(&mut self) -> Result<Vec<ProductId>> {
        let mut request = self.query();
        if let Some(body) = request.get_mut("body").and_then(Value::as_object_mut) {
            body.remove("sort");
            body.insert("size".to_string(), Value::from(MAX_RESULT_WINDOW));
            body.insert("from".to_string(), Value::from(0));
        }
        let response = self.send_request(request, false)?;
        let ids = self.record_hits(response);

        let mut by_price_system: BTreeMap<String, Vec<ProductId>> = BTreeMap::new();
        for id in ids {
            let name = self
                .hit_data
                .get(&id)
                .and_then(|hit| hit.system("priceSystemName"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            by_price_system.entry(name).or_default().push(id);
        }

        match by_price_system.len() {
            0 => Ok(Vec::new()),
            1 => {
                let (name, ids) = by_price_system.into_iter().next().unwrap_or_default();
                let locator = self.price_systems.as_ref().ok_or_else(|| {
                    CommerceError::Configuration("no price systems configured for price sorting".to_string())
                })?;
                locator.price_system(&name)?.filter_product_ids(
                    &ids,
                    None,
                    None,
                    self.order.unwrap_or_default(),
                    self.offset,
                    self.limit,
                )
            }
            _ => Err(CommerceError::NotImplemented(
                "multiple pricing systems are not supported yet".to_string(),
            )),
        }
    }

    /// Keep the hits for mockup building and return their ids in order.
    fn record_hits(&mut self, response: SearchResponse) -> Vec<ProductId> {
        self.total_count = Some(response.total());
        self.hit_data.clear();
        let mut ids = Vec::with_capacity(response.hits.hits.len());
        for hit in response.hits.hits {
            match hit.id.parse::<ProductId>() {
                Ok(id) => {
                    ids.push(id);
                    self.hit_data.insert(id, hit);
                }
                Err(_) => warn!(id = %hit.id, "skipping hit with non numeric id"),
            }
        }
        ids
    }

    fn mockup_from_hit(&self, id: ProductId) -> Option<ProductMockup> {
        let source = &self.hit_data.get(&id)?.source;

        let mut relations = Vec::new();
        if let Some(Value::Object(fields)) = source.get("relations") {
            for (name, ids) in fields {
                let ids = match ids {
                    Value::Array(items) => items.iter().filter_map(Value::as_i64).collect(),
                    other => other.as_i64().into_iter().collect::<Vec<_>>(),
                };
                relations.extend(ids.into_iter().map(|dest| RelationRef::object(name.as_str(), dest)));
            }
        }

        let mut params = Map::new();
        for section in ["system", "attributes"] {
            if let Some(Value::Object(values)) = source.get(section) {
                params.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        Some(self.config.create_mockup(id, params, relations))
    }

    fn backend(&self) -> Result<Arc<dyn SearchBackend>> {
        if let Some(backend) = &self.backend {
            return Ok(Arc::clone(backend));
        }
        self.config.tenant_worker()?.search_backend().ok_or_else(|| {
            CommerceError::Configuration(
                "Invalid worker configured, search backend compatible worker expected.".to_string(),
            )
        })
    }

    /// Send a request. When scrolling, pages are fetched until one comes back
    /// empty and all hits are merged into the first response.
    fn send_request(&self, mut request: Value, scroll: bool) -> Result<SearchResponse> {
        let backend = self.backend()?;
        if scroll {
            set_path(&mut request, &["scroll"], Value::from(self.scroll_keep_alive.as_str()));
            set_path(&mut request, &["body", "size"], Value::from(self.limit));
        }
        debug!(tenant = %self.config.tenant_name(), request = %request, "search request");

        let mut response = SearchResponse::parse(backend.search(&request)?)?;
        if !scroll {
            return Ok(response);
        }

        let mut scroll_id = response.scroll_id.clone().ok_or_else(|| {
            BackendError::MalformedResponse("scroll response without _scroll_id".to_string())
        })?;
        loop {
            let page = SearchResponse::parse(backend.scroll(&scroll_id, &self.scroll_keep_alive)?)?;
            if page.hits.hits.is_empty() {
                break;
            }
            if let Some(next) = page.scroll_id {
                scroll_id = next;
            }
            response.hits.hits.extend(page.hits.hits);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::attribute::Attribute;
    use serde_json::json;

    fn list() -> ProductList {
        let config = TenantConfig::builder("shop")
            .attribute(Attribute::new("color"))
            .build()
            .unwrap();
        ProductList::new(Arc::new(config))
    }

    #[test]
    fn test_limit_unlimited_turns_on_scrolling() {
        let mut list = list();
        list.set_limit(LIMIT_UNLIMITED);
        assert_eq!(list.limit(), Some(SCROLL_PAGE_SIZE));
        assert!(list.is_scrolling());

        list.set_limit(20);
        assert_eq!(list.limit(), Some(20));
        assert!(!list.is_scrolling());
    }

    #[test]
    fn test_condition_buckets_keep_field_order() {
        let mut list = list();
        list.add_condition("red", "color");
        list.add_condition(json!({"range": {"attributes.size": {"gte": 3}}}), "size");
        list.add_condition("blue", "color");
        assert_eq!(list.filter_conditions().fields().collect::<Vec<_>>(), vec!["color", "size"]);
        assert_eq!(list.filter_conditions().get("color").map(<[_]>::len), Some(2));

        list.reset_condition("color");
        list.add_condition("green", "color");
        assert_eq!(list.filter_conditions().fields().collect::<Vec<_>>(), vec!["size", "color"]);

        list.reset_conditions();
        assert!(list.filter_conditions().is_empty());
    }

    #[test]
    fn test_order_key_forms() {
        let key: OrderKey = serde_json::from_value(json!("price")).unwrap();
        assert!(key.is_price());
        let key: OrderKey = serde_json::from_value(json!([["name", "DESC"], ["color", null]])).unwrap();
        assert_eq!(
            key,
            OrderKey::Fields(vec![
                ("name".into(), Some(SortDirection::Desc)),
                ("color".into(), None)
            ])
        );
        let key: OrderKey = serde_json::from_value(json!({"advanced_sort": {"_score": "desc"}})).unwrap();
        assert!(matches!(key, OrderKey::Advanced { .. }));
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
    }

    #[test]
    fn test_price_filter_is_unsupported() {
        let mut list = list();
        list.add_price_condition(Some(10.0), None);
        assert!(matches!(list.load(), Err(CommerceError::UnsupportedQuery(_))));
        list.set_order_key(OrderKey::field("price"));
        assert!(matches!(list.load(), Err(CommerceError::UnsupportedQuery(_))));
    }

    #[test]
    fn test_unbound_tenant_has_no_backend() {
        let mut list = list();
        assert!(matches!(list.load(), Err(CommerceError::Configuration(_))));
    }
}
