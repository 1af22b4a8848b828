//! Group-by values ("available filter values") of a product list.
//!
//! All prepared fields are computed in one request. Each field gets its own
//! aggregation, scoped by every active filter except the ones on the field
//! itself and on fields marked as excluded.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{ProductList, VariantMode};
use crate::error::{CommerceError, Result};

/// Terms aggregation size that returns every bucket.
const ALL_BUCKETS: i64 = 2_147_483_647;

/// One facet value and the number of matching products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByValue {
    pub value: Value,
    pub count: u64,
    /// Formatted key of a date histogram bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_as_string: Option<String>,
    /// Document count of a reverse nested aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_count: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_aggregations: BTreeMap<String, Vec<GroupByValue>>,
}

impl GroupByValue {
    pub fn new(value: Value, count: u64) -> Self {
        Self {
            value,
            count,
            key_as_string: None,
            reverse_count: None,
            sub_aggregations: BTreeMap::new(),
        }
    }
}

/// A field registered for faceting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedGroupBy {
    pub count_values: bool,
    /// Leave this field's own filter out of every facet.
    pub exclude: bool,
    /// Aggregation replacing the default terms aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_config: Option<Value>,
}

impl ProductList {
    pub fn prepare_group_by_values(&mut self, field: &str, count_values: bool, exclude: bool) {
        if field.is_empty() {
            return;
        }
        let mapped = self.config.field_name_mapped(field, true);
        self.prepare_mapped(mapped, count_values, exclude, None);
    }

    /// Prepare a field with its own aggregation instead of the terms default.
    /// Not available in [`VariantMode::IncludeParentObject`], where the
    /// aggregation has to carry the parent object count.
    pub fn prepare_group_by_values_with_config(
        &mut self,
        field: &str,
        aggregation_config: Value,
        count_values: bool,
        exclude: bool,
    ) -> Result<()> {
        if self.variant_mode == VariantMode::IncludeParentObject {
            return Err(CommerceError::UnsupportedQuery(
                "Custom sub aggregations are not supported for variant mode include_parent_object".to_string(),
            ));
        }
        if field.is_empty() {
            return Ok(());
        }
        let mapped = self.config.field_name_mapped(field, true);
        self.prepare_mapped(mapped, count_values, exclude, Some(aggregation_config));
        Ok(())
    }

    pub fn prepare_group_by_relation_values(&mut self, field: &str, count_values: bool, exclude: bool) {
        if field.is_empty() {
            return;
        }
        let mapped = self.config.field_name_mapped(field, true);
        self.prepare_mapped(mapped, count_values, exclude, None);
    }

    pub fn prepare_group_by_system_values(&mut self, field: &str, count_values: bool, exclude: bool) {
        if field.is_empty() {
            return;
        }
        let mapped = self.config.field_name_mapped(field, false);
        self.prepare_mapped(mapped, count_values, exclude, None);
    }

    pub fn reset_prepared_group_by_values(&mut self) {
        self.prepared_group_by.clear();
        self.prepared_group_by_results.clear();
        self.prepared_loaded = false;
    }

    pub fn prepared_group_by(&self) -> &BTreeMap<String, PreparedGroupBy> {
        &self.prepared_group_by
    }

    fn prepare_mapped(
        &mut self,
        mapped: String,
        count_values: bool,
        exclude: bool,
        aggregation_config: Option<Value>,
    ) {
        self.prepared_group_by.insert(
            mapped,
            PreparedGroupBy {
                count_values,
                exclude,
                aggregation_config,
            },
        );
        self.prepared_loaded = false;
    }

    /// Facet values of an attribute with their counts. A field that was not
    /// prepared is prepared on the fly, which costs another request when the
    /// other facets were loaded already.
    pub fn group_by_values(&mut self, field: &str, exclude: bool) -> Result<Vec<GroupByValue>> {
        let mapped = self.config.field_name_mapped(field, true);
        self.group_by_mapped(mapped, exclude)
    }

    /// Facet values of an attribute without counts.
    pub fn group_by_keys(&mut self, field: &str, exclude: bool) -> Result<Vec<Value>> {
        Ok(self
            .group_by_values(field, exclude)?
            .into_iter()
            .map(|v| v.value)
            .collect())
    }

    pub fn group_by_relation_values(&mut self, field: &str, exclude: bool) -> Result<Vec<GroupByValue>> {
        let mapped = self.config.field_name_mapped(field, true);
        self.group_by_mapped(mapped, exclude)
    }

    pub fn group_by_system_values(&mut self, field: &str, exclude: bool) -> Result<Vec<GroupByValue>> {
        let mapped = self.config.field_name_mapped(field, false);
        self.group_by_mapped(mapped, exclude)
    }

    fn group_by_mapped(&mut self, mapped: String, exclude: bool) -> Result<Vec<GroupByValue>> {
        if !self.prepared_group_by.contains_key(&mapped) {
            debug!(field = %mapped, "group by field was not prepared");
            self.prepare_mapped(mapped.clone(), true, exclude, None);
        }
        if !self.prepared_loaded {
            self.load_group_by_values()?;
        }
        Ok(self
            .prepared_group_by_results
            .get(&mapped)
            .cloned()
            .unwrap_or_default())
    }

    /// The facet request: one aggregation per prepared field.
    pub fn group_by_query(&self) -> Option<Value> {
        let config = &self.config;
        let excluded: HashSet<String> = self
            .prepared_group_by
            .iter()
            .filter(|(_, prepared)| prepared.exclude)
            .map(|(mapped, _)| self.short_field_name(mapped))
            .collect();

        let mut bool_filters = self.system_conditions();
        bool_filters.extend(self.filter_clauses(&excluded));
        bool_filters.extend(self.relation_clauses(&excluded));
        let query_filters = self.query_clauses();

        // Fields whose filters are already part of the general filters.
        let filtered: HashSet<String> = self
            .filter_conditions
            .fields()
            .chain(self.relation_conditions.fields())
            .filter(|field| !excluded.contains(*field))
            .map(str::to_string)
            .collect();

        let parent_mode = self.variant_mode == VariantMode::IncludeParentObject;
        let object_count = json!({"objectCount": {"cardinality": {"field": "system.virtualProductId"}}});

        let mut aggs = Map::new();
        for (mapped, prepared) in &self.prepared_group_by {
            let mut skip = filtered.clone();
            skip.insert(self.short_field_name(mapped));
            let mut specific = self.filter_clauses(&skip);
            specific.extend(self.relation_clauses(&skip));

            let mut aggregation = prepared.aggregation_config.clone().unwrap_or_else(|| {
                json!({"terms": {"field": mapped, "size": ALL_BUCKETS, "order": {"_key": "asc"}}})
            });
            if parent_mode {
                super::set_path(&mut aggregation, &["aggs"], object_count.clone());
            }
            if specific.is_empty() {
                aggs.insert(mapped.clone(), aggregation);
            } else {
                aggs.insert(
                    mapped.clone(),
                    json!({
                        "filter": {"bool": {"must": specific}},
                        "aggs": { mapped.as_str(): aggregation },
                    }),
                );
            }
        }
        if aggs.is_empty() {
            return None;
        }

        let mut request = json!({
            "index": config.index_name(),
            "body": {
                "_source": false,
                "size": 0,
                "from": self.offset,
                "aggs": aggs,
            }
        });
        let mode = if parent_mode {
            VariantMode::VariantsOnly
        } else {
            self.variant_mode
        };
        self.build_query(&mut request, bool_filters, query_filters, mode);
        Some(request)
    }

    /// Condition bucket name of a prepared field. Fields outside the tenant's
    /// attributes keep their raw name.
    fn short_field_name(&self, mapped: &str) -> String {
        self.config.reverse_mapped_field_name(mapped).unwrap_or_else(|| {
            warn!(field = %mapped, "group by field has no attribute, using it unmapped");
            mapped.to_string()
        })
    }

    /// Run the facet request for all prepared fields.
    pub fn load_group_by_values(&mut self) -> Result<()> {
        self.prepared_group_by_results.clear();
        if let Some(request) = self.group_by_query() {
            let response = self.send_request(request, false)?;
            let parent_mode = self.variant_mode == VariantMode::IncludeParentObject;
            for (name, aggregation) in &response.aggregations {
                let buckets = search_for_buckets(aggregation).unwrap_or_default();
                let values = buckets
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|bucket| {
                        if parent_mode {
                            parent_object_value(bucket)
                        } else {
                            convert_bucket(bucket)
                        }
                    })
                    .collect();
                self.prepared_group_by_results.insert(name.clone(), values);
            }
        }
        self.prepared_loaded = true;
        Ok(())
    }
}

/// First `buckets` list in an aggregation result, searching nested
/// aggregations last to first.
fn search_for_buckets(aggregation: &Value) -> Option<Vec<Value>> {
    let object = aggregation.as_object()?;
    if let Some(buckets) = object.get("buckets") {
        return Some(buckets.as_array().cloned().unwrap_or_default());
    }
    object
        .values()
        .rev()
        .filter(|child| child.is_object())
        .filter_map(search_for_buckets)
        .find(|buckets| !buckets.is_empty())
}

fn parent_object_value(bucket: &Map<String, Value>) -> GroupByValue {
    let count = bucket
        .get("objectCount")
        .and_then(|c| c.get("value"))
        .and_then(Value::as_u64)
        .or_else(|| bucket.get("doc_count").and_then(Value::as_u64))
        .unwrap_or(0);
    GroupByValue::new(bucket.get("key").cloned().unwrap_or(Value::Null), count)
}

/// Bucket to value. Besides plain terms buckets this understands date
/// histograms, reverse nested counts and one level of sub aggregation.
fn convert_bucket(bucket: &Map<String, Value>) -> GroupByValue {
    let mut rest = bucket.clone();
    let value = rest.remove("key").unwrap_or(Value::Null);
    let count = rest.remove("doc_count").and_then(|c| c.as_u64()).unwrap_or(0);
    let mut data = GroupByValue::new(value, count);

    if rest.is_empty() {
        return data;
    }
    if let Some(formatted) = rest.get("key_as_string") {
        data.key_as_string = formatted.as_str().map(str::to_string);
    } else if let Some(reverse) = rest
        .values()
        .last()
        .and_then(|v| v.get("doc_count"))
        .and_then(Value::as_u64)
    {
        data.reverse_count = Some(reverse);
    } else if let Some((name, sub)) = rest.iter().next() {
        if let Some(buckets) = sub.get("buckets").and_then(Value::as_array) {
            let values = buckets
                .iter()
                .filter_map(Value::as_object)
                .map(convert_bucket)
                .collect();
            data.sub_aggregations.insert(name.clone(), values);
        }
    }
    data
}
