//! Search backend seam and the response model the product list reads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by a search backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("Search backend unreachable: {0}")]
    Transport(String),

    /// The backend refused the request.
    #[error("Search backend rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The backend does not offer this operation.
    #[error("Operation not supported by search backend: {0}")]
    Unsupported(String),

    /// The response did not have the expected shape.
    #[error("Malformed search response: {0}")]
    MalformedResponse(String),
}

/// Synchronous search client.
///
/// Requests are the client parameter documents the product list builds:
/// `index`, `body` and optionally `scroll` at the top level.
pub trait SearchBackend: Send + Sync {
    fn search(&self, request: &Value) -> Result<Value, BackendError>;

    /// Next page of a scroll started by [`search`](Self::search).
    fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<Value, BackendError>;

    /// Create the index with settings and mappings, or update its mapping.
    fn ensure_index(&self, _index: &str, _definition: &Value) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("ensure_index".to_string()))
    }

    fn index_document(
        &self,
        _index: &str,
        _id: &str,
        _document: &Value,
        _routing: Option<&str>,
    ) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("index_document".to_string()))
    }

    fn delete_document(&self, _index: &str, _id: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("delete_document".to_string()))
    }

    /// Copy the index into a fresh one built from `definition` and switch over.
    fn reindex(&self, _index: &str, _definition: &Value) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("reindex".to_string()))
    }

    /// Close and reopen the index so changed synonym files are picked up.
    fn reload_synonyms(&self, _index: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("reload_synonyms".to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub hits: Hits,
    #[serde(default)]
    pub aggregations: Map<String, Value>,
}

impl SearchResponse {
    pub fn parse(value: Value) -> Result<Self, BackendError> {
        serde_json::from_value(value).map_err(|e| BackendError::MalformedResponse(e.to_string()))
    }

    /// Total number of matches, `rest_total_hits_as_int` or not.
    pub fn total(&self) -> u64 {
        match self.hits.total {
            Some(TotalHits::Count(n)) => n,
            Some(TotalHits::Object { value }) => value,
            None => self.hits.hits.len() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_hits: Option<Value>,
}

impl Hit {
    /// `_source.system.<field>`
    pub fn system(&self, field: &str) -> Option<&Value> {
        self.source.get("system")?.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_both_total_shapes() {
        let int = SearchResponse::parse(json!({"hits": {"total": 3, "hits": []}})).unwrap();
        assert_eq!(int.total(), 3);

        let object = SearchResponse::parse(json!({
            "_scroll_id": "abc",
            "hits": {"total": {"value": 7, "relation": "eq"}, "hits": [
                {"_id": "12", "_score": 1.5, "_source": {"system": {"priceSystemName": "default"}}}
            ]}
        }))
        .unwrap();
        assert_eq!(object.total(), 7);
        assert_eq!(object.scroll_id.as_deref(), Some("abc"));
        assert_eq!(object.hits.hits[0].system("priceSystemName"), Some(&json!("default")));
    }

    #[test]
    fn test_malformed_response() {
        let err = SearchResponse::parse(json!({"hits": {"hits": [{"_score": 1}]}})).unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }
}
