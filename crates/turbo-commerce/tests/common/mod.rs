//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use turbo_commerce::index::BackendError;
use turbo_commerce::ids::{CategoryId, ProductId};
use turbo_commerce::pricing::{Condition, ConditionRegistry, Environment, InMemoryCatalog};
use turbo_db::{Connection, DbError, QueryResult, Value as SqlValue};

/// Search backend answering from queued responses and recording every call.
#[derive(Default)]
pub struct RecordingBackend {
    search_responses: Mutex<VecDeque<Value>>,
    scroll_responses: Mutex<VecDeque<Value>>,
    pub requests: Mutex<Vec<Value>>,
    pub scroll_calls: Mutex<Vec<(String, String)>>,
    pub indexed: Mutex<Vec<(String, Value, Option<String>)>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: Value) -> &Self {
        self.search_responses.lock().push_back(response);
        self
    }

    pub fn respond_to_scroll(&self, response: Value) -> &Self {
        self.scroll_responses.lock().push_back(response);
        self
    }

    /// Search plus scroll calls so far.
    pub fn round_trips(&self) -> usize {
        self.requests.lock().len() + self.scroll_calls.lock().len()
    }
}

fn empty_page() -> Value {
    json!({"hits": {"total": 0, "hits": []}})
}

impl turbo_commerce::index::SearchBackend for RecordingBackend {
    fn search(&self, request: &Value) -> Result<Value, BackendError> {
        self.requests.lock().push(request.clone());
        Ok(self.search_responses.lock().pop_front().unwrap_or_else(empty_page))
    }

    fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<Value, BackendError> {
        self.scroll_calls
            .lock()
            .push((scroll_id.to_string(), keep_alive.to_string()));
        Ok(self.scroll_responses.lock().pop_front().unwrap_or_else(empty_page))
    }

    fn ensure_index(&self, _index: &str, _definition: &Value) -> Result<(), BackendError> {
        Ok(())
    }

    fn index_document(
        &self,
        _index: &str,
        id: &str,
        document: &Value,
        routing: Option<&str>,
    ) -> Result<(), BackendError> {
        self.indexed
            .lock()
            .push((id.to_string(), document.clone(), routing.map(str::to_string)));
        Ok(())
    }

    fn delete_document(&self, _index: &str, _id: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Page of hits for product ids, with a scroll id.
pub fn page(ids: &[i64], scroll_id: &str) -> Value {
    let hits: Vec<Value> = ids
        .iter()
        .map(|id| json!({"_id": id.to_string(), "_source": {"system": {"id": id}}}))
        .collect();
    json!({"_scroll_id": scroll_id, "hits": {"total": ids.len(), "hits": hits}})
}

/// SQL connection that records statements and answers queries from a script.
#[derive(Default)]
pub struct ScriptedConnection {
    pub statements: Mutex<Vec<(String, Vec<SqlValue>)>>,
    answers: Mutex<VecDeque<QueryResult>>,
}

impl ScriptedConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, result: QueryResult) -> &Self {
        self.answers.lock().push_back(result);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.statements.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }
}

impl Connection for ScriptedConnection {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.statements.lock().push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    fn query(&self, sql: &str, _params: &[SqlValue]) -> Result<QueryResult, DbError> {
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| DbError::QueryError(format!("no scripted answer for {sql}")))
    }
}

/// Shoe catalog: 10 is a product with variants 11 and 12, categories 1 > 2.
pub fn catalog() -> Arc<InMemoryCatalog> {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_category(CategoryId::new(1), None)
        .add_category(CategoryId::new(2), Some(CategoryId::new(1)))
        .add_product(ProductId::new(10), None, vec![CategoryId::new(2)])
        .add_product(ProductId::new(11), Some(ProductId::new(10)), vec![])
        .add_product(ProductId::new(12), Some(ProductId::new(10)), vec![]);
    Arc::new(catalog)
}

pub fn env() -> Environment {
    Environment::new(catalog())
}

/// Leaf condition with a fixed outcome that counts how often it was checked.
#[derive(Debug)]
pub struct Probe {
    pub result: bool,
    pub checks: Arc<AtomicUsize>,
}

impl Probe {
    pub fn new(result: bool) -> (Self, Arc<AtomicUsize>) {
        let checks = Arc::new(AtomicUsize::new(0));
        (
            Self {
                result,
                checks: Arc::clone(&checks),
            },
            checks,
        )
    }

    pub fn count(checks: &AtomicUsize) -> usize {
        checks.load(Ordering::SeqCst)
    }
}

impl Condition for Probe {
    fn type_tag(&self) -> &'static str {
        "Probe"
    }

    fn check(&self, _env: &Environment) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.result
    }

    fn to_document(&self) -> Value {
        json!({"type": "Probe", "result": self.result})
    }
}

/// Default registry plus [`Probe`].
pub fn registry() -> ConditionRegistry {
    let mut registry = ConditionRegistry::with_defaults();
    registry.register("Probe", |doc, _| {
        let (probe, _) = Probe::new(doc["result"].as_bool().unwrap_or(false));
        Ok(Box::new(probe))
    });
    registry
}
