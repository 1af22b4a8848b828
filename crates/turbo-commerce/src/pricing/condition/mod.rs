//! Pricing rule conditions.
//!
//! A rule's condition is a tree: [`Bracket`] nodes combine child conditions
//! with `and` / `or` / `and_not` operators, leaves look at the
//! [`Environment`]. Trees are stored as JSON documents of the form
//! `{"type": "...", ...}` and rebuilt through a [`ConditionRegistry`].

mod bracket;
mod cart_amount;
mod catalog;
mod date_range;
mod tenant;
mod voucher;

pub use bracket::{Bracket, BracketOperator};
pub use cart_amount::CartAmount;
pub use catalog::{CatalogCategory, CatalogProduct, CatalogRef, CategoryRef, ProductRef};
pub use date_range::DateRange;
pub use tenant::Tenant;
pub use voucher::VoucherToken;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CommerceError, Result};
use crate::pricing::environment::Environment;

/// A node of a rule's condition tree.
pub trait Condition: Send + Sync + fmt::Debug {
    /// Tag under which the condition is registered, e.g. `"Bracket"`.
    fn type_tag(&self) -> &'static str;

    /// Whether the condition holds in `env`.
    ///
    /// Never fails: a reference that cannot be resolved is a non-match.
    fn check(&self, env: &Environment) -> bool;

    /// Document form, including the `type` key.
    fn to_document(&self) -> Value;

    fn as_bracket(&self) -> Option<&Bracket> {
        None
    }
}

type Factory = Arc<dyn Fn(&Value, &ConditionRegistry) -> Result<Box<dyn Condition>> + Send + Sync>;

/// Maps condition type tags to constructors.
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    factories: HashMap<String, Factory>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionRegistry")
            .field("types", &self.tags())
            .finish()
    }
}

impl ConditionRegistry {
    /// An empty registry. Every lookup fails until types are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in condition types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Bracket::TYPE, |doc, registry| {
            Ok(Box::new(Bracket::from_document(doc, registry)?))
        });
        registry.register_leaf::<CartAmount>(CartAmount::TYPE);
        registry.register_leaf::<CatalogProduct>(CatalogProduct::TYPE);
        registry.register_leaf::<CatalogCategory>(CatalogCategory::TYPE);
        registry.register_leaf::<DateRange>(DateRange::TYPE);
        registry.register_leaf::<Tenant>(Tenant::TYPE);
        registry.register_leaf::<VoucherToken>(VoucherToken::TYPE);
        registry
    }

    /// Register a constructor for `tag`, replacing any previous one.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Value, &ConditionRegistry) -> Result<Box<dyn Condition>> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
        self
    }

    /// Register a leaf condition that deserializes straight from its document.
    pub fn register_leaf<C>(&mut self, tag: impl Into<String>) -> &mut Self
    where
        C: Condition + DeserializeOwned + 'static,
    {
        let tag = tag.into();
        let name = tag.clone();
        self.register(tag, move |doc, _| {
            let condition: C = serde_json::from_value(doc.clone()).map_err(|e| {
                CommerceError::InvalidDocument(format!("{name} condition: {e}"))
            })?;
            Ok(Box::new(condition))
        })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Rebuild a condition tree from its document form.
    pub fn from_document(&self, doc: &Value) -> Result<Box<dyn Condition>> {
        let tag = doc
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CommerceError::InvalidDocument("condition without \"type\"".into()))?;
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| CommerceError::UnknownConditionType(tag.to_string()))?;
        factory(doc, self)
    }

    pub fn from_json(&self, json: &str) -> Result<Box<dyn Condition>> {
        let doc: Value = serde_json::from_str(json)?;
        self.from_document(&doc)
    }

    /// A condition of type `tag` with every field at its default.
    pub fn create(&self, tag: &str) -> Result<Box<dyn Condition>> {
        self.from_document(&serde_json::json!({ "type": tag }))
    }
}

/// Leaf conditions of type `tag` anywhere below `condition`, nested brackets flattened.
pub fn conditions_by_type<'a>(condition: &'a dyn Condition, tag: &str) -> Vec<&'a dyn Condition> {
    match condition.as_bracket() {
        Some(bracket) => bracket.conditions_by_type(tag),
        None if condition.type_tag() == tag => vec![condition],
        None => Vec::new(),
    }
}

/// Serialize a leaf and stamp its `type` key.
pub(crate) fn tagged_document<T: serde::Serialize>(tag: &str, value: &T) -> Value {
    let mut doc = match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    doc.insert("type".to_string(), Value::String(tag.to_string()));
    Value::Object(doc)
}
