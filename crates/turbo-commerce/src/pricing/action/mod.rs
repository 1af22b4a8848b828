//! Pricing rule actions.
//!
//! Actions run once a rule's condition holds. Product actions rewrite a
//! [`PriceInfo`], cart actions add to the [`CartAdjustments`] of a cart pass.

mod discount;
mod gift;

pub use discount::{CartDiscount, ProductDiscount};
pub use gift::{FreeShipping, Gift};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CommerceError, Result};
use crate::ids::{ProductId, RuleId};
use crate::money::Money;
use crate::pricing::environment::Environment;
use crate::pricing::price_info::PriceInfo;

/// The rule an action runs for.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub rule_id: RuleId,
    pub rule_name: &'a str,
    pub env: &'a Environment,
}

/// Effect of a matching rule.
pub trait Action: Send + Sync + fmt::Debug {
    fn type_tag(&self) -> &'static str;

    /// Document form, including the `type` key.
    fn to_document(&self) -> Value;

    fn is_product_action(&self) -> bool {
        false
    }

    fn is_cart_action(&self) -> bool {
        false
    }

    fn execute_on_product(&self, _price: &mut PriceInfo, _ctx: &ActionContext<'_>) {}

    fn execute_on_cart(&self, _adjustments: &mut CartAdjustments, _ctx: &ActionContext<'_>) {}
}

/// A discount a cart rule granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub rule_id: RuleId,
    pub description: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftItem {
    pub rule_id: RuleId,
    pub product: ProductId,
}

/// Everything cart rules changed during one cart pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartAdjustments {
    pub discounts: Vec<AppliedDiscount>,
    pub gifts: Vec<GiftItem>,
    pub free_shipping: bool,
}

impl CartAdjustments {
    /// Sum of discounts in `currency`; other currencies are ignored.
    pub fn total_discount(&self, currency: crate::money::Currency) -> Money {
        let cents = self
            .discounts
            .iter()
            .filter(|d| d.amount.currency == currency)
            .map(|d| d.amount.amount_cents)
            .sum();
        Money::new(cents, currency)
    }

    /// `subtotal` minus all discounts, floored at zero.
    pub fn apply_to(&self, subtotal: Money) -> Money {
        subtotal
            .saturating_sub(&self.total_discount(subtotal.currency))
            .unwrap_or(subtotal)
    }

    pub fn is_empty(&self) -> bool {
        self.discounts.is_empty() && self.gifts.is_empty() && !self.free_shipping
    }
}

type Factory = Arc<dyn Fn(&Value) -> Result<Box<dyn Action>> + Send + Sync>;

/// Maps action type tags to constructors.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    factories: HashMap<String, Factory>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types", &self.tags())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_serde::<ProductDiscount>(ProductDiscount::TYPE);
        registry.register_serde::<CartDiscount>(CartDiscount::TYPE);
        registry.register_serde::<Gift>(Gift::TYPE);
        registry.register_serde::<FreeShipping>(FreeShipping::TYPE);
        registry
    }

    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn Action>> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
        self
    }

    pub fn register_serde<A>(&mut self, tag: impl Into<String>) -> &mut Self
    where
        A: Action + DeserializeOwned + 'static,
    {
        let tag = tag.into();
        let name = tag.clone();
        self.register(tag, move |doc| {
            let action: A = serde_json::from_value(doc.clone())
                .map_err(|e| CommerceError::InvalidDocument(format!("{name} action: {e}")))?;
            Ok(Box::new(action))
        })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn from_document(&self, doc: &Value) -> Result<Box<dyn Action>> {
        let tag = doc
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CommerceError::InvalidDocument("action without \"type\"".into()))?;
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| CommerceError::UnknownActionType(tag.to_string()))?;
        factory(doc)
    }
}
