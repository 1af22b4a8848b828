use serde::{Deserialize, Serialize};

use crate::ids::{ProductId, RuleId};
use crate::money::Money;

/// Unit price of a product after pricing rules ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub product: ProductId,
    pub quantity: i64,
    /// Price before any rule applied.
    pub base_price: Money,
    /// Current unit price.
    pub price: Money,
    /// Rules that changed this price, in application order.
    #[serde(default)]
    pub rules: Vec<RuleId>,
}

impl PriceInfo {
    pub fn new(product: ProductId, quantity: i64, base_price: Money) -> Self {
        Self {
            product,
            quantity,
            base_price,
            price: base_price,
            rules: Vec::new(),
        }
    }

    pub fn total_price(&self) -> Money {
        self.price.multiply(self.quantity)
    }

    /// How much rules took off the unit price.
    pub fn discount(&self) -> Money {
        self.base_price
            .saturating_sub(&self.price)
            .unwrap_or_else(|| Money::zero(self.price.currency))
    }

    pub fn has_rules_applied(&self) -> bool {
        !self.rules.is_empty()
    }
}
