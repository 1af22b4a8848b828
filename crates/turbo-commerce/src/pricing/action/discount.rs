//! Amount and percentage discounts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Action, ActionContext, AppliedDiscount, CartAdjustments};
use crate::money::Money;
use crate::pricing::condition::tagged_document;
use crate::pricing::price_info::PriceInfo;

/// Resolve an amount-or-percent pair against `base`.
///
/// A non-zero `amount` wins; otherwise `percent` of `base` is taken.
fn discount_of(base: Money, amount: f64, percent: f64) -> Money {
    let fixed = Money::from_decimal(amount, base.currency);
    if fixed.is_zero() {
        base.percentage(percent)
    } else {
        fixed
    }
}

/// Takes an amount or a percentage off the unit price. Never below zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDiscount {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub percent: f64,
}

impl ProductDiscount {
    pub const TYPE: &'static str = "ProductDiscount";

    pub fn amount(amount: f64) -> Self {
        Self {
            amount,
            percent: 0.0,
        }
    }

    pub fn percent(percent: f64) -> Self {
        Self {
            amount: 0.0,
            percent,
        }
    }
}

impl Action for ProductDiscount {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }

    fn is_product_action(&self) -> bool {
        true
    }

    fn execute_on_product(&self, price: &mut PriceInfo, _ctx: &ActionContext<'_>) {
        let discount = discount_of(price.price, self.amount, self.percent);
        if let Some(reduced) = price.price.saturating_sub(&discount) {
            price.price = reduced;
        }
    }
}

/// Takes an amount or a percentage off the cart subtotal.
///
/// Capped at what previous discounts left of the subtotal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartDiscount {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub percent: f64,
}

impl CartDiscount {
    pub const TYPE: &'static str = "CartDiscount";

    pub fn amount(amount: f64) -> Self {
        Self {
            amount,
            percent: 0.0,
        }
    }

    pub fn percent(percent: f64) -> Self {
        Self {
            amount: 0.0,
            percent,
        }
    }
}

impl Action for CartDiscount {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }

    fn is_cart_action(&self) -> bool {
        true
    }

    fn execute_on_cart(&self, adjustments: &mut CartAdjustments, ctx: &ActionContext<'_>) {
        let Some(cart) = ctx.env.cart() else {
            return;
        };
        let remaining = adjustments.apply_to(cart.subtotal);
        let discount = discount_of(cart.subtotal, self.amount, self.percent).min(remaining);
        if discount.is_zero() {
            return;
        }
        adjustments.discounts.push(AppliedDiscount {
            rule_id: ctx.rule_id,
            description: ctx.rule_name.to_string(),
            amount: discount,
        });
    }
}
