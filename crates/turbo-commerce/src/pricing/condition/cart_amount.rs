use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{tagged_document, Condition};
use crate::money::Money;
use crate::pricing::environment::{Environment, ExecutionMode};

/// Cart subtotal within `[from, to]`, amounts in the cart's currency.
///
/// Only meaningful while pricing a cart: a product pass or a missing cart
/// never matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartAmount {
    #[serde(default, alias = "limit")]
    pub from: Option<f64>,
    #[serde(default)]
    pub to: Option<f64>,
}

impl CartAmount {
    pub const TYPE: &'static str = "CartAmount";

    pub fn at_least(from: f64) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn between(from: f64, to: f64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }
}

impl Condition for CartAmount {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn check(&self, env: &Environment) -> bool {
        if env.mode() != ExecutionMode::Cart || env.product().is_some() {
            return false;
        }
        let Some(cart) = env.cart() else {
            return false;
        };

        let subtotal = cart.subtotal;
        let from = Money::from_decimal(self.from.unwrap_or(0.0), subtotal.currency);
        if subtotal.amount_cents < from.amount_cents {
            return false;
        }
        match self.to {
            Some(to) => subtotal.amount_cents <= Money::from_decimal(to, subtotal.currency).amount_cents,
            None => true,
        }
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }
}
