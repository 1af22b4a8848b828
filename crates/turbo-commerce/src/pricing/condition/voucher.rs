use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog::CatalogRef;
use super::{tagged_document, Condition};
use crate::ids::VoucherSeriesId;
use crate::pricing::environment::Environment;

/// Cart carries a voucher token from one of the whitelisted series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoucherToken {
    #[serde(default, rename = "whiteList")]
    pub series: Vec<CatalogRef<VoucherSeriesId>>,
}

impl VoucherToken {
    pub const TYPE: &'static str = "VoucherToken";

    pub fn new(series: impl IntoIterator<Item = VoucherSeriesId>) -> Self {
        Self {
            series: series.into_iter().map(CatalogRef::new).collect(),
        }
    }

    pub fn accepts(&self, series: VoucherSeriesId) -> bool {
        self.series.iter().any(|s| s.id == series)
    }
}

impl Condition for VoucherToken {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn check(&self, env: &Environment) -> bool {
        env.cart().is_some_and(|cart| {
            cart.voucher_tokens
                .iter()
                .any(|token| self.accepts(token.series))
        })
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};
    use crate::pricing::environment::{CartSnapshot, InMemoryCatalog};
    use std::sync::Arc;

    #[test]
    fn test_whitelisted_series() {
        let condition = VoucherToken::new([VoucherSeriesId::new(7)]);
        let env = Environment::new(Arc::new(InMemoryCatalog::new()));
        assert!(!condition.check(&env));

        let cart = CartSnapshot::new(Money::zero(Currency::EUR)).with_voucher("SUMMER-1", VoucherSeriesId::new(8));
        assert!(!condition.check(&env.clone().with_cart(cart.clone())));
        let cart = cart.with_voucher("SPRING-1", VoucherSeriesId::new(7));
        assert!(condition.check(&env.with_cart(cart)));
    }
}
