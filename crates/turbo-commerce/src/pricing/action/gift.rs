use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Action, ActionContext, CartAdjustments, GiftItem};
use crate::ids::ProductId;
use crate::pricing::condition::{tagged_document, ProductRef};

/// Puts a free product into the cart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gift {
    #[serde(default)]
    pub product: Option<ProductRef>,
}

impl Gift {
    pub const TYPE: &'static str = "Gift";

    pub fn new(product: ProductId) -> Self {
        Self {
            product: Some(ProductRef::new(product)),
        }
    }
}

impl Action for Gift {
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
        let Some(product) = &self.product else {
            return;
        };
        if !ctx.env.catalog().contains(product.id) {
            tracing::warn!(rule = %ctx.rule_id, product = %product.id, "gift product no longer exists");
            return;
        }
        adjustments.gifts.push(GiftItem {
            rule_id: ctx.rule_id,
            product: product.id,
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreeShipping {}

impl FreeShipping {
    pub const TYPE: &'static str = "FreeShipping";
}

impl Action for FreeShipping {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }

    fn is_cart_action(&self) -> bool {
        true
    }

    fn execute_on_cart(&self, adjustments: &mut CartAdjustments, _ctx: &ActionContext<'_>) {
        adjustments.free_shipping = true;
    }
}
