//! Newtype IDs for type-safe identifiers.
//!
//! Products, categories and rules are all numbered objects; wrapping the
//! number keeps a category id from being passed where a product id belongs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

define_id!(
    /// Identifier of an indexable product or variant.
    ProductId
);
define_id!(
    /// Identifier of a catalog category.
    CategoryId
);
define_id!(
    /// Identifier of a pricing rule.
    RuleId
);
define_id!(
    /// Identifier of a voucher token series.
    VoucherSeriesId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse() {
        let id: ProductId = " 42".parse().unwrap();
        assert_eq!(id, ProductId::new(42));
        assert!("abc".parse::<ProductId>().is_err());
    }

    #[test]
    fn test_id_serde_is_transparent() {
        let json = serde_json::to_string(&CategoryId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: CategoryId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 7);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(RuleId::new(3).to_string(), "3");
    }
}
