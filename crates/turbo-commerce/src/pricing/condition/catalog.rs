//! Conditions on the products being priced.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{tagged_document, Condition};
use crate::ids::{CategoryId, ProductId};
use crate::pricing::environment::Environment;

/// Reference to a catalog object as stored by the rule editor.
///
/// Documents carry either a bare id, `{"id": .., "path": ..}` or `[id, path]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RefRepr<I>", bound(deserialize = "I: Deserialize<'de>"))]
pub struct CatalogRef<I> {
    pub id: I,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RefRepr<I> {
    Id(I),
    Object {
        id: I,
        #[serde(default)]
        path: Option<String>,
    },
    Pair(I, String),
}

impl<I> From<RefRepr<I>> for CatalogRef<I> {
    fn from(repr: RefRepr<I>) -> Self {
        match repr {
            RefRepr::Id(id) => CatalogRef { id, path: None },
            RefRepr::Object { id, path } => CatalogRef { id, path },
            RefRepr::Pair(id, path) => CatalogRef {
                id,
                path: Some(path),
            },
        }
    }
}

impl<I> CatalogRef<I> {
    pub fn new(id: I) -> Self {
        CatalogRef { id, path: None }
    }
}

pub type ProductRef = CatalogRef<ProductId>;
pub type CategoryRef = CatalogRef<CategoryId>;

/// Matches when a pooled product, or one of its parents, is listed.
///
/// The pool is the current product plus, in cart mode, every cart line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    #[serde(default)]
    pub products: Vec<ProductRef>,
}

impl CatalogProduct {
    pub const TYPE: &'static str = "CatalogProduct";

    pub fn new(products: impl IntoIterator<Item = ProductId>) -> Self {
        Self {
            products: products.into_iter().map(ProductRef::new).collect(),
        }
    }

    fn lists(&self, id: ProductId) -> bool {
        self.products.iter().any(|p| p.id == id)
    }
}

impl Condition for CatalogProduct {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn check(&self, env: &Environment) -> bool {
        env.product_pool()
            .into_iter()
            .any(|product| env.lineage(product).into_iter().any(|id| self.lists(id)))
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }
}

/// Matches when a pooled product, or one of its parents, sits in a listed category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogCategory {
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
}

impl CatalogCategory {
    pub const TYPE: &'static str = "CatalogCategory";

    pub fn new(categories: impl IntoIterator<Item = CategoryId>) -> Self {
        Self {
            categories: categories.into_iter().map(CategoryRef::new).collect(),
        }
    }
}

impl Condition for CatalogCategory {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn check(&self, env: &Environment) -> bool {
        let catalog = env.catalog();
        env.product_pool().into_iter().any(|product| {
            env.lineage(product).into_iter().any(|id| {
                self.categories
                    .iter()
                    .any(|category| catalog.in_category(id, category.id))
            })
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
    use crate::pricing::environment::{CartSnapshot, ExecutionMode, InMemoryCatalog};
    use serde_json::json;
    use std::sync::Arc;

    fn env() -> Environment {
        let mut catalog = InMemoryCatalog::new();
        catalog
            .add_category(CategoryId::new(100), None)
            .add_product(ProductId::new(1), None, vec![CategoryId::new(100)])
            .add_product(ProductId::new(2), Some(ProductId::new(1)), vec![])
            .add_product(ProductId::new(3), None, vec![]);
        Environment::new(Arc::new(catalog))
    }

    #[test]
    fn test_variant_matches_listed_parent() {
        let condition = CatalogProduct::new([ProductId::new(1)]);
        assert!(condition.check(&env().with_product(ProductId::new(2))));
        assert!(!condition.check(&env().with_product(ProductId::new(3))));
    }

    #[test]
    fn test_missing_product_is_non_match() {
        let condition = CatalogProduct::new([ProductId::new(42)]);
        assert!(!condition.check(&env().with_product(ProductId::new(42))));
        assert!(!condition.check(&env()));
    }

    #[test]
    fn test_cart_items_join_pool_in_cart_mode() {
        let cart = CartSnapshot::new(Money::new(100, Currency::EUR)).with_item(ProductId::new(2), 1);
        let env = env().with_product(ProductId::new(3)).with_cart(cart);
        let condition = CatalogCategory::new([CategoryId::new(100)]);

        assert!(!condition.check(&env));
        assert!(condition.check(&env.with_mode(ExecutionMode::Cart)));
    }

    #[test]
    fn test_reference_shapes() {
        let condition: CatalogProduct = serde_json::from_value(json!({
            "type": "CatalogProduct",
            "products": [1, {"id": 2, "path": "/shop/2"}, [3, "/shop/3"]]
        }))
        .unwrap();
        let ids: Vec<i64> = condition.products.iter().map(|p| p.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(condition.products[2].path.as_deref(), Some("/shop/3"));
    }
}
