//! Evaluation environment handed to conditions and actions.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CategoryId, ProductId, VoucherSeriesId};
use crate::money::Money;

/// Which pricing pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Price of a single product is being computed.
    #[default]
    Product,
    /// Cart totals are being computed.
    Cart,
}

/// Read access to the product catalog for condition checks.
///
/// Lookups that miss answer "no", never fail.
pub trait ProductCatalog: Send + Sync {
    /// Whether the product still exists.
    fn contains(&self, product: ProductId) -> bool;

    fn parent_of(&self, product: ProductId) -> Option<ProductId>;

    /// Whether the product sits in `category` or one of its descendants.
    fn in_category(&self, product: ProductId, category: CategoryId) -> bool;
}

/// One line of the cart being priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Option<Money>,
}

fn default_quantity() -> i64 {
    1
}

/// A voucher code redeemed on the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherTokenRef {
    pub token: String,
    pub series: VoucherSeriesId,
}

/// Read-only view of a cart for rule evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub subtotal: Money,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub voucher_tokens: Vec<VoucherTokenRef>,
}

impl CartSnapshot {
    pub fn new(subtotal: Money) -> Self {
        Self {
            subtotal,
            items: Vec::new(),
            voucher_tokens: Vec::new(),
        }
    }

    pub fn with_item(mut self, product: ProductId, quantity: i64) -> Self {
        self.items.push(CartItem {
            product,
            quantity,
            unit_price: None,
        });
        self
    }

    pub fn with_voucher(mut self, token: impl Into<String>, series: VoucherSeriesId) -> Self {
        self.voucher_tokens.push(VoucherTokenRef {
            token: token.into(),
            series,
        });
        self
    }
}

/// Everything a condition may look at.
#[derive(Clone)]
pub struct Environment {
    mode: ExecutionMode,
    product: Option<ProductId>,
    cart: Option<Arc<CartSnapshot>>,
    catalog: Arc<dyn ProductCatalog>,
    tenant: Option<String>,
    now: DateTime<Utc>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("mode", &self.mode)
            .field("product", &self.product)
            .field("cart", &self.cart)
            .field("tenant", &self.tenant)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(catalog: Arc<dyn ProductCatalog>) -> Self {
        Self {
            mode: ExecutionMode::Product,
            product: None,
            cart: None,
            catalog,
            tenant: None,
            now: Utc::now(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_product(mut self, product: ProductId) -> Self {
        self.product = Some(product);
        self
    }

    pub fn with_cart(mut self, cart: CartSnapshot) -> Self {
        self.cart = Some(Arc::new(cart));
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Evaluate as if the current instant were `now`.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn product(&self) -> Option<ProductId> {
        self.product
    }

    pub fn cart(&self) -> Option<&CartSnapshot> {
        self.cart.as_deref()
    }

    pub fn catalog(&self) -> &dyn ProductCatalog {
        self.catalog.as_ref()
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The current product, plus every cart line's product in cart mode.
    pub fn product_pool(&self) -> Vec<ProductId> {
        let mut pool: Vec<ProductId> = self.product.into_iter().collect();
        if self.mode == ExecutionMode::Cart {
            if let Some(cart) = &self.cart {
                pool.extend(cart.items.iter().map(|item| item.product));
            }
        }
        pool
    }

    /// `product` followed by its ancestors, stopping at missing or cyclic links.
    pub fn lineage(&self, product: ProductId) -> Vec<ProductId> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(product);
        while let Some(id) = current {
            if !seen.insert(id) || !self.catalog.contains(id) {
                break;
            }
            chain.push(id);
            current = self.catalog.parent_of(id);
        }
        chain
    }
}

/// Catalog entry as read from a JSON or TOML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: ProductId,
    #[serde(default)]
    pub parent: Option<ProductId>,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: CategoryId,
    #[serde(default)]
    pub parent: Option<CategoryId>,
}

/// Serializable description of an [`InMemoryCatalog`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub products: Vec<CatalogEntry>,
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

/// [`ProductCatalog`] held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: HashMap<ProductId, CatalogEntry>,
    category_parents: HashMap<CategoryId, Option<CategoryId>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(
        &mut self,
        id: ProductId,
        parent: Option<ProductId>,
        categories: Vec<CategoryId>,
    ) -> &mut Self {
        self.products.insert(
            id,
            CatalogEntry {
                id,
                parent,
                categories,
            },
        );
        self
    }

    pub fn add_category(&mut self, id: CategoryId, parent: Option<CategoryId>) -> &mut Self {
        self.category_parents.insert(id, parent);
        self
    }

    fn category_ancestry(&self, category: CategoryId) -> Vec<CategoryId> {
        let mut chain = vec![category];
        let mut current = category;
        while let Some(Some(parent)) = self.category_parents.get(&current) {
            if chain.contains(parent) {
                break;
            }
            chain.push(*parent);
            current = *parent;
        }
        chain
    }
}

impl From<CatalogDocument> for InMemoryCatalog {
    fn from(doc: CatalogDocument) -> Self {
        let mut catalog = InMemoryCatalog::new();
        for category in doc.categories {
            catalog.add_category(category.id, category.parent);
        }
        for product in doc.products {
            catalog.add_product(product.id, product.parent, product.categories);
        }
        catalog
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn contains(&self, product: ProductId) -> bool {
        self.products.contains_key(&product)
    }

    fn parent_of(&self, product: ProductId) -> Option<ProductId> {
        self.products.get(&product).and_then(|p| p.parent)
    }

    fn in_category(&self, product: ProductId, category: CategoryId) -> bool {
        self.products.get(&product).is_some_and(|entry| {
            entry
                .categories
                .iter()
                .any(|c| self.category_ancestry(*c).contains(&category))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn catalog() -> Arc<InMemoryCatalog> {
        let mut catalog = InMemoryCatalog::new();
        catalog
            .add_category(CategoryId::new(1), None)
            .add_category(CategoryId::new(2), Some(CategoryId::new(1)))
            .add_product(ProductId::new(10), None, vec![CategoryId::new(2)])
            .add_product(ProductId::new(11), Some(ProductId::new(10)), vec![])
            .add_product(ProductId::new(12), Some(ProductId::new(11)), vec![]);
        Arc::new(catalog)
    }

    #[test]
    fn test_lineage_walks_parents() {
        let env = Environment::new(catalog());
        assert_eq!(
            env.lineage(ProductId::new(12)),
            vec![ProductId::new(12), ProductId::new(11), ProductId::new(10)]
        );
        assert!(env.lineage(ProductId::new(99)).is_empty());
    }

    #[test]
    fn test_category_ancestry() {
        let catalog = catalog();
        assert!(catalog.in_category(ProductId::new(10), CategoryId::new(1)));
        assert!(catalog.in_category(ProductId::new(10), CategoryId::new(2)));
        assert!(!catalog.in_category(ProductId::new(11), CategoryId::new(2)));
    }

    #[test]
    fn test_product_pool_includes_cart_items_in_cart_mode() {
        let cart = CartSnapshot::new(Money::new(1000, Currency::EUR)).with_item(ProductId::new(11), 2);
        let env = Environment::new(catalog())
            .with_product(ProductId::new(10))
            .with_cart(cart);

        assert_eq!(env.product_pool(), vec![ProductId::new(10)]);
        let env = env.with_mode(ExecutionMode::Cart);
        assert_eq!(env.product_pool(), vec![ProductId::new(10), ProductId::new(11)]);
    }
}
