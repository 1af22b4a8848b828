//! Price systems: where product prices come from.
//!
//! The search index stores no prices, so price-sorted product lists hand
//! their matching ids to the price system named on the hits.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CommerceError, Result};
use crate::ids::ProductId;
use crate::index::list::SortDirection;
use crate::money::{Currency, Money};
use crate::pricing::{Environment, PriceInfo, PricingManager, ProductCatalog};

/// Source of product prices.
pub trait PriceSystem: Send + Sync {
    fn name(&self) -> &str;

    /// Keep the ids priced within `[from, to]`, ordered by price, then page.
    fn filter_product_ids(
        &self,
        ids: &[ProductId],
        from: Option<f64>,
        to: Option<f64>,
        order: SortDirection,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<ProductId>>;

    fn price_info(&self, product: ProductId, quantity: i64, env: &Environment) -> Result<PriceInfo>;
}

/// Resolves price systems by name.
pub trait PriceSystemLocator: Send + Sync {
    fn price_system(&self, name: &str) -> Result<Arc<dyn PriceSystem>>;
}

#[derive(Clone, Default)]
pub struct PriceSystemRegistry {
    systems: HashMap<String, Arc<dyn PriceSystem>>,
}

impl fmt::Debug for PriceSystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.systems.keys().collect();
        names.sort();
        f.debug_struct("PriceSystemRegistry").field("systems", &names).finish()
    }
}

impl PriceSystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, system: Arc<dyn PriceSystem>) -> &mut Self {
        self.systems.insert(system.name().to_string(), system);
        self
    }
}

impl PriceSystemLocator for PriceSystemRegistry {
    fn price_system(&self, name: &str) -> Result<Arc<dyn PriceSystem>> {
        self.systems
            .get(name)
            .cloned()
            .ok_or_else(|| CommerceError::PriceSystemNotFound(name.to_string()))
    }
}

/// Price system backed by a fixed price list, with pricing rules applied on top.
pub struct CatalogPriceSystem {
    name: String,
    currency: Currency,
    prices: HashMap<ProductId, Money>,
    catalog: Arc<dyn ProductCatalog>,
    pricing: Option<Arc<PricingManager>>,
}

impl fmt::Debug for CatalogPriceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogPriceSystem")
            .field("name", &self.name)
            .field("currency", &self.currency)
            .field("prices", &self.prices.len())
            .finish_non_exhaustive()
    }
}

impl CatalogPriceSystem {
    pub fn new(name: impl Into<String>, currency: Currency, catalog: Arc<dyn ProductCatalog>) -> Self {
        Self {
            name: name.into(),
            currency,
            prices: HashMap::new(),
            catalog,
            pricing: None,
        }
    }

    pub fn with_pricing_manager(mut self, pricing: Arc<PricingManager>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn set_price(&mut self, product: ProductId, price: Money) -> &mut Self {
        self.prices.insert(product, price);
        self
    }

    /// Rule-adjusted unit price, `None` when the product has no list price.
    fn effective_price(&self, product: ProductId) -> Option<Money> {
        let env = Environment::new(Arc::clone(&self.catalog)).with_product(product);
        self.price_info(product, 1, &env).ok().map(|info| info.price)
    }
}

impl PriceSystem for CatalogPriceSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter_product_ids(
        &self,
        ids: &[ProductId],
        from: Option<f64>,
        to: Option<f64>,
        order: SortDirection,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<ProductId>> {
        let from = from.map(|v| Money::from_decimal(v, self.currency).amount_cents);
        let to = to.map(|v| Money::from_decimal(v, self.currency).amount_cents);
        let ranged = from.is_some() || to.is_some();

        let mut priced: Vec<(ProductId, Option<i64>)> = ids
            .iter()
            .map(|id| (*id, self.effective_price(*id).map(|p| p.amount_cents)))
            .filter(|(_, price)| match price {
                Some(cents) => from.map_or(true, |f| *cents >= f) && to.map_or(true, |t| *cents <= t),
                None => !ranged,
            })
            .collect();

        // unpriced products go last in either direction
        priced.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => match order {
                SortDirection::Asc => a.cmp(b),
                SortDirection::Desc => b.cmp(a),
            },
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        Ok(priced
            .into_iter()
            .map(|(id, _)| id)
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn price_info(&self, product: ProductId, quantity: i64, env: &Environment) -> Result<PriceInfo> {
        let base = self
            .prices
            .get(&product)
            .copied()
            .ok_or_else(|| CommerceError::InvalidDocument(format!("no price for product {product}")))?;
        let mut info = PriceInfo::new(product, quantity, base);
        if let Some(pricing) = &self.pricing {
            pricing.apply_product_rules(&mut info, &env.clone().with_product(product));
        }
        Ok(info)
    }
}
