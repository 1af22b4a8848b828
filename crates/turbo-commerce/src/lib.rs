//! Pricing rules and product index query engine for TurboCommerce.
//!
//! - **Pricing**: condition trees, rules and actions evaluated against a
//!   cart or product environment
//! - **Index**: tenant configuration, index workers, and the product list
//!   that compiles filters, facets and price sorting into search requests
//! - **Price systems**: price lookup and price based filtering of product ids
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_commerce::prelude::*;
//!
//! let manager = PricingManager::new(ConditionRegistry::with_defaults(), ActionRegistry::with_defaults());
//! manager.load_rules_json(&rules_json)?;
//!
//! let env = Environment::new(catalog).with_product(ProductId::new(42));
//! let mut price = PriceInfo::new(ProductId::new(42), 1, base_price);
//! let applied = manager.apply_product_rules(&mut price, &env);
//!
//! let mut list = worker.product_list();
//! list.add_condition(json!({"term": {"system.active": true}}), "active");
//! list.prepare_group_by_values("color", true, true);
//! let products = list.load()?.to_vec();
//! let colors = list.group_by_values("color", true)?;
//! ```

pub mod error;
pub mod ids;
pub mod index;
pub mod money;
pub mod price_system;
pub mod pricing;

pub use error::{CommerceError, Result};
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{CommerceError, Result};
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};

    // Pricing
    pub use crate::pricing::{
        Action, ActionRegistry, Bracket, BracketOperator, CartSnapshot, Condition,
        ConditionRegistry, Environment, PriceInfo, PricingManager, ProductCatalog, Rule,
        RuleDocument,
    };

    // Index
    pub use crate::index::{
        Attribute, FilterConfig, FilterService, Indexable, IndexableDocument, IndexService,
        MockupCache, MySqlWorker, OpenSearchWorker, ProductList, SearchBackend, TenantConfig,
        VariantMode, Worker,
    };

    // Price systems
    pub use crate::price_system::{CatalogPriceSystem, PriceSystem, PriceSystemLocator};
}
