//! Pricing rules.
//!
//! - [`condition`]: condition tree and registry
//! - [`action`]: what a matching rule does
//! - [`rule`]: rule and its document form
//! - [`manager`]: evaluation over a rule snapshot

pub mod action;
pub mod condition;
pub mod environment;
pub mod manager;
pub mod price_info;
pub mod rule;

pub use action::{Action, ActionRegistry, AppliedDiscount, CartAdjustments};
pub use condition::{Bracket, BracketOperator, Condition, ConditionRegistry};
pub use environment::{
    CartItem, CartSnapshot, CatalogDocument, Environment, ExecutionMode, InMemoryCatalog,
    ProductCatalog,
};
pub use manager::{CartRuleOutcome, PricingManager};
pub use price_info::PriceInfo;
pub use rule::{Rule, RuleBehavior, RuleDocument};
