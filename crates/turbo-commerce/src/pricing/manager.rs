//! Rule evaluation over an immutable rule snapshot.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::ids::RuleId;
use crate::pricing::action::{ActionRegistry, CartAdjustments};
use crate::pricing::condition::{Condition, ConditionRegistry};
use crate::pricing::environment::{Environment, ExecutionMode};
use crate::pricing::price_info::PriceInfo;
use crate::pricing::rule::{Rule, RuleBehavior, RuleDocument};

/// Result of a cart pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartRuleOutcome {
    pub applied_rules: Vec<RuleId>,
    pub adjustments: CartAdjustments,
}

/// Applies pricing rules to products and carts.
///
/// Rules live in a snapshot that is replaced as a whole. An evaluation holds
/// on to the snapshot it started with, so a concurrent reload never shows up
/// half-way through a pass.
#[derive(Debug)]
pub struct PricingManager {
    conditions: ConditionRegistry,
    actions: ActionRegistry,
    rules: RwLock<Arc<[Rule]>>,
    enabled: bool,
}

impl Default for PricingManager {
    fn default() -> Self {
        Self::new(ConditionRegistry::with_defaults(), ActionRegistry::with_defaults())
    }
}

impl PricingManager {
    pub fn new(conditions: ConditionRegistry, actions: ActionRegistry) -> Self {
        Self {
            conditions,
            actions,
            rules: RwLock::new(Arc::from(Vec::new())),
            enabled: true,
        }
    }

    /// A disabled manager leaves prices and carts untouched.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn condition_registry(&self) -> &ConditionRegistry {
        &self.conditions
    }

    pub fn action_registry(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Empty condition of the given type.
    pub fn condition(&self, tag: &str) -> Result<Box<dyn Condition>> {
        self.conditions.create(tag)
    }

    /// Replace the rule snapshot. Rules are ordered by ascending priority, then id.
    pub fn replace_rules(&self, mut rules: Vec<Rule>) {
        rules.sort_by_key(|r| (r.prio, r.id));
        *self.rules.write() = Arc::from(rules);
    }

    /// Build rules from documents and install them. Nothing changes on error.
    pub fn load_rules(&self, docs: &[RuleDocument]) -> Result<usize> {
        let rules = docs
            .iter()
            .map(|doc| Rule::from_document(doc, &self.conditions, &self.actions))
            .collect::<Result<Vec<_>>>()?;
        let count = rules.len();
        self.replace_rules(rules);
        Ok(count)
    }

    pub fn load_rules_json(&self, json: &str) -> Result<usize> {
        let docs: Vec<RuleDocument> = serde_json::from_str(json)?;
        self.load_rules(&docs)
    }

    /// Current snapshot.
    pub fn rules(&self) -> Arc<[Rule]> {
        self.rules.read().clone()
    }

    pub fn rules_document(&self) -> Vec<RuleDocument> {
        self.rules().iter().map(Rule::to_document).collect()
    }

    /// Run every active rule with product actions whose condition holds.
    ///
    /// Returns the ids of the rules that ran.
    pub fn apply_product_rules(&self, price: &mut PriceInfo, env: &Environment) -> Vec<RuleId> {
        if !self.enabled {
            return Vec::new();
        }
        let env = env.clone().with_mode(ExecutionMode::Product);
        let rules = self.rules();
        let mut applied = Vec::new();
        for rule in rules.iter().filter(|r| r.active && r.has_product_actions()) {
            if !rule.check(&env) {
                continue;
            }
            debug!(rule = %rule.id, product = %price.product, "applying product rule");
            rule.execute_on_product(price, &env);
            applied.push(rule.id);
            if rule.behavior == RuleBehavior::StopExecute {
                break;
            }
        }
        applied
    }

    /// Run every active rule with cart actions whose condition holds.
    pub fn apply_cart_rules(&self, env: &Environment) -> CartRuleOutcome {
        let mut outcome = CartRuleOutcome::default();
        if !self.enabled {
            return outcome;
        }
        let env = env.clone().with_mode(ExecutionMode::Cart);
        let rules = self.rules();
        for rule in rules.iter().filter(|r| r.active && r.has_cart_actions()) {
            if !rule.check(&env) {
                continue;
            }
            debug!(rule = %rule.id, "applying cart rule");
            rule.execute_on_cart(&mut outcome.adjustments, &env);
            outcome.applied_rules.push(rule.id);
            if rule.behavior == RuleBehavior::StopExecute {
                break;
            }
        }
        outcome
    }

    /// Active rules whose condition holds in `env`, regardless of their actions.
    pub fn matching_rules(&self, env: &Environment) -> Vec<RuleId> {
        self.rules()
            .iter()
            .filter(|r| r.active && r.check(env))
            .map(|r| r.id)
            .collect()
    }
}
