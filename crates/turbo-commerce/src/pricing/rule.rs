//! Pricing rules and their document form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::ids::RuleId;
use crate::pricing::action::{Action, ActionContext, ActionRegistry, CartAdjustments};
use crate::pricing::condition::{conditions_by_type, Condition, ConditionRegistry};
use crate::pricing::environment::Environment;
use crate::pricing::price_info::PriceInfo;

/// What happens to lower-priority rules once this one matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleBehavior {
    /// Later rules still run.
    #[default]
    Additive,
    /// No further rule runs in this pass.
    StopExecute,
}

/// A pricing rule: a condition tree plus the actions it triggers.
#[derive(Debug)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    /// Label per locale.
    pub label: BTreeMap<String, String>,
    /// Description per locale.
    pub description: BTreeMap<String, String>,
    pub active: bool,
    /// Lower runs first.
    pub prio: i32,
    pub behavior: RuleBehavior,
    /// Root of the condition tree. `None` matches everything.
    pub condition: Option<Box<dyn Condition>>,
    pub actions: Vec<Box<dyn Action>>,
}

impl Rule {
    pub fn new(id: RuleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            label: BTreeMap::new(),
            description: BTreeMap::new(),
            active: true,
            prio: 0,
            behavior: RuleBehavior::Additive,
            condition: None,
            actions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.condition = Some(Box::new(condition));
        self
    }

    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    pub fn with_prio(mut self, prio: i32) -> Self {
        self.prio = prio;
        self
    }

    pub fn with_behavior(mut self, behavior: RuleBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn label(&self, locale: &str) -> Option<&str> {
        self.label.get(locale).map(String::as_str)
    }

    pub fn check(&self, env: &Environment) -> bool {
        self.condition.as_ref().map_or(true, |c| c.check(env))
    }

    pub fn has_product_actions(&self) -> bool {
        self.actions.iter().any(|a| a.is_product_action())
    }

    pub fn has_cart_actions(&self) -> bool {
        self.actions.iter().any(|a| a.is_cart_action())
    }

    /// Leaf conditions of type `tag` anywhere in the tree.
    pub fn conditions_by_type(&self, tag: &str) -> Vec<&dyn Condition> {
        match &self.condition {
            Some(root) => conditions_by_type(root.as_ref(), tag),
            None => Vec::new(),
        }
    }

    pub fn execute_on_product(&self, price: &mut PriceInfo, env: &Environment) {
        let ctx = self.context(env);
        for action in self.actions.iter().filter(|a| a.is_product_action()) {
            action.execute_on_product(price, &ctx);
        }
        price.rules.push(self.id);
    }

    pub fn execute_on_cart(&self, adjustments: &mut CartAdjustments, env: &Environment) {
        let ctx = self.context(env);
        for action in self.actions.iter().filter(|a| a.is_cart_action()) {
            action.execute_on_cart(adjustments, &ctx);
        }
    }

    fn context<'a>(&'a self, env: &'a Environment) -> ActionContext<'a> {
        ActionContext {
            rule_id: self.id,
            rule_name: &self.name,
            env,
        }
    }

    pub fn to_document(&self) -> RuleDocument {
        RuleDocument {
            id: self.id,
            name: self.name.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
            active: self.active,
            prio: self.prio,
            behavior: self.behavior,
            condition: self.condition.as_ref().map(|c| c.to_document()),
            actions: self.actions.iter().map(|a| a.to_document()).collect(),
        }
    }

    pub fn from_document(
        doc: &RuleDocument,
        conditions: &ConditionRegistry,
        actions: &ActionRegistry,
    ) -> Result<Self> {
        let condition = match &doc.condition {
            None | Some(Value::Null) => None,
            Some(condition) => Some(conditions.from_document(condition)?),
        };
        let actions = doc
            .actions
            .iter()
            .map(|a| actions.from_document(a))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: doc.id,
            name: doc.name.clone(),
            label: doc.label.clone(),
            description: doc.description.clone(),
            active: doc.active,
            prio: doc.prio,
            behavior: doc.behavior,
            condition,
            actions,
        })
    }
}

/// Serialized rule as exchanged with the rule editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    #[serde(default)]
    pub description: BTreeMap<String, String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub prio: i32,
    #[serde(default)]
    pub behavior: RuleBehavior,
    #[serde(default)]
    pub condition: Option<Value>,
    #[serde(default)]
    pub actions: Vec<Value>,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommerceError;
    use crate::ids::ProductId;
    use crate::money::{Currency, Money};
    use crate::pricing::action::ProductDiscount;
    use crate::pricing::condition::{Bracket, BracketOperator, CatalogProduct, VoucherToken};
    use crate::pricing::environment::InMemoryCatalog;
    use crate::ids::VoucherSeriesId;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_rule_without_condition_matches() {
        let env = Environment::new(Arc::new(InMemoryCatalog::new()));
        assert!(Rule::new(RuleId::new(1), "always").check(&env));
    }

    #[test]
    fn test_rule_document_round_trip() {
        let rule = Rule::new(RuleId::new(4), "voucher")
            .with_prio(3)
            .with_behavior(RuleBehavior::StopExecute)
            .with_condition(
                Bracket::new()
                    .with(CatalogProduct::new([ProductId::new(1)]), None)
                    .with(VoucherToken::new([VoucherSeriesId::new(2)]), Some(BracketOperator::Or)),
            )
            .with_action(ProductDiscount::percent(10.0));

        let doc = rule.to_document();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["behavior"], json!("stopExecute"));

        let back = Rule::from_document(
            &serde_json::from_value(json).unwrap(),
            &ConditionRegistry::with_defaults(),
            &ActionRegistry::with_defaults(),
        )
        .unwrap();
        assert_eq!(back.to_document(), doc);
        assert_eq!(back.conditions_by_type(VoucherToken::TYPE).len(), 1);
        assert!(back.has_product_actions());
        assert!(!back.has_cart_actions());
    }

    #[test]
    fn test_unknown_action_fails_rule_load() {
        let doc: RuleDocument = serde_json::from_value(json!({
            "id": 1,
            "name": "broken",
            "actions": [{"type": "Nope"}]
        }))
        .unwrap();
        let err = Rule::from_document(
            &doc,
            &ConditionRegistry::with_defaults(),
            &ActionRegistry::with_defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, CommerceError::UnknownActionType(_)));
    }

    #[test]
    fn test_execute_on_product_records_rule() {
        let env = Environment::new(Arc::new(InMemoryCatalog::new()));
        let rule = Rule::new(RuleId::new(8), "ten off").with_action(ProductDiscount::amount(1.0));
        let mut price = PriceInfo::new(ProductId::new(1), 1, Money::new(1000, Currency::EUR));
        rule.execute_on_product(&mut price, &env);
        assert_eq!(price.price.amount_cents, 900);
        assert_eq!(price.rules, vec![RuleId::new(8)]);
    }
}
