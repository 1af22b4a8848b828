//! Composite condition combining children with boolean operators.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{conditions_by_type, Condition, ConditionRegistry};
use crate::error::{CommerceError, Result};
use crate::pricing::environment::Environment;

/// Operator joining a bracket entry to the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketOperator {
    And,
    Or,
    AndNot,
}

impl BracketOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketOperator::And => "and",
            BracketOperator::Or => "or",
            BracketOperator::AndNot => "and_not",
        }
    }

    /// Parse a document operator. Empty or missing means "no operator".
    pub fn parse(value: Option<&Value>) -> Result<Option<Self>> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "" => Ok(None),
                "and" => Ok(Some(BracketOperator::And)),
                "or" => Ok(Some(BracketOperator::Or)),
                "and_not" => Ok(Some(BracketOperator::AndNot)),
                other => Err(CommerceError::InvalidDocument(format!(
                    "unknown bracket operator \"{other}\""
                ))),
            },
            Some(other) => Err(CommerceError::InvalidDocument(format!(
                "bracket operator must be a string, got {other}"
            ))),
        }
    }
}

/// Ordered list of `(condition, operator)` pairs.
///
/// Evaluation is not textbook boolean algebra. The first entry seeds the
/// state and its operator is ignored; any later entry without an operator
/// replaces the state with its own result. A passing `and` or a failing `and_not`
/// only confirms the state (setting it to true when still unset), a failing
/// `and` or a passing `and_not` returns false at once, and `or` can only turn
/// the state true. An empty bracket is true, an unset final state is false.
#[derive(Debug, Default)]
pub struct Bracket {
    entries: Vec<(Box<dyn Condition>, Option<BracketOperator>)>,
}

impl Bracket {
    pub const TYPE: &'static str = "Bracket";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_condition(
        &mut self,
        condition: Box<dyn Condition>,
        operator: Option<BracketOperator>,
    ) -> &mut Self {
        self.entries.push((condition, operator));
        self
    }

    /// Builder form of [`Bracket::add_condition`].
    pub fn with(
        mut self,
        condition: impl Condition + 'static,
        operator: Option<BracketOperator>,
    ) -> Self {
        self.entries.push((Box::new(condition), operator));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&dyn Condition, Option<BracketOperator>)> + '_ {
        self.entries.iter().map(|(c, op)| (c.as_ref(), *op))
    }

    /// Leaves of type `tag`, descending into nested brackets.
    pub fn conditions_by_type(&self, tag: &str) -> Vec<&dyn Condition> {
        self.entries
            .iter()
            .flat_map(|(condition, _)| conditions_by_type(condition.as_ref(), tag))
            .collect()
    }

    /// Build from a document.
    ///
    /// Entries may be nested (`{"operator": .., "condition": {..}}`) or flat,
    /// with the operator next to the condition's own fields.
    pub fn from_document(doc: &Value, registry: &ConditionRegistry) -> Result<Self> {
        let mut bracket = Bracket::new();
        let entries = match doc.get("conditions") {
            None | Some(Value::Null) => return Ok(bracket),
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(CommerceError::InvalidDocument(
                    "bracket \"conditions\" must be a list".into(),
                ))
            }
        };

        for entry in entries {
            let operator = BracketOperator::parse(entry.get("operator"))?;
            let condition_doc = match entry.get("condition") {
                Some(nested) if nested.is_object() => nested,
                _ => entry,
            };
            bracket.add_condition(registry.from_document(condition_doc)?, operator);
        }
        Ok(bracket)
    }
}

impl Condition for Bracket {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn check(&self, env: &Environment) -> bool {
        if self.entries.is_empty() {
            return true;
        }

        let mut state: Option<bool> = None;
        for (index, (condition, operator)) in self.entries.iter().enumerate() {
            let result = condition.check(env);
            let operator = if index == 0 { None } else { *operator };
            match operator {
                Some(BracketOperator::And) => {
                    if !result {
                        return false;
                    }
                    state = Some(state.unwrap_or(true));
                }
                Some(BracketOperator::AndNot) => {
                    if result {
                        return false;
                    }
                    state = Some(state.unwrap_or(true));
                }
                Some(BracketOperator::Or) => {
                    if result {
                        state = Some(true);
                    }
                }
                None => state = Some(result),
            }
        }
        state.unwrap_or(false)
    }

    fn to_document(&self) -> Value {
        let conditions: Vec<Value> = self
            .entries
            .iter()
            .map(|(condition, operator)| {
                json!({
                    "operator": operator.map(|op| op.as_str()),
                    "condition": condition.to_document(),
                })
            })
            .collect();
        json!({ "type": Self::TYPE, "conditions": conditions })
    }

    fn as_bracket(&self) -> Option<&Bracket> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::environment::InMemoryCatalog;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Fixed(bool);

    impl Condition for Fixed {
        fn type_tag(&self) -> &'static str {
            "Fixed"
        }

        fn check(&self, _env: &Environment) -> bool {
            self.0
        }

        fn to_document(&self) -> Value {
            json!({"type": "Fixed", "value": self.0})
        }
    }

    fn env() -> Environment {
        Environment::new(Arc::new(InMemoryCatalog::new()))
    }

    fn registry() -> ConditionRegistry {
        let mut registry = ConditionRegistry::with_defaults();
        registry.register("Fixed", |doc, _| {
            Ok(Box::new(Fixed(doc["value"].as_bool().unwrap_or(false))))
        });
        registry
    }

    #[test]
    fn test_empty_bracket_is_true() {
        assert!(Bracket::new().check(&env()));
    }

    #[test]
    fn test_seed_operator_is_ignored() {
        let bracket = Bracket::new().with(Fixed(true), Some(BracketOperator::AndNot));
        assert!(bracket.check(&env()));
        let bracket = Bracket::new().with(Fixed(false), Some(BracketOperator::Or));
        assert!(!bracket.check(&env()));
    }

    #[test]
    fn test_and_false_short_circuits() {
        for seed in [true, false] {
            let bracket = Bracket::new()
                .with(Fixed(seed), None)
                .with(Fixed(false), Some(BracketOperator::And));
            assert!(!bracket.check(&env()));
        }
    }

    #[test]
    fn test_and_true_keeps_false_seed() {
        let bracket = Bracket::new()
            .with(Fixed(false), None)
            .with(Fixed(true), Some(BracketOperator::And));
        assert!(!bracket.check(&env()));
    }

    #[test]
    fn test_or_recovers_false_seed() {
        let bracket = Bracket::new()
            .with(Fixed(false), None)
            .with(Fixed(true), Some(BracketOperator::Or));
        assert!(bracket.check(&env()));
    }

    #[test]
    fn test_false_or_does_not_reset_state() {
        let bracket = Bracket::new()
            .with(Fixed(true), None)
            .with(Fixed(false), Some(BracketOperator::Or));
        assert!(bracket.check(&env()));
    }

    #[test]
    fn test_and_not_true_fails() {
        let bracket = Bracket::new()
            .with(Fixed(true), None)
            .with(Fixed(true), Some(BracketOperator::AndNot));
        assert!(!bracket.check(&env()));
        let bracket = Bracket::new()
            .with(Fixed(true), None)
            .with(Fixed(false), Some(BracketOperator::AndNot));
        assert!(bracket.check(&env()));
    }

    #[test]
    fn test_missing_operator_replaces_state() {
        let bracket = Bracket::new().with(Fixed(true), None).with(Fixed(false), None);
        assert!(!bracket.check(&env()));

        let bracket = Bracket::new()
            .with(Fixed(false), None)
            .with(Fixed(false), Some(BracketOperator::Or))
            .with(Fixed(true), None);
        assert!(bracket.check(&env()));

        let doc = json!({
            "type": "Bracket",
            "conditions": [
                {"operator": null, "condition": {"type": "Fixed", "value": true}},
                {"operator": "", "condition": {"type": "Fixed", "value": false}},
            ]
        });
        assert!(!registry().from_document(&doc).unwrap().check(&env()));
    }

    #[test]
    fn test_document_shape() {
        let bracket = Bracket::new()
            .with(Fixed(true), None)
            .with(Fixed(false), Some(BracketOperator::AndNot));
        assert_eq!(
            bracket.to_document(),
            json!({
                "type": "Bracket",
                "conditions": [
                    {"operator": null, "condition": {"type": "Fixed", "value": true}},
                    {"operator": "and_not", "condition": {"type": "Fixed", "value": false}},
                ]
            })
        );
    }

    #[test]
    fn test_flat_entries_are_accepted() {
        let doc = json!({
            "type": "Bracket",
            "conditions": [
                {"type": "Fixed", "value": false},
                {"type": "Fixed", "value": true, "operator": "or"},
            ]
        });
        let condition = registry().from_document(&doc).unwrap();
        assert!(condition.check(&env()));
        assert_eq!(condition.as_bracket().map(Bracket::len), Some(2));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let doc = json!({
            "type": "Bracket",
            "conditions": [{"operator": "xor", "condition": {"type": "Fixed"}}]
        });
        assert!(matches!(
            registry().from_document(&doc),
            Err(CommerceError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_conditions_by_type_flattens_nested_brackets() {
        let inner = Bracket::new().with(Fixed(true), None).with(Fixed(false), Some(BracketOperator::Or));
        let outer = Bracket::new()
            .with(Fixed(true), None)
            .with(inner, Some(BracketOperator::And));

        assert_eq!(outer.conditions_by_type("Fixed").len(), 3);
        assert!(outer.conditions_by_type("Bracket").is_empty());
    }
}
