//! Condition trees and rules evaluated end to end.

mod common;

use common::{env, registry, Probe};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use turbo_commerce::ids::{ProductId, RuleId};
use turbo_commerce::pricing::{
    ActionRegistry, Bracket, BracketOperator, Condition, PricingManager, RuleDocument,
};

fn manager() -> PricingManager {
    PricingManager::new(registry(), ActionRegistry::with_defaults())
}

#[test]
fn test_empty_bracket_matches() {
    assert!(Bracket::new().check(&env()));

    let manager = manager();
    manager
        .load_rules_json(r#"[{"id": 1, "name": "always", "condition": {"type": "Bracket", "conditions": []}}]"#)
        .unwrap();
    assert_eq!(manager.matching_rules(&env()), vec![RuleId::new(1)]);
}

#[test]
fn test_failing_and_stops_evaluation() {
    let (seed, _) = Probe::new(true);
    let (failing, _) = Probe::new(false);
    let (never, never_checks) = Probe::new(true);
    let bracket = Bracket::new()
        .with(seed, None)
        .with(failing, Some(BracketOperator::And))
        .with(never, Some(BracketOperator::Or));

    assert!(!bracket.check(&env()));
    assert_eq!(Probe::count(&never_checks), 0);
}

#[test]
fn test_or_recovers_failing_seed() {
    let (seed, _) = Probe::new(false);
    let (alternative, _) = Probe::new(true);
    let bracket = Bracket::new()
        .with(seed, None)
        .with(alternative, Some(BracketOperator::Or));
    assert!(bracket.check(&env()));
}

#[test]
fn test_passing_and_not_fails() {
    let (seed, _) = Probe::new(true);
    let (excluded, _) = Probe::new(true);
    let bracket = Bracket::new()
        .with(seed, None)
        .with(excluded, Some(BracketOperator::AndNot));
    assert!(!bracket.check(&env()));
}

#[test]
fn test_rule_documents_survive_round_trip() {
    let docs = json!([
        {
            "id": 7,
            "name": "outlet shoes",
            "prio": 2,
            "condition": {"type": "Bracket", "conditions": [
                {"operator": null, "condition": {"type": "Tenant", "tenant": ["outlet"]}},
                {"operator": "and", "condition": {"type": "CatalogProduct", "products": [{"id": 10}]}},
                {"operator": "and_not", "condition": {"type": "Bracket", "conditions": [
                    {"type": "Probe", "result": false}
                ]}}
            ]},
            "actions": []
        },
        {"id": 3, "name": "fallback", "prio": 1}
    ]);
    let docs: Vec<RuleDocument> = serde_json::from_value(docs).unwrap();

    let original = manager();
    original.load_rules(&docs).unwrap();
    let reloaded = manager();
    reloaded.load_rules(&original.rules_document()).unwrap();
    assert_eq!(reloaded.rules_document(), original.rules_document());

    let scenarios = [
        env().with_tenant("outlet").with_product(ProductId::new(11)),
        env().with_tenant("outlet").with_product(ProductId::new(99)),
        env().with_tenant("default").with_product(ProductId::new(12)),
    ];
    for scenario in &scenarios {
        assert_eq!(reloaded.matching_rules(scenario), original.matching_rules(scenario));
    }
    assert_eq!(
        original.matching_rules(&scenarios[0]),
        vec![RuleId::new(3), RuleId::new(7)]
    );
    assert_eq!(original.matching_rules(&scenarios[1]), vec![RuleId::new(3)]);
}

fn operator() -> impl Strategy<Value = Option<BracketOperator>> {
    prop_oneof![
        Just(None),
        Just(Some(BracketOperator::And)),
        Just(Some(BracketOperator::Or)),
        Just(Some(BracketOperator::AndNot)),
    ]
}

fn bracket(entries: &[(bool, Option<BracketOperator>)]) -> Bracket {
    entries.iter().fold(Bracket::new(), |bracket, (result, op)| {
        let (probe, _) = Probe::new(*result);
        bracket.with(probe, *op)
    })
}

/// Left-to-right reference evaluation. An entry without an operator, like
/// the first one, takes over the state.
fn expected(entries: &[(bool, Option<BracketOperator>)]) -> bool {
    if entries.is_empty() {
        return true;
    }
    let mut state = None;
    for (index, (result, op)) in entries.iter().enumerate() {
        let op = if index == 0 { None } else { *op };
        match op {
            None => state = Some(*result),
            Some(BracketOperator::And) if !result => return false,
            Some(BracketOperator::AndNot) if *result => return false,
            Some(BracketOperator::And | BracketOperator::AndNot) => state = Some(state.unwrap_or(true)),
            Some(BracketOperator::Or) => {
                if *result {
                    state = Some(true);
                }
            }
        }
    }
    state.unwrap_or(false)
}

#[test]
fn test_entry_without_operator_takes_over() {
    let (seed, _) = Probe::new(true);
    let (replacing, _) = Probe::new(false);
    let bracket = Bracket::new().with(seed, None).with(replacing, None);
    assert!(!bracket.check(&env()));
}

proptest! {
    #[test]
    fn test_matches_reference_evaluation(
        entries in prop::collection::vec((any::<bool>(), operator()), 0..8),
    ) {
        prop_assert_eq!(bracket(&entries).check(&env()), expected(&entries));
    }

    #[test]
    fn test_failing_and_or_passing_and_not_is_false(
        entries in prop::collection::vec((any::<bool>(), operator()), 2..8),
    ) {
        let vetoed = entries.iter().skip(1).any(|(result, op)| {
            matches!((result, op), (false, Some(BracketOperator::And)) | (true, Some(BracketOperator::AndNot)))
        });
        prop_assume!(vetoed);
        prop_assert!(!bracket(&entries).check(&env()));
    }

    #[test]
    fn test_all_passing_without_and_not_is_true(
        ops in prop::collection::vec(
            prop_oneof![Just(None), Just(Some(BracketOperator::And)), Just(Some(BracketOperator::Or))],
            1..8,
        ),
    ) {
        let entries: Vec<_> = ops.into_iter().map(|op| (true, op)).collect();
        prop_assert!(bracket(&entries).check(&env()));
    }

    #[test]
    fn test_document_round_trip_preserves_result(
        entries in prop::collection::vec((any::<bool>(), operator()), 0..6),
    ) {
        let original = bracket(&entries);
        let rebuilt = registry().from_document(&original.to_document()).unwrap();
        prop_assert_eq!(rebuilt.check(&env()), original.check(&env()));
    }
}
