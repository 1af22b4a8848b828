//! Pricing rule commands.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use turbo_commerce::ids::{ProductId, RuleId};
use turbo_commerce::money::Money;
use turbo_commerce::pricing::{
    ActionRegistry, CartSnapshot, CatalogDocument, Condition, ConditionRegistry, Environment,
    ExecutionMode, InMemoryCatalog, PriceInfo, PricingManager,
};

use super::{RulesArgs, RulesCommand};
use crate::config::read;
use crate::context::Context;
use crate::output::match_badge;

/// Run the rules command.
pub fn run(args: RulesArgs, ctx: &Context) -> Result<()> {
    match args.command {
        RulesCommand::Check { rules, env } => check(rules.as_deref(), env.as_deref(), ctx),
        RulesCommand::Inspect {
            rules,
            condition_type,
        } => inspect(rules.as_deref(), condition_type.as_deref(), ctx),
    }
}

/// Environment a rule check runs in, as read from a file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentDocument {
    #[serde(default)]
    mode: ExecutionMode,
    #[serde(default)]
    product: Option<ProductId>,
    /// Base price of `product`, for product passes.
    #[serde(default)]
    price: Option<Money>,
    #[serde(default = "default_quantity")]
    quantity: i64,
    #[serde(default)]
    cart: Option<CartSnapshot>,
    #[serde(default)]
    tenant: Option<String>,
    #[serde(default)]
    now: Option<DateTime<Utc>>,
    #[serde(default)]
    catalog: CatalogDocument,
}

fn default_quantity() -> i64 {
    1
}

impl EnvironmentDocument {
    fn environment(&self) -> Environment {
        let catalog = InMemoryCatalog::from(self.catalog.clone());
        let mut env = Environment::new(Arc::new(catalog)).with_mode(self.mode);
        if let Some(product) = self.product {
            env = env.with_product(product);
        }
        if let Some(cart) = &self.cart {
            env = env.with_cart(cart.clone());
        }
        if let Some(tenant) = &self.tenant {
            env = env.with_tenant(tenant.as_str());
        }
        if let Some(now) = self.now {
            env = env.at(now);
        }
        env
    }
}

fn manager(rules: Option<&str>, ctx: &Context) -> Result<PricingManager> {
    let path = ctx.path_or_config(rules, ctx.config.pricing.rules.as_deref(), "rules")?;
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read rules: {}", path.display()))?;
    let manager = PricingManager::new(ConditionRegistry::with_defaults(), ActionRegistry::with_defaults());
    let count = manager
        .load_rules_json(&json)
        .with_context(|| format!("Invalid rules in {}", path.display()))?;
    ctx.output.debug(&format!("Loaded {} rules from {}", count, path.display()));
    Ok(manager)
}

#[derive(Serialize)]
struct RuleResult {
    id: RuleId,
    name: String,
    prio: i32,
    active: bool,
    matched: bool,
}

fn check(rules: Option<&str>, env: Option<&str>, ctx: &Context) -> Result<()> {
    let manager = manager(rules, ctx)?;
    let env_path = ctx.path_or_config(env, ctx.config.pricing.env.as_deref(), "environment")?;
    let document: EnvironmentDocument = read(&env_path)?;
    let env = document.environment();

    let matched = manager.matching_rules(&env);
    let results: Vec<RuleResult> = manager
        .rules()
        .iter()
        .map(|rule| RuleResult {
            id: rule.id,
            name: rule.name.clone(),
            prio: rule.prio,
            active: rule.active,
            matched: matched.contains(&rule.id),
        })
        .collect();

    let price = match (document.product, document.price) {
        (Some(product), Some(base)) if document.mode == ExecutionMode::Product => {
            let mut price = PriceInfo::new(product, document.quantity, base);
            manager.apply_product_rules(&mut price, &env);
            Some(price)
        }
        _ => None,
    };
    let cart = (document.mode == ExecutionMode::Cart && env.cart().is_some())
        .then(|| manager.apply_cart_rules(&env));

    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "rules": results,
            "price": price,
            "cart": cart,
        }));
        return Ok(());
    }

    ctx.output.header(&format!("Rules checked against {}", env_path.display()));
    for result in &results {
        let state = if result.active {
            match_badge(result.matched)
        } else {
            "inactive".to_string()
        };
        ctx.output
            .list_item(0, &format!("#{} {} (prio {}): {}", result.id, result.name, result.prio, state));
    }

    if let Some(price) = price {
        ctx.output.header("Product price");
        ctx.output.kv("base", &price.base_price.to_string());
        ctx.output.kv("price", &price.price.to_string());
        ctx.output.kv("total", &price.total_price().to_string());
    }
    if let (Some(outcome), Some(snapshot)) = (cart, env.cart()) {
        ctx.output.header("Cart");
        for discount in &outcome.adjustments.discounts {
            ctx.output
                .list_item(0, &format!("rule #{}: -{}", discount.rule_id, discount.amount));
        }
        for gift in &outcome.adjustments.gifts {
            ctx.output.list_item(0, &format!("rule #{}: gift {}", gift.rule_id, gift.product));
        }
        if outcome.adjustments.free_shipping {
            ctx.output.list_item(0, "free shipping");
        }
        ctx.output.kv("subtotal", &snapshot.subtotal.to_string());
        ctx.output
            .kv("after discounts", &outcome.adjustments.apply_to(snapshot.subtotal).to_string());
    }

    ctx.output.success(&format!("{} of {} rules match", matched.len(), results.len()));
    Ok(())
}

fn inspect(rules: Option<&str>, condition_type: Option<&str>, ctx: &Context) -> Result<()> {
    let manager = manager(rules, ctx)?;
    let rules = manager.rules();

    if let Some(tag) = condition_type {
        let found: Vec<_> = rules
            .iter()
            .map(|rule| {
                let leaves: Vec<_> = rule.conditions_by_type(tag).iter().map(|c| c.to_document()).collect();
                json!({"id": rule.id, "name": rule.name, "conditions": leaves})
            })
            .collect();
        if ctx.output.is_json() {
            ctx.output.json(&found);
            return Ok(());
        }
        ctx.output.header(&format!("{} conditions", tag));
        for entry in &found {
            ctx.output.list_item(0, &format!("#{} {}", entry["id"], entry["name"].as_str().unwrap_or_default()));
            for leaf in entry["conditions"].as_array().into_iter().flatten() {
                ctx.output.list_item(1, &leaf.to_string());
            }
        }
        return Ok(());
    }

    if ctx.output.is_json() {
        ctx.output.json(&manager.rules_document());
        return Ok(());
    }
    ctx.output.header("Condition trees");
    for rule in rules.iter() {
        ctx.output.list_item(0, &format!("#{} {} (prio {})", rule.id, rule.name, rule.prio));
        match &rule.condition {
            Some(condition) => print_tree(condition.as_ref(), None, 1, ctx),
            None => ctx.output.list_item(1, "(always)"),
        }
    }
    Ok(())
}

fn print_tree(condition: &dyn Condition, operator: Option<&str>, depth: usize, ctx: &Context) {
    let prefix = operator.map(|op| format!("{} ", op.to_uppercase())).unwrap_or_default();
    match condition.as_bracket() {
        Some(bracket) => {
            ctx.output.list_item(depth, &format!("{}Bracket", prefix));
            for (child, op) in bracket.conditions() {
                print_tree(child, op.map(|o| o.as_str()), depth + 1, ctx);
            }
        }
        None => {
            let mut doc = condition.to_document();
            if let Some(fields) = doc.as_object_mut() {
                fields.remove("type");
            }
            ctx.output
                .list_item(depth, &format!("{}{} {}", prefix, condition.type_tag(), doc));
        }
    }
}
