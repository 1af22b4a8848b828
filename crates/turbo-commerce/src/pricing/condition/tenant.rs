use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{tagged_document, Condition};
use crate::pricing::environment::Environment;

/// Current checkout tenant is one of `tenants`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(default, rename = "tenant")]
    pub tenants: Vec<String>,
}

impl Tenant {
    pub const TYPE: &'static str = "Tenant";

    pub fn new<S: Into<String>>(tenants: impl IntoIterator<Item = S>) -> Self {
        Self {
            tenants: tenants.into_iter().map(Into::into).collect(),
        }
    }
}

impl Condition for Tenant {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn check(&self, env: &Environment) -> bool {
        env.tenant()
            .is_some_and(|current| self.tenants.iter().any(|t| t == current))
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::environment::InMemoryCatalog;
    use std::sync::Arc;

    #[test]
    fn test_tenant_membership() {
        let condition = Tenant::new(["b2b", "outlet"]);
        let env = Environment::new(Arc::new(InMemoryCatalog::new()));
        assert!(!condition.check(&env));
        assert!(condition.check(&env.clone().with_tenant("outlet")));
        assert!(!condition.check(&env.with_tenant("default")));
    }
}
