use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{tagged_document, Condition};
use crate::pricing::environment::Environment;

/// Evaluation instant strictly between `starting` and `ending`.
///
/// Both bounds must be set; a half-open range never matches. Bounds are unix
/// seconds in documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub starting: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub ending: Option<DateTime<Utc>>,
}

impl DateRange {
    pub const TYPE: &'static str = "DateRange";

    pub fn new(starting: DateTime<Utc>, ending: DateTime<Utc>) -> Self {
        Self {
            starting: Some(starting),
            ending: Some(ending),
        }
    }
}

impl Condition for DateRange {
    fn type_tag(&self) -> &'static str {
        Self::TYPE
    }

    fn check(&self, env: &Environment) -> bool {
        match (self.starting, self.ending) {
            (Some(starting), Some(ending)) => starting < env.now() && env.now() < ending,
            _ => false,
        }
    }

    fn to_document(&self) -> Value {
        tagged_document(Self::TYPE, self)
    }
}
