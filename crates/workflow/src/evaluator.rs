use tracing::debug;

use crm_core::campaign::{ConditionConfig, ConditionOperator};
use crm_core::types::Lead;

/// Evaluates condition steps against a lead's fields.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` when the lead satisfies the condition.
    ///
    /// Strings compare case-insensitively after trimming; numbers compare
    /// numerically, including numbers stored as strings. A missing field
    /// only satisfies `not_equals` and `not_exists`.
    pub fn evaluate(&self, condition: &ConditionConfig, lead: &Lead) -> bool {
        let actual = lead.field(&condition.field).filter(|v| !is_blank(v));
        let expected = &condition.value;

        let result = match condition.operator {
            ConditionOperator::Exists => actual.is_some(),
            ConditionOperator::NotExists => actual.is_none(),
            ConditionOperator::Equals => actual.is_some_and(|a| values_equal(&a, expected)),
            ConditionOperator::NotEquals => !actual.is_some_and(|a| values_equal(&a, expected)),
            ConditionOperator::Contains => actual.is_some_and(|a| contains(&a, expected)),
            ConditionOperator::In => actual.is_some_and(|a| match expected {
                serde_json::Value::Array(options) => options.iter().any(|o| values_equal(&a, o)),
                single => values_equal(&a, single),
            }),
        };

        debug!(
            field = %condition.field,
            operator = ?condition.operator,
            result,
            "Condition evaluated"
        );
        result
    }
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}

fn values_equal(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return (a - b).abs() < f64::EPSILON;
    }
    match (actual, expected) {
        (serde_json::Value::Bool(a), serde_json::Value::Bool(b)) => a == b,
        _ => as_text(actual) == as_text(expected),
    }
}

fn contains(actual: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match actual {
        serde_json::Value::Array(items) => items.iter().any(|i| values_equal(i, needle)),
        other => as_text(other).contains(&as_text(needle)),
    }
}
