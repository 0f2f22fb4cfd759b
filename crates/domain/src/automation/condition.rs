//! Condition: the predicate a `condition` action evaluates against a contact.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contact::Contact;

/// Comparison applied between a contact field and a configured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Strict value equality (no type coercion).
    Equals,
    /// Case-insensitive substring on string-coerced operands.
    Contains,
    /// Numeric comparison; non-numeric operands count as `0`.
    GreaterThan,
    /// Numeric comparison; non-numeric operands count as `0`.
    LessThan,
}

/// `(field, operator, value)` evaluated against a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// `name`, `phone`, `email` or a custom field key.
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

impl Condition {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    #[must_use]
    pub fn evaluate(&self, contact: &Contact) -> bool {
        let actual = contact.field(&self.field).unwrap_or(Value::Null);
        match self.operator {
            ConditionOperator::Equals => actual == self.value,
            ConditionOperator::Contains => coerce_string(&actual)
                .to_lowercase()
                .contains(&coerce_string(&self.value).to_lowercase()),
            ConditionOperator::GreaterThan => coerce_number(&actual) > coerce_number(&self.value),
            ConditionOperator::LessThan => coerce_number(&actual) < coerce_number(&self.value),
        }
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?} {}", self.field, self.operator, self.value)
    }
}
