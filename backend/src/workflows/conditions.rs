// Workflow Conditions - evaluation of field/operator/value tests against a context

use regex::Regex;
use serde_json::Value;
use ticketflow_shared::{Condition, ConditionOperator, WorkflowContext};

/// Textual form substituted for a missing or null value.
pub const NIL_TEXT: &str = "<nil>";

/// Resolves a dot path against the context.
///
/// The last segment yields `Null` when absent. A non-object value in an
/// intermediate position short-circuits to an empty string.
pub fn lookup(context: &WorkflowContext, path: &str) -> Value {
    let mut current = context;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            return current.get(part).cloned().unwrap_or(Value::Null);
        }
        match current.get(part) {
            Some(Value::Object(next)) => current = next,
            _ => return Value::String(String::new()),
        }
    }

    Value::String(String::new())
}

/// String form used by substring tests and template substitution.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => NIL_TEXT.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn compare_numbers(actual: &Value, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Applies an operator to an already resolved field value. Never fails:
/// an invalid regex or an unknown operator evaluates to `false`.
pub fn evaluate_operator(operator: ConditionOperator, actual: &Value, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => values_equal(actual, expected),
        ConditionOperator::NotEquals => !values_equal(actual, expected),
        ConditionOperator::Contains => value_to_string(actual).contains(&value_to_string(expected)),
        ConditionOperator::NotContains => !value_to_string(actual).contains(&value_to_string(expected)),
        ConditionOperator::StartsWith => value_to_string(actual).starts_with(&value_to_string(expected)),
        ConditionOperator::EndsWith => value_to_string(actual).ends_with(&value_to_string(expected)),
        ConditionOperator::IsEmpty => is_empty(actual),
        ConditionOperator::IsNotEmpty => !is_empty(actual),
        ConditionOperator::MatchesRegex => match Regex::new(&value_to_string(expected)) {
            Ok(pattern) => pattern.is_match(&value_to_string(actual)),
            Err(_) => false,
        },
        ConditionOperator::GreaterThan => compare_numbers(actual, expected, |a, b| a > b),
        ConditionOperator::LessThan => compare_numbers(actual, expected, |a, b| a < b),
        ConditionOperator::GreaterOrEqual => compare_numbers(actual, expected, |a, b| a >= b),
        ConditionOperator::LessOrEqual => compare_numbers(actual, expected, |a, b| a <= b),
        ConditionOperator::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(actual, item))),
        ConditionOperator::NotIn => expected
            .as_array()
            .is_some_and(|items| !items.iter().any(|item| values_equal(actual, item))),
        ConditionOperator::Unknown => false,
    }
}

pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn evaluate(condition: &Condition, context: &WorkflowContext) -> bool {
        let actual = lookup(context, &condition.field);
        evaluate_operator(condition.operator, &actual, &condition.value)
    }

    /// Checks every condition in order; `Err` carries the index of the first
    /// one that did not hold.
    pub fn evaluate_all(conditions: &[Condition], context: &WorkflowContext) -> Result<(), usize> {
        match conditions.iter().position(|c| !Self::evaluate(c, context)) {
            Some(index) => Err(index),
            None => Ok(()),
        }
    }
}
