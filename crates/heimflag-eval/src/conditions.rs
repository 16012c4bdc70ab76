//! Baseline targeting matcher with a Mongo-style query subset.
//!
//! Supported: literal equality, dotted attribute paths, `$and`, `$or`,
//! `$nor`, `$not` at the top level, and the field operators `$eq`, `$ne`,
//! `$lt`, `$lte`, `$gt`, `$gte`, `$in`, `$nin`, `$exists`, `$size`,
//! `$elemMatch`, `$all` and `$not`. Unknown operators never match.

use heimflag_core::{is_truthy, Attributes, ConditionEvaluator};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct MatchConditions;

impl ConditionEvaluator for MatchConditions {
    fn evaluate(&self, attributes: &Attributes, condition: &Value) -> bool {
        eval_condition(attributes, condition)
    }
}

fn eval_condition(attributes: &Attributes, condition: &Value) -> bool {
    let Some(clauses) = condition.as_object() else {
        return false;
    };
    clauses.iter().all(|(key, value)| match key.as_str() {
        "$or" => eval_or(attributes, value),
        "$nor" => !eval_or(attributes, value),
        "$and" => eval_and(attributes, value),
        "$not" => !eval_condition(attributes, value),
        path => eval_condition_value(value, lookup_path(attributes, path)),
    })
}

/// An empty `$or` list matches.
fn eval_or(attributes: &Attributes, conditions: &Value) -> bool {
    match conditions.as_array() {
        Some(list) if list.is_empty() => true,
        Some(list) => list.iter().any(|c| eval_condition(attributes, c)),
        None => false,
    }
}

fn eval_and(attributes: &Attributes, conditions: &Value) -> bool {
    conditions
        .as_array()
        .is_some_and(|list| list.iter().all(|c| eval_condition(attributes, c)))
}

fn lookup_path<'a>(attributes: &'a Attributes, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = attributes.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn eval_condition_value(expected: &Value, actual: Option<&Value>) -> bool {
    match expected.as_object() {
        Some(ops) if is_operator_object(expected) => ops
            .iter()
            .all(|(op, arg)| eval_operator(op, actual, arg)),
        _ => values_equal(actual.unwrap_or(&Value::Null), expected),
    }
}

fn eval_operator(op: &str, actual: Option<&Value>, expected: &Value) -> bool {
    match op {
        "$eq" => values_equal(actual.unwrap_or(&Value::Null), expected),
        "$ne" => !values_equal(actual.unwrap_or(&Value::Null), expected),
        "$lt" => compare(actual, expected) == Some(Ordering::Less),
        "$lte" => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        "$gt" => compare(actual, expected) == Some(Ordering::Greater),
        "$gte" => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        "$in" => expected.as_array().is_some_and(|list| in_list(actual, list)),
        "$nin" => expected.as_array().is_some_and(|list| !in_list(actual, list)),
        "$exists" => {
            let exists = actual.is_some_and(|a| !a.is_null());
            exists == is_truthy(Some(expected))
        }
        "$size" => actual
            .and_then(Value::as_array)
            .is_some_and(|items| eval_condition_value(expected, Some(&Value::from(items.len())))),
        "$elemMatch" => actual
            .and_then(Value::as_array)
            .is_some_and(|items| items.iter().any(|item| elem_match(item, expected))),
        "$all" => match (actual.and_then(Value::as_array), expected.as_array()) {
            (Some(items), Some(required)) => required
                .iter()
                .all(|r| items.iter().any(|item| values_equal(item, r))),
            _ => false,
        },
        "$not" => !eval_condition_value(expected, actual),
        unknown => {
            debug!(operator = unknown, "unknown condition operator");
            false
        }
    }
}

fn elem_match(item: &Value, condition: &Value) -> bool {
    if is_operator_object(condition) {
        return eval_condition_value(condition, Some(item));
    }
    match item.as_object() {
        Some(fields) => {
            let attributes: Attributes =
                fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            eval_condition(&attributes, condition)
        }
        None => false,
    }
}

/// Arrays match if any element is in the list.
fn in_list(actual: Option<&Value>, list: &[Value]) -> bool {
    match actual {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| list.iter().any(|v| values_equal(item, v))),
        Some(value) => list.iter().any(|v| values_equal(value, v)),
        None => false,
    }
}

/// Numbers compare by value, so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
