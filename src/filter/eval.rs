//! In-process evaluation of a [`QueryDescriptor`] over JSON documents.
//!
//! Ordering mirrors Postgres JSONB so both store backends return the same
//! rows in the same order: values of different types rank
//! `null < string < number < boolean < array < object`, and a missing field
//! behaves like SQL NULL (never matches a predicate, sorts last ascending and
//! first descending).

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::types::{FilterOp, Predicate, Projection, SortDirection, SortKey};

pub fn matches_all(doc: &Map<String, Value>, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| matches(doc, p))
}

pub fn matches(doc: &Map<String, Value>, predicate: &Predicate) -> bool {
    let field = doc.get(&predicate.field);
    match predicate.op {
        FilterOp::Eq => match field {
            None => predicate.value.is_null(),
            Some(actual) => equals_or_contains(actual, &predicate.value),
        },
        FilterOp::In => match (field, &predicate.value) {
            (Some(actual), Value::Array(candidates)) => {
                candidates.iter().any(|c| equals_or_contains(actual, c))
            }
            _ => false,
        },
        FilterOp::Gt => compare(field, &predicate.value, |o| o == Ordering::Greater),
        FilterOp::Gte => compare(field, &predicate.value, |o| o != Ordering::Less),
        FilterOp::Lt => compare(field, &predicate.value, |o| o == Ordering::Less),
        FilterOp::Lte => compare(field, &predicate.value, |o| o != Ordering::Greater),
    }
}

fn compare(actual: Option<&Value>, expected: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual.map(|a| accept(json_cmp(a, expected))).unwrap_or(false)
}

/// Arrays match when any element equals the expected value.
fn equals_or_contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) if !expected.is_array() => {
            items.iter().any(|item| json_cmp(item, expected) == Ordering::Equal)
        }
        _ => json_cmp(actual, expected) == Ordering::Equal,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values.
pub fn json_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => {
                let (fx, fy) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
            }
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y.iter())
                .map(|(l, r)| json_cmp(l, r))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| a.to_string().cmp(&b.to_string())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

pub fn sort_documents(docs: &mut [Map<String, Value>], keys: &[SortKey]) {
    docs.sort_by(|a, b| {
        for key in keys {
            let ord = cmp_nullable(a.get(&key.field), b.get(&key.field), key.direction);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn cmp_nullable(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    let ord = match (a, b) {
        (None, None) => Ordering::Equal,
        // NULL is the largest value: last ascending, first descending
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => json_cmp(x, y),
    };
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

pub fn apply_projection(doc: Map<String, Value>, projection: &Projection) -> Map<String, Value> {
    match projection {
        Projection::Include(fields) => doc
            .into_iter()
            .filter(|(k, _)| fields.iter().any(|f| f == k))
            .collect(),
        Projection::Exclude(fields) => doc
            .into_iter()
            .filter(|(k, _)| !fields.iter().any(|f| f == k))
            .collect(),
    }
}
