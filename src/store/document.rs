//! Dotted-path access and ordering over JSON documents

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Read the value at a dotted path. Numeric segments index into arrays.
#[must_use]
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `value` at a dotted path, creating intermediate objects.
///
/// A non-object found on the way is replaced by an object.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let Value::Object(map) = doc else {
        return;
    };
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_path(child, rest, value);
        }
    }
}

/// Remove the value at a dotted path, returning it.
pub fn remove_path(doc: &mut Value, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.as_object_mut()?.remove(path),
        Some((head, rest)) => remove_path(doc.as_object_mut()?.get_mut(head)?, rest),
    }
}

/// Every value a match condition on `path` is tested against.
///
/// Arrays met on the way are traversed element-wise; an array at the end
/// contributes itself and each of its elements.
#[must_use]
pub fn match_candidates<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    collect_candidates(doc, &path.split('.').collect::<Vec<_>>(), &mut out);
    out
}

fn collect_candidates<'a>(current: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        if let Value::Array(items) = current {
            out.extend(items.iter());
        }
        out.push(current);
        return;
    };
    match current {
        Value::Object(map) => {
            if let Some(next) = map.get(*segment) {
                collect_candidates(next, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect_candidates(next, rest, out);
                }
            }
            for item in items.iter().filter(|item| item.is_object()) {
                collect_candidates(item, segments, out);
            }
        }
        _ => {}
    }
}

/// Parse a stored timestamp.
#[must_use]
pub fn as_instant(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|at| at.with_timezone(&Utc))
}

const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Whether two values fall in the same comparison bracket.
#[must_use]
pub const fn same_type(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

/// Total order across JSON types: null < numbers < strings < objects <
/// arrays < booleans. Numbers compare numerically.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y.iter())
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Equality with numeric coercion (`1 == 1.0`).
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, lv)| y.get(key).is_some_and(|rv| values_equal(lv, rv)))
        }
        _ => a == b,
    }
}
