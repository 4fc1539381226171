//! Pipeline evaluation over JSON documents
//!
//! Semantics follow the document store the compiler targets, restricted to
//! the stages and operators in [`crate::pipeline`].

use chrono::Duration;
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

use super::document::{
    as_instant, compare_values, get_path, match_candidates, remove_path, same_type, set_path,
    values_equal,
};
use crate::pipeline::{
    format_timestamp, Accumulator, Expr, Lookup, OrderDirection, Projection, ProjectionMode,
    SortSpec, Stage,
};
use crate::{Error, Result};

fn store_error(message: impl Into<String>) -> Error {
    Error::Store(message.into())
}

/// Truthiness used by `$cond` and `$and`.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_f64() {
            Some(f) => f != 0.0,
            None => true,
        },
        _ => true,
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Evaluate an expression against one document. Missing values are null.
pub fn evaluate(expr: &Expr, doc: &Value) -> Result<Value> {
    Ok(match expr {
        Expr::Field(path) => get_path(doc, path).cloned().unwrap_or(Value::Null),
        Expr::Root => doc.clone(),
        Expr::Literal(value) => value.clone(),
        Expr::Timestamp(at) => Value::String(format_timestamp(*at)),
        Expr::Subtract(lhs, rhs) => subtract(&evaluate(lhs, doc)?, &evaluate(rhs, doc)?)?,
        Expr::IfNull(value, fallback) => match evaluate(value, doc)? {
            Value::Null => evaluate(fallback, doc)?,
            present => present,
        },
        Expr::Eq(lhs, rhs) => Value::Bool(values_equal(&evaluate(lhs, doc)?, &evaluate(rhs, doc)?)),
        Expr::Gt(lhs, rhs) => Value::Bool(
            compare_values(&evaluate(lhs, doc)?, &evaluate(rhs, doc)?) == Ordering::Greater,
        ),
        Expr::And(terms) => {
            for term in terms {
                if !truthy(&evaluate(term, doc)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Value::Bool(true)
        }
        Expr::Cond {
            test,
            then,
            otherwise,
        } => {
            if truthy(&evaluate(test, doc)?) {
                evaluate(then, doc)?
            } else {
                evaluate(otherwise, doc)?
            }
        }
        Expr::Size(array) => match evaluate(array, doc)? {
            Value::Array(items) => json!(items.len()),
            other => return Err(store_error(format!("$size requires an array, got {other}"))),
        },
        Expr::ArrayElemAt(array, index) => match evaluate(array, doc)? {
            Value::Null => Value::Null,
            Value::Array(items) => element_at(&items, *index).cloned().unwrap_or(Value::Null),
            other => {
                return Err(store_error(format!(
                    "$arrayElemAt requires an array, got {other}"
                )))
            }
        },
        Expr::Slice(array, n) => match evaluate(array, doc)? {
            Value::Null => Value::Null,
            Value::Array(items) => Value::Array(slice(items, *n)),
            other => return Err(store_error(format!("$slice requires an array, got {other}"))),
        },
        Expr::Min(array) => extreme(&evaluate(array, doc)?, Ordering::Less),
        Expr::Max(array) => extreme(&evaluate(array, doc)?, Ordering::Greater),
        Expr::Avg(array) => average(&evaluate(array, doc)?),
        Expr::GetField { field, input } => match evaluate(input, doc)? {
            Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Expr::MergeObjects(parts) => {
            let mut merged = Map::new();
            for part in parts {
                match evaluate(part, doc)? {
                    Value::Null => {}
                    Value::Object(map) => merged.extend(map),
                    other => {
                        return Err(store_error(format!(
                            "$mergeObjects requires objects, got {other}"
                        )))
                    }
                }
            }
            Value::Object(merged)
        }
        Expr::ArrayToObject(array) => match evaluate(array, doc)? {
            Value::Null => Value::Null,
            Value::Array(entries) => array_to_object(entries)?,
            other => {
                return Err(store_error(format!(
                    "$arrayToObject requires an array, got {other}"
                )))
            }
        },
        Expr::Object(fields) => {
            let mut map = Map::new();
            for (name, field) in fields {
                map.insert(name.clone(), evaluate(field, doc)?);
            }
            Value::Object(map)
        }
        Expr::FilterIn { input, key, values } => match evaluate(input, doc)? {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .filter(|item| {
                        item.get(key)
                            .is_some_and(|v| values.iter().any(|accepted| values_equal(v, accepted)))
                    })
                    .collect(),
            ),
            _ => Value::Null,
        },
    })
}

fn subtract(lhs: &Value, rhs: &Value) -> Result<Value> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        if let Some(diff) = a.checked_sub(b) {
            return Ok(json!(diff));
        }
    }
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return Ok(json!(a - b));
    }
    match (as_instant(lhs), as_instant(rhs), rhs.as_i64()) {
        (Some(a), Some(b), _) => Ok(json!((a - b).num_milliseconds())),
        (Some(a), None, Some(ms)) => Ok(Value::String(format_timestamp(
            a - Duration::milliseconds(ms),
        ))),
        _ => Err(store_error(format!("cannot $subtract {rhs} from {lhs}"))),
    }
}

fn element_at(items: &[Value], index: i64) -> Option<&Value> {
    if index >= 0 {
        usize::try_from(index).ok().and_then(|i| items.get(i))
    } else {
        let back = usize::try_from(index.unsigned_abs()).ok()?;
        items.len().checked_sub(back).and_then(|i| items.get(i))
    }
}

fn slice(items: Vec<Value>, n: i64) -> Vec<Value> {
    let count = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
    if n >= 0 {
        items.into_iter().take(count).collect()
    } else {
        let skip = items.len().saturating_sub(count);
        items.into_iter().skip(skip).collect()
    }
}

fn numbers(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| v.is_number()).collect(),
        Value::Number(_) => vec![value],
        _ => Vec::new(),
    }
}

fn extreme(value: &Value, wanted: Ordering) -> Value {
    numbers(value)
        .into_iter()
        .reduce(|best, v| if compare_values(v, best) == wanted { v } else { best })
        .cloned()
        .unwrap_or(Value::Null)
}

#[allow(clippy::cast_precision_loss)]
fn average(value: &Value) -> Value {
    let nums: Vec<f64> = numbers(value).iter().filter_map(|v| v.as_f64()).collect();
    if nums.is_empty() {
        return Value::Null;
    }
    json!(nums.iter().sum::<f64>() / nums.len() as f64)
}

fn array_to_object(entries: Vec<Value>) -> Result<Value> {
    let mut map = Map::new();
    for entry in entries {
        let (key, value) = match entry {
            Value::Object(mut pair) => (pair.remove("k"), pair.remove("v")),
            Value::Array(mut pair) if pair.len() == 2 => {
                let value = pair.pop();
                (pair.pop(), value)
            }
            other => {
                return Err(store_error(format!(
                    "$arrayToObject entries must be {{k, v}} or [k, v], got {other}"
                )))
            }
        };
        let Some(Value::String(key)) = key else {
            return Err(store_error("$arrayToObject keys must be strings"));
        };
        map.insert(key, value.unwrap_or(Value::Null));
    }
    Ok(Value::Object(map))
}

// ============================================================================
// Match filters
// ============================================================================

/// Whether `doc` satisfies a match filter.
pub fn matches(filter: &Value, doc: &Value) -> Result<bool> {
    let Value::Object(clauses) = filter else {
        return Err(store_error(format!("match filter must be an object, got {filter}")));
    };
    for (key, condition) in clauses {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for term in logical_terms(key, condition)? {
                    if !matches(term, doc)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_term(key, condition, doc)?,
            "$nor" => !any_term(key, condition, doc)?,
            op if op.starts_with('$') => {
                return Err(store_error(format!("unsupported top-level operator {op}")))
            }
            path => field_matches(doc, path, condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical_terms<'a>(op: &str, condition: &'a Value) -> Result<&'a Vec<Value>> {
    match condition {
        Value::Array(terms) if !terms.is_empty() => Ok(terms),
        _ => Err(store_error(format!("{op} requires a non-empty array"))),
    }
}

fn any_term(op: &str, condition: &Value, doc: &Value) -> Result<bool> {
    for term in logical_terms(op, condition)? {
        if matches(term, doc)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_operator_object(condition: &Value) -> bool {
    condition
        .as_object()
        .is_some_and(|ops| !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')))
}

fn field_matches(doc: &Value, path: &str, condition: &Value) -> Result<bool> {
    if !is_operator_object(condition) {
        return Ok(equals_any(&match_candidates(doc, path), condition));
    }
    let Value::Object(ops) = condition else {
        return Ok(false);
    };
    for (op, arg) in ops {
        if !operator_matches(doc, path, op, arg)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals_any(candidates: &[&Value], target: &Value) -> bool {
    if target.is_null() && candidates.is_empty() {
        return true;
    }
    candidates.iter().any(|c| values_equal(c, target))
}

fn operator_matches(doc: &Value, path: &str, op: &str, arg: &Value) -> Result<bool> {
    let candidates = match_candidates(doc, path);
    let compare = |accept: fn(Ordering) -> bool| {
        candidates
            .iter()
            .any(|c| same_type(c, arg) && accept(compare_values(c, arg)))
    };
    Ok(match op {
        "$eq" => equals_any(&candidates, arg),
        "$ne" => !equals_any(&candidates, arg),
        "$gt" => compare(Ordering::is_gt),
        "$gte" => compare(Ordering::is_ge),
        "$lt" => compare(Ordering::is_lt),
        "$lte" => compare(Ordering::is_le),
        "$in" => in_list(op, &candidates, arg)?,
        "$nin" => !in_list(op, &candidates, arg)?,
        "$exists" => truthy(arg) == !candidates.is_empty(),
        "$not" => !field_matches(doc, path, arg)?,
        "$size" => match (get_path(doc, path), arg.as_u64()) {
            (Some(Value::Array(items)), Some(n)) => items.len() as u64 == n,
            _ => false,
        },
        "$all" => {
            let Value::Array(required) = arg else {
                return Err(store_error("$all requires an array"));
            };
            !required.is_empty() && required.iter().all(|r| equals_any(&candidates, r))
        }
        "$elemMatch" => {
            let Some(Value::Array(items)) = get_path(doc, path) else {
                return Ok(false);
            };
            let mut any = false;
            for item in items {
                let hit = if is_operator_object(arg) {
                    field_matches(&json!({ "v": item }), "v", arg)?
                } else {
                    matches(arg, item)?
                };
                if hit {
                    any = true;
                    break;
                }
            }
            any
        }
        other => return Err(store_error(format!("unsupported operator {other}"))),
    })
}

fn in_list(op: &str, candidates: &[&Value], arg: &Value) -> Result<bool> {
    let Value::Array(options) = arg else {
        return Err(store_error(format!("{op} requires an array")));
    };
    Ok(options.iter().any(|option| equals_any(candidates, option)))
}

// ============================================================================
// Stages
// ============================================================================

/// Apply one stage. `collection` resolves foreign collections for lookups.
pub fn apply_stage<F>(stage: &Stage, docs: Vec<Value>, collection: &F) -> Result<Vec<Value>>
where
    F: Fn(&str) -> Vec<Value>,
{
    match stage {
        Stage::Match(filter) => {
            let mut kept = Vec::with_capacity(docs.len());
            for doc in docs {
                if matches(filter, &doc)? {
                    kept.push(doc);
                }
            }
            Ok(kept)
        }
        Stage::Project(projection) => Ok(docs
            .into_iter()
            .map(|doc| project(projection, doc))
            .collect()),
        Stage::AddFields(fields) => docs
            .into_iter()
            .map(|mut doc| {
                let computed = fields
                    .iter()
                    .map(|(name, expr)| Ok((name, evaluate(expr, &doc)?)))
                    .collect::<Result<Vec<_>>>()?;
                for (name, value) in computed {
                    set_path(&mut doc, name, value);
                }
                Ok(doc)
            })
            .collect(),
        Stage::Sort(spec) => Ok(sort(spec, docs)),
        Stage::Skip(n) => Ok(docs
            .into_iter()
            .skip(usize::try_from(*n).unwrap_or(usize::MAX))
            .collect()),
        Stage::Limit(n) => Ok(docs
            .into_iter()
            .take(usize::try_from(*n).unwrap_or(usize::MAX))
            .collect()),
        Stage::Unwind {
            path,
            preserve_empty,
        } => Ok(unwind(path, *preserve_empty, docs)),
        Stage::Lookup(lookup) => Ok(join(lookup, docs, &collection(&lookup.from))),
        Stage::Group { id, accumulators } => group(id, accumulators, docs),
        Stage::ReplaceRoot(expr) => docs
            .into_iter()
            .map(|doc| match evaluate(expr, &doc)? {
                root @ Value::Object(_) => Ok(root),
                other => Err(store_error(format!(
                    "$replaceRoot requires an object, got {other}"
                ))),
            })
            .collect(),
        Stage::Count(field) => Ok(if docs.is_empty() {
            Vec::new()
        } else {
            let mut out = Map::new();
            out.insert(field.clone(), json!(docs.len()));
            vec![Value::Object(out)]
        }),
    }
}

fn project(projection: &Projection, mut doc: Value) -> Value {
    match projection.mode() {
        ProjectionMode::Include => {
            let mut out = Value::Object(Map::new());
            if let Some(id) = get_path(&doc, "_id") {
                set_path(&mut out, "_id", id.clone());
            }
            for path in projection.paths() {
                if let Some(value) = get_path(&doc, path) {
                    set_path(&mut out, path, value.clone());
                }
            }
            out
        }
        ProjectionMode::Exclude => {
            for path in projection.paths() {
                remove_path(&mut doc, path);
            }
            doc
        }
    }
}

fn sort(spec: &SortSpec, mut docs: Vec<Value>) -> Vec<Value> {
    let null = Value::Null;
    docs.sort_by(|a, b| {
        spec.keys()
            .iter()
            .map(|(field, direction)| {
                let ord = compare_values(
                    get_path(a, field).unwrap_or(&null),
                    get_path(b, field).unwrap_or(&null),
                );
                match direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    docs
}

fn unwind(path: &str, preserve_empty: bool, docs: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut row = doc.clone();
                    set_path(&mut row, path, item);
                    out.push(row);
                }
            }
            Some(Value::Array(_)) => {
                if preserve_empty {
                    remove_path(&mut doc, path);
                    out.push(doc);
                }
            }
            None | Some(Value::Null) => {
                if preserve_empty {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    out
}

fn join(lookup: &Lookup, docs: Vec<Value>, foreign: &[Value]) -> Vec<Value> {
    docs.into_iter()
        .map(|mut doc| {
            let hits: Vec<Value> = match get_path(&doc, &lookup.local_field) {
                None | Some(Value::Null) => Vec::new(),
                Some(local) => foreign
                    .iter()
                    .filter(|other| {
                        get_path(other, &lookup.foreign_field).is_some_and(|v| values_equal(v, local))
                    })
                    .filter(|other| {
                        lookup.restrict.as_ref().map_or(true, |(field, accepted)| {
                            get_path(other, field)
                                .and_then(Value::as_str)
                                .is_some_and(|v| accepted.iter().any(|a| a == v))
                        })
                    })
                    .cloned()
                    .collect(),
            };
            set_path(&mut doc, &lookup.as_field, Value::Array(hits));
            doc
        })
        .collect()
}

fn group(id: &Expr, accumulators: &[(String, Accumulator)], docs: Vec<Value>) -> Result<Vec<Value>> {
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();

    for doc in docs {
        let key = evaluate(id, &doc)?;
        let slot = match index.get(&key.to_string()) {
            Some(&slot) => slot,
            None => {
                let mut state = Vec::with_capacity(accumulators.len());
                for (_, acc) in accumulators {
                    state.push(match acc {
                        Accumulator::First(expr) => evaluate(expr, &doc)?,
                        Accumulator::Push(_) => Value::Array(Vec::new()),
                    });
                }
                index.insert(key.to_string(), groups.len());
                groups.push((key, state));
                groups.len() - 1
            }
        };
        let state = &mut groups[slot].1;
        for (i, (_, acc)) in accumulators.iter().enumerate() {
            if let Accumulator::Push(expr) = acc {
                let value = evaluate(expr, &doc)?;
                if let Value::Array(items) = &mut state[i] {
                    items.push(value);
                }
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, state)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), key);
            for ((name, _), value) in accumulators.iter().zip(state) {
                out.insert(name.clone(), value);
            }
            Value::Object(out)
        })
        .collect())
}
