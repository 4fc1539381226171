//! Aggregation expressions
//!
//! A closed subset of the document store's expression language. Every variant
//! renders to the store's JSON operator syntax and is evaluated by
//! [`crate::store::MemoryStore`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// Expression evaluated against one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted field path (`$a.b`).
    Field(String),
    /// The whole current document (`$$ROOT`).
    Root,
    /// Constant value.
    Literal(Value),
    /// Constant instant, rendered as an extended-JSON date.
    Timestamp(DateTime<Utc>),
    /// `lhs - rhs`; two instants yield milliseconds.
    Subtract(Box<Expr>, Box<Expr>),
    /// `value` unless it is null or missing, else `fallback`.
    IfNull(Box<Expr>, Box<Expr>),
    /// Equality.
    Eq(Box<Expr>, Box<Expr>),
    /// Strictly greater than, using the store's cross-type ordering.
    Gt(Box<Expr>, Box<Expr>),
    /// Logical conjunction.
    And(Vec<Expr>),
    /// Ternary.
    Cond {
        /// Condition.
        test: Box<Expr>,
        /// Value when truthy.
        then: Box<Expr>,
        /// Value otherwise.
        otherwise: Box<Expr>,
    },
    /// Array length.
    Size(Box<Expr>),
    /// Array element; negative indexes count from the end.
    ArrayElemAt(Box<Expr>, i64),
    /// First `n` elements, or last `-n` when negative.
    Slice(Box<Expr>, i64),
    /// Minimum over an array.
    Min(Box<Expr>),
    /// Maximum over an array.
    Max(Box<Expr>),
    /// Mean over an array.
    Avg(Box<Expr>),
    /// Field lookup by literal name, so names containing dots stay intact.
    GetField {
        /// Literal key.
        field: String,
        /// Object to read from.
        input: Box<Expr>,
    },
    /// Shallow merge, later objects win.
    MergeObjects(Vec<Expr>),
    /// `[{k, v}, ..]` to `{k: v, ..}`.
    ArrayToObject(Box<Expr>),
    /// Object construction.
    Object(Vec<(String, Expr)>),
    /// Keep array elements whose `key` is one of `values`.
    FilterIn {
        /// Array to filter.
        input: Box<Expr>,
        /// Key read from each element.
        key: String,
        /// Accepted values.
        values: Vec<Value>,
    },
}

/// Variable name bound to each element in a rendered `$filter`.
const FILTER_VAR: &str = "item";

impl Expr {
    /// Field path expression.
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    /// Literal expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Null literal.
    #[must_use]
    pub const fn null() -> Self {
        Self::Literal(Value::Null)
    }

    /// `$subtract`
    #[must_use]
    pub fn subtract(lhs: Self, rhs: Self) -> Self {
        Self::Subtract(Box::new(lhs), Box::new(rhs))
    }

    /// `$ifNull`
    #[must_use]
    pub fn if_null(value: Self, fallback: Self) -> Self {
        Self::IfNull(Box::new(value), Box::new(fallback))
    }

    /// `$eq`
    #[must_use]
    pub fn eq(lhs: Self, rhs: Self) -> Self {
        Self::Eq(Box::new(lhs), Box::new(rhs))
    }

    /// `$gt`
    #[must_use]
    pub fn gt(lhs: Self, rhs: Self) -> Self {
        Self::Gt(Box::new(lhs), Box::new(rhs))
    }

    /// `$cond`
    #[must_use]
    pub fn cond(test: Self, then: Self, otherwise: Self) -> Self {
        Self::Cond {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// `$getField`
    pub fn get_field(field: impl Into<String>, input: Self) -> Self {
        Self::GetField {
            field: field.into(),
            input: Box::new(input),
        }
    }

    /// Render in the store's JSON syntax.
    #[must_use]
    pub fn to_document(&self) -> Value {
        match self {
            Self::Field(path) => Value::String(format!("${path}")),
            Self::Root => Value::String("$$ROOT".to_string()),
            Self::Literal(value) => render_literal(value),
            Self::Timestamp(at) => json!({ "$date": format_timestamp(*at) }),
            Self::Subtract(lhs, rhs) => binary("$subtract", lhs, rhs),
            Self::IfNull(value, fallback) => binary("$ifNull", value, fallback),
            Self::Eq(lhs, rhs) => binary("$eq", lhs, rhs),
            Self::Gt(lhs, rhs) => binary("$gt", lhs, rhs),
            Self::And(terms) => {
                json!({ "$and": terms.iter().map(Self::to_document).collect::<Vec<_>>() })
            }
            Self::Cond {
                test,
                then,
                otherwise,
            } => json!({
                "$cond": {
                    "if": test.to_document(),
                    "then": then.to_document(),
                    "else": otherwise.to_document(),
                }
            }),
            Self::Size(array) => json!({ "$size": array.to_document() }),
            Self::ArrayElemAt(array, index) => {
                json!({ "$arrayElemAt": [array.to_document(), index] })
            }
            Self::Slice(array, n) => json!({ "$slice": [array.to_document(), n] }),
            Self::Min(array) => json!({ "$min": array.to_document() }),
            Self::Max(array) => json!({ "$max": array.to_document() }),
            Self::Avg(array) => json!({ "$avg": array.to_document() }),
            Self::GetField { field, input } => json!({
                "$getField": { "field": field, "input": input.to_document() }
            }),
            Self::MergeObjects(parts) => json!({
                "$mergeObjects": parts.iter().map(Self::to_document).collect::<Vec<_>>()
            }),
            Self::ArrayToObject(array) => json!({ "$arrayToObject": array.to_document() }),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, expr)| (name.clone(), expr.to_document()))
                    .collect::<Map<_, _>>(),
            ),
            Self::FilterIn { input, key, values } => json!({
                "$filter": {
                    "input": input.to_document(),
                    "as": FILTER_VAR,
                    "cond": { "$in": [format!("$${FILTER_VAR}.{key}"), values] },
                }
            }),
        }
    }
}

/// Format an instant the way stored timestamps are written.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn binary(op: &str, lhs: &Expr, rhs: &Expr) -> Value {
    let mut map = Map::new();
    map.insert(
        op.to_string(),
        Value::Array(vec![lhs.to_document(), rhs.to_document()]),
    );
    Value::Object(map)
}

fn render_literal(value: &Value) -> Value {
    match value {
        Value::String(s) if s.starts_with('$') => json!({ "$literal": s }),
        Value::Object(_) => json!({ "$literal": value }),
        other => other.clone(),
    }
}

/// Group accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Value from the first document of the group.
    First(Expr),
    /// Every value of the group, in input order.
    Push(Expr),
}

impl Accumulator {
    /// Render in the store's JSON syntax.
    #[must_use]
    pub fn to_document(&self) -> Value {
        match self {
            Self::First(expr) => json!({ "$first": expr.to_document() }),
            Self::Push(expr) => json!({ "$push": expr.to_document() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_field_and_root_render_as_strings() {
        assert_eq!(Expr::field("info.metrics").to_document(), json!("$info.metrics"));
        assert_eq!(Expr::Root.to_document(), json!("$$ROOT"));
    }

    #[test]
    fn test_dollar_literal_is_escaped() {
        assert_eq!(Expr::lit("$price").to_document(), json!({"$literal": "$price"}));
        assert_eq!(Expr::lit("RUNNING").to_document(), json!("RUNNING"));
    }

    #[test]
    fn test_timestamp_renders_as_date() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            Expr::Timestamp(at).to_document(),
            json!({"$date": "2024-05-01T12:00:00.000Z"})
        );
    }

    #[test]
    fn test_filter_in_renders_membership_condition() {
        let expr = Expr::FilterIn {
            input: Box::new(Expr::field("info.metrics")),
            key: "name".to_string(),
            values: vec![json!("loss")],
        };
        assert_eq!(
            expr.to_document(),
            json!({"$filter": {
                "input": "$info.metrics",
                "as": "item",
                "cond": {"$in": ["$$item.name", ["loss"]]}
            }})
        );
    }
}
