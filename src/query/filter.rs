//! Filter translation
//!
//! The caller sends a JSON boolean-expression tree in the store's match
//! syntax. Keys beginning with [`OPERATOR_SIGIL`] are operators (`$and`,
//! `$eq`, ...); every other key names a field. The planner needs the field
//! names up front so it can force them into the projection before the match
//! stage runs.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::{Error, Result};

/// Prefix marking logical and comparison operators.
pub const OPERATOR_SIGIL: char = '$';

/// Filter tree with the node kind made explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// Literal operand.
    Scalar(Value),
    /// Array of sub-expressions or operands.
    List(Vec<FilterNode>),
    /// Field or operator keys, in document order.
    Object(Vec<(String, FilterNode)>),
}

impl FilterNode {
    /// Classify a JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items.iter().map(Self::from_value).collect()),
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(key, child)| (key.clone(), Self::from_value(child)))
                    .collect(),
            ),
            scalar => Self::Scalar(scalar.clone()),
        }
    }

    /// Field names referenced anywhere in the tree.
    ///
    /// Operator keys are never reported. Lists are searched element by
    /// element; objects under an operator key (`$not`) are searched too.
    /// The condition object under a field key is not, since its keys are
    /// operators applied to that field.
    #[must_use]
    pub fn referenced_fields(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<String>) {
        match self {
            Self::Scalar(_) => {}
            Self::List(items) => {
                for item in items {
                    item.collect_fields(fields);
                }
            }
            Self::Object(entries) => {
                for (key, child) in entries {
                    if is_operator(key) {
                        child.collect_fields(fields);
                    } else {
                        fields.insert(key.clone());
                        if let Self::List(_) = child {
                            child.collect_fields(fields);
                        }
                    }
                }
            }
        }
    }
}

/// Whether a key is an operator rather than a field.
#[must_use]
pub fn is_operator(key: &str) -> bool {
    key.starts_with(OPERATOR_SIGIL)
}

/// Field names referenced by a filter. Non-object input yields nothing.
#[must_use]
pub fn referenced_fields(filter: &Value) -> BTreeSet<String> {
    match filter {
        Value::Object(_) => FilterNode::from_value(filter).referenced_fields(),
        _ => BTreeSet::new(),
    }
}

/// Parse the `query` request parameter.
///
/// Blank input and `null` mean "no filter"; an empty object is treated the
/// same way.
///
/// # Errors
///
/// Returns [`Error::InvalidFilterSyntax`] if the text is not JSON or is JSON
/// other than an object.
pub fn parse_query(raw: &str) -> Result<Option<Value>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::InvalidFilterSyntax(format!("query is not valid JSON: {e}")))?;
    match value {
        Value::Null => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        Value::Object(_) => Ok(Some(value)),
        other => Err(Error::InvalidFilterSyntax(format!(
            "query must be a JSON object, got {other}"
        ))),
    }
}
