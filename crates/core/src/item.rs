//! Key-value item model
//!
//! A small, SDK-independent subset of the DynamoDB attribute model.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An item: attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValue {
    /// String
    S(String),
    /// Number, kept in its decimal string form
    N(String),
    /// Binary
    B(Vec<u8>),
    Bool(bool),
    Null,
    /// List; string, number and binary sets also decode to this
    L(Vec<AttributeValue>),
    /// Nested map
    M(HashMap<String, AttributeValue>),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::S(s) => write!(f, "{s}"),
            AttributeValue::N(n) => write!(f, "{n}"),
            AttributeValue::B(b) => write!(f, "<{} bytes>", b.len()),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::L(values) => write!(f, "[{} values]", values.len()),
            AttributeValue::M(map) => write!(f, "{{{} attributes}}", map.len()),
        }
    }
}

/// Request to delete one item by primary key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemRequest {
    pub table: String,
    pub key: Item,
    /// Ask the store to return the deleted item
    pub return_old: bool,
}

impl DeleteItemRequest {
    pub fn new(table: impl Into<String>, key: Item) -> Self {
        Self {
            table: table.into(),
            key,
            return_old: false,
        }
    }

    pub fn return_old(mut self, yes: bool) -> Self {
        self.return_old = yes;
        self
    }
}

/// Output of a delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteItemOutput {
    /// The deleted item, when requested and present
    pub attributes: Option<Item>,
}

/// Parse a `name=value` key attribute
///
/// The value may carry a type prefix: `n:` for numbers, `s:` for strings.
/// Without a prefix the value is a string.
pub fn parse_key_attribute(input: &str) -> Result<(String, AttributeValue)> {
    let (name, raw) = input
        .split_once('=')
        .ok_or_else(|| Error::General(format!("expected name=value, got '{input}'")))?;

    if name.is_empty() {
        return Err(Error::General(format!("empty attribute name in '{input}'")));
    }

    let value = if let Some(n) = raw.strip_prefix("n:") {
        if n.parse::<f64>().is_err() {
            return Err(Error::General(format!("'{n}' is not a number")));
        }
        AttributeValue::N(n.to_string())
    } else if let Some(s) = raw.strip_prefix("s:") {
        AttributeValue::S(s.to_string())
    } else {
        AttributeValue::S(raw.to_string())
    };

    Ok((name.to_string(), value))
}
