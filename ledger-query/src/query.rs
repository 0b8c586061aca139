//! Predicate language for volume queries
//!
//! Grammar (JSON):
//!
//! ```text
//! document := { "$match": { target: string } }
//!           | { "$and": [document, ...] }
//!           | { "$or":  [document, ...] }
//!           | { "$not": document }
//! target   := "address" | "metadata[<key>]"
//! ```
//!
//! An empty body or `{}` means "no filter". Anything else is a validation
//! error, and no backend call is made for it.

use crate::{types::Metadata, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const OP_MATCH: &str = "$match";
const OP_AND: &str = "$and";
const OP_OR: &str = "$or";
const OP_NOT: &str = "$not";

/// Field a leaf predicate compares against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum Target {
    /// Account address
    Address,
    /// Value of one account metadata key
    Metadata(String),
}

impl Target {
    /// Parse `address` or `metadata[<key>]`
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "address" {
            return Some(Target::Address);
        }
        let key = raw.strip_prefix("metadata[")?.strip_suffix(']')?;
        if key.is_empty() {
            return None;
        }
        Some(Target::Metadata(key.to_string()))
    }
}

/// Immutable predicate tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueryBuilder {
    /// Exact equality on a target
    Match {
        /// Compared field
        target: Target,
        /// Expected value
        value: String,
    },
    /// All sub-predicates hold
    And {
        /// Operands
        items: Vec<QueryBuilder>,
    },
    /// At least one sub-predicate holds
    Or {
        /// Operands
        items: Vec<QueryBuilder>,
    },
    /// Sub-predicate does not hold
    Not {
        /// Operand
        item: Box<QueryBuilder>,
    },
}

impl QueryBuilder {
    /// Leaf match from its wire key, e.g. `address` or `metadata[roles]`
    pub fn match_key(key: &str, value: impl Into<String>) -> Result<Self> {
        let target = Target::parse(key)
            .ok_or_else(|| Error::InvalidQuery(format!("unknown key '{}'", key)))?;
        Ok(QueryBuilder::Match {
            target,
            value: value.into(),
        })
    }

    /// Whether evaluation needs account metadata
    pub fn uses_metadata(&self) -> bool {
        match self {
            QueryBuilder::Match { target, .. } => matches!(target, Target::Metadata(_)),
            QueryBuilder::And { items } | QueryBuilder::Or { items } => {
                items.iter().any(QueryBuilder::uses_metadata)
            }
            QueryBuilder::Not { item } => item.uses_metadata(),
        }
    }

    /// Evaluate against one account
    pub fn matches(&self, address: &str, metadata: Option<&Metadata>) -> bool {
        match self {
            QueryBuilder::Match {
                target: Target::Address,
                value,
            } => address == value,
            QueryBuilder::Match {
                target: Target::Metadata(key),
                value,
            } => metadata
                .and_then(|m| m.get(key))
                .map_or(false, |v| v == value),
            QueryBuilder::And { items } => items.iter().all(|q| q.matches(address, metadata)),
            QueryBuilder::Or { items } => items.iter().any(|q| q.matches(address, metadata)),
            QueryBuilder::Not { item } => !item.matches(address, metadata),
        }
    }
}

/// Parse a request body; `Ok(None)` means no filter
pub fn parse_query(body: &[u8]) -> Result<Option<QueryBuilder>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let document: Value = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidQuery(format!("body is not valid JSON: {}", e)))?;

    match &document {
        Value::Object(map) if map.is_empty() => Ok(None),
        _ => parse_document(&document).map(Some),
    }
}

/// Parse one document node
pub fn parse_document(document: &Value) -> Result<QueryBuilder> {
    let object = document
        .as_object()
        .ok_or_else(|| Error::InvalidQuery(format!("expected object, got {}", type_name(document))))?;

    let (operator, operand) = single_entry(object, "query")?;

    match operator.as_str() {
        OP_MATCH => parse_match(operand),
        OP_AND => Ok(QueryBuilder::And {
            items: parse_operands(operator, operand)?,
        }),
        OP_OR => Ok(QueryBuilder::Or {
            items: parse_operands(operator, operand)?,
        }),
        OP_NOT => Ok(QueryBuilder::Not {
            item: Box::new(parse_document(operand)?),
        }),
        other => Err(Error::InvalidQuery(format!("unknown operator '{}'", other))),
    }
}

fn parse_match(operand: &Value) -> Result<QueryBuilder> {
    let object = operand
        .as_object()
        .ok_or_else(|| Error::InvalidQuery(format!("$match expects an object, got {}", type_name(operand))))?;

    let (key, value) = single_entry(object, "$match")?;
    let value = value
        .as_str()
        .ok_or_else(|| Error::InvalidQuery(format!("$match value for '{}' must be a string", key)))?;

    QueryBuilder::match_key(key, value)
}

fn parse_operands(operator: &str, operand: &Value) -> Result<Vec<QueryBuilder>> {
    let items = operand
        .as_array()
        .ok_or_else(|| Error::InvalidQuery(format!("{} expects an array", operator)))?;

    if items.is_empty() {
        return Err(Error::InvalidQuery(format!("{} expects at least one operand", operator)));
    }

    items.iter().map(parse_document).collect()
}

fn single_entry<'a>(object: &'a Map<String, Value>, context: &str) -> Result<(&'a String, &'a Value)> {
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(Error::InvalidQuery(format!(
            "{} expects exactly one entry, got {}",
            context,
            object.len()
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(key: &str, value: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(key.to_string(), value.to_string());
        m
    }

    #[test]
    fn test_parse_metadata_match() {
        let q = parse_query(br#"{"$match": { "metadata[roles]": "admin" }}"#)
            .unwrap()
            .unwrap();
        assert_eq!(q, QueryBuilder::match_key("metadata[roles]", "admin").unwrap());
        assert!(q.uses_metadata());
        assert!(q.matches("user:1", Some(&meta("roles", "admin"))));
        assert!(!q.matches("user:1", Some(&meta("roles", "guest"))));
        assert!(!q.matches("user:1", None));
    }

    #[test]
    fn test_parse_address_match() {
        let q = parse_query(br#"{"$match": { "address": "foo" }}"#).unwrap().unwrap();
        assert_eq!(
            q,
            QueryBuilder::Match {
                target: Target::Address,
                value: "foo".to_string()
            }
        );
        assert!(!q.uses_metadata());
        assert!(q.matches("foo", None));
        assert!(!q.matches("foo:bar", None));
    }

    #[test]
    fn test_empty_body_is_no_filter() {
        assert_eq!(parse_query(b"").unwrap(), None);
        assert_eq!(parse_query(b"  \n").unwrap(), None);
        assert_eq!(parse_query(b"{}").unwrap(), None);
    }

    #[test]
    fn test_invalid_shapes() {
        let cases: &[&[u8]] = &[
            b"[]",
            b"42",
            b"not json",
            br#"{"$exists": {"address": "foo"}}"#,
            br#"{"$match": ["address", "foo"]}"#,
            br#"{"$match": {"balance": "10"}}"#,
            br#"{"$match": {"address": 10}}"#,
            br#"{"$match": {"address": "a", "metadata[x]": "b"}}"#,
            br#"{"$match": {"metadata[]": "b"}}"#,
            br#"{"$match": {"address": "a"}, "$not": {"$match": {"address": "b"}}}"#,
            br#"{"$and": []}"#,
        ];

        for body in cases {
            let err = parse_query(body).unwrap_err();
            assert!(
                matches!(err, Error::InvalidQuery(_)),
                "expected validation error for {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_composite_operators() {
        let q = parse_query(
            br#"{"$and": [
                {"$match": {"metadata[roles]": "admin"}},
                {"$not": {"$match": {"address": "user:2"}}}
            ]}"#,
        )
        .unwrap()
        .unwrap();

        assert!(q.matches("user:1", Some(&meta("roles", "admin"))));
        assert!(!q.matches("user:2", Some(&meta("roles", "admin"))));

        let q = parse_query(br#"{"$or": [{"$match": {"address": "a"}}, {"$match": {"address": "b"}}]}"#)
            .unwrap()
            .unwrap();
        assert!(q.matches("b", None));
        assert!(!q.matches("c", None));
    }
}
