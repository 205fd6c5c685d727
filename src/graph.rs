//! Graph entity records and property values
//!
//! Rows coming back from the database are validated here, at the read
//! boundary. Property values outside the closed [`Value`] union (nested
//! maps in particular) are rejected with a `Format` error instead of being
//! coerced or dropped.

use serde::Deserialize;
use serde_json::{Map, Number};

use crate::error::{Result, TransferError};

/// Property value. Flat model: lists may nest, maps may not.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn integer(n: i64) -> Self {
        Value::Number(Number::from(n))
    }

    /// Convert back to JSON for wire payloads.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

/// Validate one raw property value. `key` only feeds the error message.
pub fn value_from_json(key: &str, raw: &serde_json::Value) -> Result<Value> {
    match raw {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => Ok(Value::Number(n.clone())),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| value_from_json(key, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(items))
        }
        serde_json::Value::Object(_) => Err(TransferError::Format {
            key: key.to_string(),
            found: "map",
        }),
    }
}

/// Properties keep the order they were read in.
pub type Properties = Vec<(String, Value)>;

pub fn properties_from_json(data: &Map<String, serde_json::Value>) -> Result<Properties> {
    let mut properties = Vec::with_capacity(data.len());
    for (key, raw) in data {
        properties.push((key.clone(), value_from_json(key, raw)?));
    }
    Ok(properties)
}

/// Node as read from the source. Consumed immediately by the encoder or
/// the direct engine, never mutated in place.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: Properties,
}

impl NodeRecord {
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.iter().any(|(k, _)| k == key)
    }
}

/// Relationship as read from the source. `start_id`/`end_id` reference
/// `NodeRecord::id` values.
#[derive(Debug, Clone)]
pub struct RelationshipRecord {
    pub id: i64,
    pub rel_type: String,
    pub start_id: i64,
    pub end_id: i64,
    pub properties: Properties,
}

#[derive(Debug, Deserialize)]
struct WireMetadata {
    id: i64,
    #[serde(default)]
    labels: Vec<String>,
}

/// Entity cell as the REST endpoint returns it: `metadata` holds id and
/// labels, `data` the flat property map, `start`/`end` are reference URLs.
#[derive(Debug, Deserialize)]
struct WireEntity {
    metadata: WireMetadata,
    #[serde(rename = "type", default)]
    rel_type: Option<String>,
    #[serde(default)]
    data: Map<String, serde_json::Value>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

pub fn node_from_cell(cell: &serde_json::Value) -> Result<NodeRecord> {
    let entity: WireEntity = serde_json::from_value(cell.clone())?;
    Ok(NodeRecord {
        id: entity.metadata.id,
        labels: entity.metadata.labels,
        properties: properties_from_json(&entity.data)?,
    })
}

pub fn relationship_from_cell(cell: &serde_json::Value) -> Result<RelationshipRecord> {
    let entity: WireEntity = serde_json::from_value(cell.clone())?;
    let rel_type = entity.rel_type.ok_or_else(|| {
        TransferError::UnexpectedResult(format!(
            "relationship {} without a type",
            entity.metadata.id
        ))
    })?;
    let start = entity.start.ok_or_else(|| {
        TransferError::UnexpectedResult(format!(
            "relationship {} without a start reference",
            entity.metadata.id
        ))
    })?;
    let end = entity.end.ok_or_else(|| {
        TransferError::UnexpectedResult(format!(
            "relationship {} without an end reference",
            entity.metadata.id
        ))
    })?;
    Ok(RelationshipRecord {
        id: entity.metadata.id,
        rel_type,
        start_id: entity_ref_id(&start)?,
        end_id: entity_ref_id(&end)?,
        properties: properties_from_json(&entity.data)?,
    })
}

/// Resolve an entity reference string to its id: the trailing numeric
/// path segment (`http://host:7474/db/data/node/42` -> 42).
pub fn entity_ref_id(reference: &str) -> Result<i64> {
    reference
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .ok_or_else(|| {
            TransferError::UnexpectedResult(format!(
                "entity reference without a numeric id: {reference}"
            ))
        })
}
