//! Row records.
//!
//! A [`Row`] is one record of a data grid: a statically known identity
//! ([`RowKey`]) plus an open map of the remaining JSON fields. Rows may carry
//! nested child groups for grouped display.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GridError, Result};

/// Field that carries nested child groups.
const CHILDREN_FIELD: &str = "children";
/// Field that flags rows whose children are loaded on demand.
const HAS_CHILDREN_FIELD: &str = "hasChildren";

/// Identity of a row, read from the grid's configured data key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowKey {
    /// Integer identity (database ids).
    Int(i64),
    /// Textual identity (codes, UUIDs).
    Text(String),
}

impl RowKey {
    /// Read a key from a JSON value.
    ///
    /// Integers and non-empty strings are accepted; anything else is not an
    /// identity.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(Self::Int),
            Value::String(text) if !text.is_empty() => Some(Self::Text(text.clone())),
            _ => None,
        }
    }

    /// The key as a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(id) => Value::from(*id),
            Self::Text(text) => Value::from(text.as_str()),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for RowKey {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for RowKey {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RowKey {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A labelled group of child rows shown beneath a parent row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildGroup {
    /// Group caption.
    pub group_header: String,
    /// Rows of the group.
    pub group_items: Vec<Row>,
}

/// One data-grid record.
///
/// The identity field stays in [`Row::fields`] as well, so exports and
/// templates see the record exactly as the server sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    key: RowKey,
    fields: Map<String, Value>,
    children: Vec<ChildGroup>,
}

impl Row {
    /// Create a row with `key` stored under `data_key`.
    pub fn new(data_key: &str, key: impl Into<RowKey>) -> Self {
        let key = key.into();
        let mut fields = Map::new();
        fields.insert(data_key.to_string(), key.to_value());
        Self {
            key,
            fields,
            children: Vec::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Parse a row from a JSON object, reading its identity from `data_key`.
    ///
    /// A `children` array of `{ groupHeader, groupItems }` objects is parsed
    /// recursively with the same data key.
    pub fn from_json(value: Value, data_key: &str) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(GridError::NotAnObject);
        };

        let key = match fields.get(data_key) {
            None | Some(Value::Null) => return Err(GridError::MissingRowKey(data_key.to_string())),
            Some(raw) => RowKey::from_value(raw).ok_or_else(|| GridError::InvalidRowKey {
                field: data_key.to_string(),
                value: raw.to_string(),
            })?,
        };

        let children = match fields.remove(CHILDREN_FIELD) {
            Some(Value::Array(groups)) => groups
                .into_iter()
                .map(|group| ChildGroup::from_json(group, data_key))
                .collect::<Result<Vec<_>>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                fields.insert(CHILDREN_FIELD.to_string(), other);
                Vec::new()
            }
        };

        Ok(Self {
            key,
            fields,
            children,
        })
    }

    /// Serialize the row back to the JSON shape it was parsed from.
    pub fn to_json(&self) -> Value {
        let mut fields = self.fields.clone();
        if !self.children.is_empty() {
            let groups = self.children.iter().map(ChildGroup::to_json).collect();
            fields.insert(CHILDREN_FIELD.to_string(), Value::Array(groups));
        }
        Value::Object(fields)
    }

    /// The row identity.
    pub fn key(&self) -> &RowKey {
        &self.key
    }

    /// All fields, including the identity field.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// A top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A field addressed by a dotted path such as `category.name`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Whether `field` holds a truthy value (`true`, a non-zero number or a
    /// non-empty string).
    pub fn is_truthy(&self, field: &str) -> bool {
        match self.lookup(field) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(text)) => !text.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(_)) => true,
            Some(Value::Null) | None => false,
        }
    }

    /// Nested child groups.
    pub fn children(&self) -> &[ChildGroup] {
        &self.children
    }

    /// Whether the row has children, loaded or announced by the server.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty() || self.is_truthy(HAS_CHILDREN_FIELD)
    }
}

impl ChildGroup {
    fn from_json(value: Value, data_key: &str) -> Result<Self> {
        let Value::Object(mut group) = value else {
            return Err(GridError::NotAnObject);
        };
        let group_header = match group.remove("groupHeader") {
            Some(Value::String(header)) => header,
            _ => String::new(),
        };
        let group_items = match group.remove("groupItems") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| Row::from_json(item, data_key))
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };
        Ok(Self {
            group_header,
            group_items,
        })
    }

    fn to_json(&self) -> Value {
        serde_json::json!({
            "groupHeader": self.group_header,
            "groupItems": self.group_items.iter().map(Row::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Render a JSON value the way a grid cell shows it.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}
