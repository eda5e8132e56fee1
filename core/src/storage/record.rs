use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The two record families a step can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Entities,
    Relationships,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Relationships => "relationships",
        }
    }

}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `_class` may be a single class name or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordClass {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for RecordClass {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for RecordClass {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for RecordClass {
    fn from(value: Vec<String>) -> Self {
        Self::Many(value)
    }
}

/// A graph record: an entity or a relationship.
///
/// `_key` is unique across the whole run. Everything besides the three
/// reserved fields is carried as free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_key")]
    pub key: String,

    #[serde(rename = "_type")]
    pub record_type: String,

    #[serde(rename = "_class")]
    pub class: RecordClass,

    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// Field names owned by [`Record`] itself.
pub const RESERVED_FIELDS: [&str; 3] = ["_key", "_type", "_class"];

pub type Entity = Record;
pub type Relationship = Record;

impl Record {
    pub fn new(
        key: impl Into<String>,
        record_type: impl Into<String>,
        class: impl Into<RecordClass>,
    ) -> Self {
        Self {
            key: key.into(),
            record_type: record_type.into(),
            class: class.into(),
            properties: Map::new(),
        }
    }

    /// Build a relationship between two entity keys.
    pub fn relationship(
        key: impl Into<String>,
        record_type: impl Into<String>,
        class: impl Into<RecordClass>,
        from_key: impl Into<String>,
        to_key: impl Into<String>,
    ) -> Self {
        Self::new(key, record_type, class)
            .with_property("_fromEntityKey", from_key.into())
            .with_property("_toEntityKey", to_key.into())
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// First reserved field also present among the properties. Such a
    /// record would serialize the field twice.
    pub fn shadowed_field(&self) -> Option<&'static str> {
        RESERVED_FIELDS
            .into_iter()
            .find(|field| self.properties.contains_key(*field))
    }
}

/// On-disk payload of a batch file: `{"entities":[...]}` or
/// `{"relationships":[...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Record>>,
}

impl BatchFile {
    pub fn new(kind: RecordKind, records: Vec<Record>) -> Self {
        match kind {
            RecordKind::Entities => Self {
                entities: Some(records),
                relationships: None,
            },
            RecordKind::Relationships => Self {
                entities: None,
                relationships: Some(records),
            },
        }
    }

    /// The single kind held by this batch, if the payload is well formed.
    pub fn kind(&self) -> Option<RecordKind> {
        match (&self.entities, &self.relationships) {
            (Some(_), None) => Some(RecordKind::Entities),
            (None, Some(_)) => Some(RecordKind::Relationships),
            _ => None,
        }
    }

    pub fn into_records(self, kind: RecordKind) -> Vec<Record> {
        match kind {
            RecordKind::Entities => self.entities.unwrap_or_default(),
            RecordKind::Relationships => self.relationships.unwrap_or_default(),
        }
    }
}
