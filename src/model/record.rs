//! Canonical records handed to the downstream sink

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Non-empty list of text paragraphs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RichText(Vec<String>);

impl RichText {
    /// Returns `None` for an empty list
    pub fn new(lines: Vec<String>) -> Option<Self> {
        if lines.is_empty() {
            None
        } else {
            Some(Self(lines))
        }
    }

    /// Split free text into paragraphs, dropping blank lines
    pub fn from_text(text: &str) -> Option<Self> {
        let lines = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .collect();
        Self::new(lines)
    }

    pub fn lines(&self) -> &[String] {
        &self.0
    }
}

/// A single field value of a canonical record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    /// Member of a fixed allow-list
    Enum(&'static str),
    RichText(RichText),
    /// Id of another canonical record
    Reference(String),
    Bool(bool),
    Number(f64),
}

/// Normalized entity ready for downstream ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub id: String,
    #[serde(serialize_with = "rfc3339")]
    pub created_date: DateTime<Utc>,
    #[serde(serialize_with = "rfc3339")]
    pub modified_date: DateTime<Utc>,
    pub data: BTreeMap<String, Value>,
}

impl CanonicalRecord {
    pub fn new(id: impl Into<String>, created: DateTime<Utc>, modified: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_date: created,
            modified_date: modified,
            data: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.data.insert(name.to_string(), value);
        self
    }

    /// Insert only when a value is present
    pub fn with_optional(mut self, name: &str, value: Option<Value>) -> Self {
        if let Some(value) = value {
            self.data.insert(name.to_string(), value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

fn rfc3339<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true))
}
