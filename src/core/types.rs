use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Sequence number from the authoritative document store
pub type Etag = u64;

/// Suffix of the bookkeeping field recording that a value was JSON-encoded
pub const CONVERT_TO_JSON_SUFFIX: &str = "_ConvertToJson";
/// Suffix of the bookkeeping field recording that a value was an array
pub const IS_ARRAY_SUFFIX: &str = "_IsArray";

pub fn is_bookkeeping_field(name: &str) -> bool {
    name.ends_with(CONVERT_TO_JSON_SUFFIX) || name.ends_with(IS_ARRAY_SUFFIX)
}

/// Internal document id, dense within one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Array(Vec<FieldValue>),
    Json(serde_json::Value),
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        FieldValue::Text(text.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        FieldValue::Text(text)
    }
}

impl From<f64> for FieldValue {
    fn from(number: f64) -> Self {
        FieldValue::Number(number)
    }
}

impl From<bool> for FieldValue {
    fn from(flag: bool) -> Self {
        FieldValue::Boolean(flag)
    }
}

/// A document as the indexer receives it, keyed by its external id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn add_field(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
