use std::fmt;
use serde::{Deserialize, Serialize};

/// A `(field, text)` key into the inverted index.
///
/// Ordering is lexicographic on `field`, then `text`, so all terms of one
/// field are contiguous in an ordered map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Smallest possible term of `field`
    pub fn field_start(field: &str) -> Self {
        Term {
            field: field.to_string(),
            text: String::new(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}
