pub mod analyzer;
pub mod filter;
pub mod tokenizer;

use std::sync::Arc;
use crate::analysis::analyzer::Analyzer;
use crate::core::error::Result;

/// Analyzer capability handed to the indexer: `(field name, raw value) -> term texts`
pub type Tokenize = Arc<dyn Fn(&str, &str) -> Result<Vec<String>> + Send + Sync>;

pub fn from_fn<F>(f: F) -> Tokenize
where
    F: Fn(&str, &str) -> Result<Vec<String>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Every value becomes exactly one term, unchanged
pub fn keyword() -> Tokenize {
    from_fn(|_field, raw| Ok(vec![raw.to_string()]))
}

/// Unicode words, lower-cased
pub fn standard() -> Tokenize {
    Analyzer::standard().into_tokenize()
}
