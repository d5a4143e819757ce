use std::collections::HashMap;
use std::sync::Arc;
use rust_stemmers::Algorithm;
use crate::analysis::filter::TokenFilter;
use crate::analysis::tokenizer::Tokenizer;
use crate::analysis::{from_fn, Tokenize};

/// Text analysis pipeline
#[derive(Clone)]
pub struct Analyzer {
    pub name: String,
    pub tokenizer: Tokenizer,
    pub filters: Vec<TokenFilter>,
}

impl Analyzer {
    pub fn new(name: impl Into<String>, tokenizer: Tokenizer) -> Self {
        Analyzer {
            name: name.into(),
            tokenizer,
            filters: Vec::new(),
        }
    }

    pub fn add_filter(mut self, filter: TokenFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        let mut tokens = self.tokenizer.tokenize(text);

        for filter in &self.filters {
            tokens = filter.apply(tokens);
        }

        tokens
    }

    pub fn standard() -> Self {
        Analyzer::new("standard", Tokenizer::default()).add_filter(TokenFilter::Lowercase)
    }

    /// Standard analyzer plus English stop words and stemming
    pub fn standard_english() -> Self {
        Analyzer::standard()
            .add_filter(TokenFilter::english_stop_words())
            .add_filter(TokenFilter::Stemmer(Algorithm::English))
    }

    pub fn keyword() -> Self {
        Analyzer::new("keyword", Tokenizer::Keyword)
    }

    pub fn into_tokenize(self) -> Tokenize {
        let analyzer = Arc::new(self);
        from_fn(move |_field, raw| Ok(analyzer.analyze(raw)))
    }
}

/// Picks an analyzer by field name, falling back to a default
#[derive(Clone)]
pub struct PerFieldAnalyzer {
    pub default: Analyzer,
    pub fields: HashMap<String, Analyzer>,
}

impl PerFieldAnalyzer {
    pub fn new(default: Analyzer) -> Self {
        PerFieldAnalyzer {
            default,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, analyzer: Analyzer) -> Self {
        self.fields.insert(field.into(), analyzer);
        self
    }

    pub fn analyze(&self, field: &str, text: &str) -> Vec<String> {
        self.fields.get(field).unwrap_or(&self.default).analyze(text)
    }

    pub fn into_tokenize(self) -> Tokenize {
        let analyzer = Arc::new(self);
        from_fn(move |field, raw| Ok(analyzer.analyze(field, raw)))
    }
}
