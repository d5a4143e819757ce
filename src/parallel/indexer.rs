use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::analysis::Tokenize;
use crate::core::types::{Document, FieldValue, CONVERT_TO_JSON_SUFFIX, IS_ARRAY_SUFFIX};
use crate::index::term::Term;

/// Below this many documents a batch is analyzed on the calling thread
const PARALLEL_THRESHOLD: usize = 64;

/// A field that could not be tokenized; the rest of its document is indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingFailure {
    pub external_id: String,
    pub field: String,
    pub reason: String,
}

/// Terms produced for one document, ready to be appended to the postings
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    pub external_id: String,
    pub terms: Vec<Term>,
    pub failures: Vec<IndexingFailure>,
    pub approximate_bytes: usize,
}

/// Turns documents into terms, in parallel for large batches
pub struct ParallelIndexer {
    tokenize: Tokenize,
    parallel_threshold: usize,
}

impl ParallelIndexer {
    pub fn new(tokenize: Tokenize) -> Self {
        ParallelIndexer {
            tokenize,
            parallel_threshold: PARALLEL_THRESHOLD,
        }
    }

    /// Analyze a batch; output order matches input order
    pub fn analyze_batch(&self, documents: &[Document]) -> Vec<AnalyzedDocument> {
        if documents.len() < self.parallel_threshold {
            return documents.iter().map(|doc| self.analyze_document(doc)).collect();
        }

        documents
            .par_iter()
            .map(|doc| self.analyze_document(doc))
            .collect()
    }

    pub fn analyze_document(&self, doc: &Document) -> AnalyzedDocument {
        let mut analyzed = AnalyzedDocument {
            external_id: doc.id.clone(),
            terms: Vec::new(),
            failures: Vec::new(),
            approximate_bytes: doc.id.len(),
        };

        for (field, value) in &doc.fields {
            self.index_value(&doc.id, field, value, &mut analyzed);
        }

        analyzed.approximate_bytes += analyzed
            .terms
            .iter()
            .map(|term| term.field.len() + term.text.len() + std::mem::size_of::<u32>())
            .sum::<usize>();
        analyzed
    }

    fn index_value(&self, external_id: &str, field: &str, value: &FieldValue, out: &mut AnalyzedDocument) {
        match value {
            FieldValue::Text(text) => match (self.tokenize)(field, text) {
                Ok(tokens) => {
                    out.terms.extend(tokens.into_iter().map(|token| Term::new(field, token)));
                }
                Err(e) => out.failures.push(IndexingFailure {
                    external_id: external_id.to_string(),
                    field: field.to_string(),
                    reason: e.context,
                }),
            },
            // 20000.0 is indexed as "20000"
            FieldValue::Number(number) => out.terms.push(Term::new(field, number.to_string())),
            FieldValue::Boolean(flag) => out.terms.push(Term::new(field, flag.to_string())),
            FieldValue::Array(items) => {
                for item in items {
                    self.index_value(external_id, field, item, out);
                }
                out.terms.push(Term::new(format!("{}{}", field, IS_ARRAY_SUFFIX), "true"));
            }
            FieldValue::Json(json) => {
                out.terms.push(Term::new(field, json.to_string()));
                out.terms.push(Term::new(format!("{}{}", field, CONVERT_TO_JSON_SUFFIX), "true"));
            }
        }
    }
}
