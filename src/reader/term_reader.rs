use std::collections::BTreeMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{is_bookkeeping_field, DocId};
use crate::index::term::Term;
use crate::mvcc::controller::ReaderLease;

/// A field's reconstructed value: one term, or several once a second shows up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryValue {
    Scalar(String),
    List(Vec<String>),
}

impl EntryValue {
    /// Add a value, promoting a scalar to a list on the second occurrence
    pub fn push(&mut self, value: String) {
        match self {
            EntryValue::Scalar(first) => {
                let first = std::mem::take(first);
                *self = EntryValue::List(vec![first, value]);
            }
            EntryValue::List(values) => values.push(value),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            EntryValue::Scalar(value) => vec![value.as_str()],
            EntryValue::List(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Read-only enumeration of the postings of one pinned generation
pub struct TermReader {
    lease: ReaderLease,
    max_entries: usize,
}

impl TermReader {
    pub fn new(lease: ReaderLease, max_entries: usize) -> Self {
        TermReader { lease, max_entries }
    }

    pub fn generation(&self) -> u64 {
        self.lease.generation()
    }

    /// Call `on_term_found` once per `(term, doc)` where the term belongs to
    /// one of `fields` and the doc is in `doc_ids`
    pub fn read_entries_for_fields<F>(&self, fields: &[&str], doc_ids: &RoaringBitmap, mut on_term_found: F)
    where
        F: FnMut(&Term, DocId),
    {
        let index = &self.lease.index;
        for field in fields {
            for (term, postings) in index.field_terms(field) {
                for doc_id in postings.iter() {
                    if doc_ids.contains(doc_id.0) {
                        on_term_found(term, doc_id);
                    }
                }
            }
        }
    }

    /// Field values of every internal document id, dead ones included
    ///
    /// Refused with `OperationRefused` above the configured document ceiling.
    pub fn read_all_entries(&self) -> Result<Vec<BTreeMap<String, EntryValue>>> {
        let index = &self.lease.index;
        let doc_count = index.doc_count();
        if doc_count > self.max_entries {
            return Err(Error::new(
                ErrorKind::OperationRefused,
                format!(
                    "index holds {} documents, more than the {} allowed for a full read",
                    doc_count, self.max_entries
                ),
            ));
        }

        let mut entries: Vec<BTreeMap<String, EntryValue>> = vec![BTreeMap::new(); doc_count];
        for (term, postings) in index.terms() {
            if is_bookkeeping_field(&term.field) {
                continue;
            }
            for doc_id in postings.iter() {
                let Some(fields) = entries.get_mut(doc_id.index()) else {
                    continue;
                };
                match fields.get_mut(&term.field) {
                    Some(value) => value.push(term.text.clone()),
                    None => {
                        fields.insert(term.field.clone(), EntryValue::Scalar(term.text.clone()));
                    }
                }
            }
        }

        Ok(entries)
    }
}
