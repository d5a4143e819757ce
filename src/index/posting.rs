use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::types::DocId;

/// Posting list for a term.
/// Doc ids are strictly ascending; new ids are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingList {
    doc_ids: Vec<DocId>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList { doc_ids: Vec::new() }
    }

    /// Append `doc_id`. Returns false when it is already the last entry.
    pub fn push(&mut self, doc_id: DocId) -> bool {
        match self.doc_ids.last() {
            Some(last) if *last == doc_id => false,
            Some(last) => {
                debug_assert!(*last < doc_id, "postings must be appended in doc id order");
                self.doc_ids.push(doc_id);
                true
            }
            None => {
                self.doc_ids.push(doc_id);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn doc_ids(&self) -> &[DocId] {
        &self.doc_ids
    }

    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.doc_ids.iter().copied()
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.doc_ids.binary_search(&doc_id).is_ok()
    }

    pub fn to_bitmap(&self) -> RoaringBitmap {
        self.doc_ids.iter().map(|d| d.0).collect()
    }

    /// Sorted and duplicate free
    pub fn is_well_formed(&self) -> bool {
        self.doc_ids.windows(2).all(|pair| pair[0] < pair[1])
    }
}
