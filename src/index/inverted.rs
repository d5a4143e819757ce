use std::collections::{BTreeMap, HashMap};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::index::posting::PostingList;
use crate::index::term::Term;

/// Inverted index structure for one segment generation.
///
/// Postings and tombstones only grow: a put always allocates a fresh internal
/// id and a delete tombstones the external id's current internal id. Older ids
/// of the same external id are superseded and filtered out at read time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: BTreeMap<Term, PostingList>,
    // External id per internal id
    docs: Vec<String>,
    #[serde(with = "bitmap_bytes")]
    tombstones: RoaringBitmap,
    // Most recent internal id per external id, rebuilt after decoding
    #[serde(skip)]
    latest: HashMap<String, DocId>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        InvertedIndex::default()
    }

    pub fn add_document(&mut self, external_id: &str, terms: &[Term]) -> Result<DocId> {
        let id = u32::try_from(self.docs.len())
            .map_err(|_| Error::new(ErrorKind::InvalidState, "internal document ids exhausted"))?;
        let doc_id = DocId(id);

        self.docs.push(external_id.to_string());
        self.latest.insert(external_id.to_string(), doc_id);

        for term in terms {
            self.postings
                .entry(term.clone())
                .or_insert_with(PostingList::new)
                .push(doc_id);
        }

        Ok(doc_id)
    }

    /// Tombstone the current internal id of `external_id`
    pub fn delete(&mut self, external_id: &str) -> Option<DocId> {
        let doc_id = *self.latest.get(external_id)?;
        self.tombstones.insert(doc_id.0);
        Some(doc_id)
    }

    /// Not tombstoned and not superseded by a later put of the same external id
    pub fn is_live(&self, doc_id: DocId) -> bool {
        if self.tombstones.contains(doc_id.0) {
            return false;
        }
        match self.docs.get(doc_id.index()) {
            Some(external_id) => self.latest.get(external_id) == Some(&doc_id),
            None => false,
        }
    }

    pub fn is_tombstoned(&self, doc_id: DocId) -> bool {
        self.tombstones.contains(doc_id.0)
    }

    pub fn external_id(&self, doc_id: DocId) -> Option<&str> {
        self.docs.get(doc_id.index()).map(String::as_str)
    }

    /// Current internal id of `external_id`, if it was ever put
    pub fn internal_id(&self, external_id: &str) -> Option<DocId> {
        self.latest.get(external_id).copied()
    }

    pub fn postings(&self, term: &Term) -> Option<&PostingList> {
        self.postings.get(term)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Term, &PostingList)> {
        self.postings.iter()
    }

    /// All terms of `field`, in text order
    pub fn field_terms<'a>(
        &'a self,
        field: &'a str,
    ) -> impl Iterator<Item = (&'a Term, &'a PostingList)> + 'a {
        self.postings
            .range(Term::field_start(field)..)
            .take_while(move |(term, _)| term.field == field)
    }

    /// Number of internal ids ever allocated, live or not
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn live_count(&self) -> usize {
        (0..self.docs.len() as u32).filter(|id| self.is_live(DocId(*id))).count()
    }

    pub fn live_docs(&self) -> RoaringBitmap {
        self.latest
            .values()
            .filter(|doc_id| !self.tombstones.contains(doc_id.0))
            .map(|doc_id| doc_id.0)
            .collect()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn tombstones(&self) -> &RoaringBitmap {
        &self.tombstones
    }

    pub(crate) fn rebuild_lookup(&mut self) {
        self.latest.clear();
        for (id, external_id) in self.docs.iter().enumerate() {
            self.latest.insert(external_id.clone(), DocId(id as u32));
        }
    }

    /// Copy without tombstoned or superseded documents, ids renumbered densely
    pub fn compacted(&self) -> InvertedIndex {
        let mut remap: HashMap<DocId, DocId> = HashMap::new();
        let mut docs = Vec::new();

        for (id, external_id) in self.docs.iter().enumerate() {
            let old = DocId(id as u32);
            if self.is_live(old) {
                remap.insert(old, DocId(docs.len() as u32));
                docs.push(external_id.clone());
            }
        }

        let mut postings = BTreeMap::new();
        for (term, list) in &self.postings {
            let mut compacted = PostingList::new();
            // Remapping is monotonic, so order is preserved
            for doc_id in list.iter() {
                if let Some(new_id) = remap.get(&doc_id) {
                    compacted.push(*new_id);
                }
            }
            if !compacted.is_empty() {
                postings.insert(term.clone(), compacted);
            }
        }

        let mut index = InvertedIndex {
            postings,
            docs,
            tombstones: RoaringBitmap::new(),
            latest: HashMap::new(),
        };
        index.rebuild_lookup();
        index
    }

    /// Structural consistency check over the postings format
    pub fn validate(&self) -> Result<()> {
        let doc_count = self.docs.len() as u64;

        for (term, list) in &self.postings {
            if list.is_empty() {
                return Err(Error::corruption(format!("empty posting list for {}", term)));
            }
            if !list.is_well_formed() {
                return Err(Error::corruption(format!("unordered posting list for {}", term)));
            }
            if let Some(last) = list.doc_ids().last() {
                if u64::from(last.0) >= doc_count {
                    return Err(Error::corruption(format!(
                        "posting for {} references unknown doc {}",
                        term, last.0
                    )));
                }
            }
        }

        if let Some(max) = self.tombstones.max() {
            if u64::from(max) >= doc_count {
                return Err(Error::corruption(format!("tombstone for unknown doc {}", max)));
            }
        }

        Ok(())
    }
}

mod bitmap_bytes {
    use roaring::RoaringBitmap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bitmap: &RoaringBitmap, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = Vec::with_capacity(bitmap.serialized_size());
        bitmap
            .serialize_into(&mut buf)
            .map_err(serde::ser::Error::custom)?;
        buf.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RoaringBitmap, D::Error> {
        let buf = Vec::<u8>::deserialize(deserializer)?;
        RoaringBitmap::deserialize_from(&buf[..]).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(pairs: &[(&str, &str)]) -> Vec<Term> {
        pairs.iter().map(|(f, t)| Term::new(*f, *t)).collect()
    }

    #[test]
    fn put_again_supersedes_previous_id() {
        let mut index = InvertedIndex::new();
        let first = index.add_document("users/1", &terms(&[("Name", "A")])).unwrap();
        let second = index.add_document("users/1", &terms(&[("Name", "B")])).unwrap();

        assert!(!index.is_live(first));
        assert!(index.is_live(second));
        assert_eq!(index.internal_id("users/1"), Some(second));
        assert_eq!(index.live_count(), 1);
        assert_eq!(index.doc_count(), 2);
    }

    #[test]
    fn delete_tombstones_current_id() {
        let mut index = InvertedIndex::new();
        let id = index.add_document("users/1", &terms(&[("Name", "A")])).unwrap();

        assert_eq!(index.delete("users/1"), Some(id));
        assert!(!index.is_live(id));
        assert!(index.is_tombstoned(id));
        assert_eq!(index.delete("users/404"), None);
        // postings stay in place
        assert_eq!(index.postings(&Term::new("Name", "A")).unwrap().len(), 1);
    }

    #[test]
    fn field_terms_stay_within_field() {
        let mut index = InvertedIndex::new();
        index.add_document("a", &terms(&[("A", "x"), ("B", "y"), ("Ab", "z")])).unwrap();

        let found: Vec<_> = index.field_terms("A").map(|(t, _)| t.text.clone()).collect();
        assert_eq!(found, vec!["x"]);
    }

    #[test]
    fn compaction_renumbers_live_documents() {
        let mut index = InvertedIndex::new();
        index.add_document("a", &terms(&[("F", "1")])).unwrap();
        index.add_document("b", &terms(&[("F", "1"), ("G", "2")])).unwrap();
        index.add_document("c", &terms(&[("F", "1")])).unwrap();
        index.delete("a");
        index.add_document("c", &terms(&[("F", "3")])).unwrap();

        let compacted = index.compacted();
        assert_eq!(compacted.doc_count(), 2);
        assert_eq!(compacted.external_id(DocId(0)), Some("b"));
        assert_eq!(compacted.external_id(DocId(1)), Some("c"));
        assert_eq!(compacted.postings(&Term::new("F", "1")).unwrap().doc_ids(), &[DocId(0)]);
        assert_eq!(compacted.postings(&Term::new("F", "3")).unwrap().doc_ids(), &[DocId(1)]);
        assert!(compacted.tombstones().is_empty());
        compacted.validate().unwrap();
    }

    #[test]
    fn bincode_round_trip_restores_lookup() {
        let mut index = InvertedIndex::new();
        index.add_document("a", &terms(&[("F", "1")])).unwrap();
        index.add_document("b", &terms(&[("F", "1")])).unwrap();
        index.delete("a");

        let bytes = bincode::serialize(&index).unwrap();
        let mut decoded: InvertedIndex = bincode::deserialize(&bytes).unwrap();
        decoded.rebuild_lookup();

        assert!(!decoded.is_live(DocId(0)));
        assert!(decoded.is_live(DocId(1)));
        assert_eq!(decoded.live_docs().iter().collect::<Vec<_>>(), vec![1]);
    }
}
