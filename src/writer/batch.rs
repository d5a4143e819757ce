use crate::core::types::Document;

/// One atomic unit of index mutation
///
/// Deletes are applied before puts, so a batch that deletes and re-puts the
/// same external id leaves the new version live.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub puts: Vec<Document>,
    pub deletes: Vec<String>,
}

impl Batch {
    pub fn new() -> Self {
        Batch::default()
    }

    pub fn put(mut self, doc: Document) -> Self {
        self.puts.push(doc);
        self
    }

    pub fn delete(mut self, external_id: impl Into<String>) -> Self {
        self.deletes.push(external_id.into());
        self
    }

    pub fn add_put(&mut self, doc: Document) {
        self.puts.push(doc);
    }

    pub fn add_delete(&mut self, external_id: impl Into<String>) {
        self.deletes.push(external_id.into());
    }

    pub fn len(&self) -> usize {
        self.puts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}
