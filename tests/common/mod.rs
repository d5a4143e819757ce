//! Shared fixtures: an in-memory document store standing in for the
//! authoritative store, plus helpers to open and corrupt indexes.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use durindex::analysis;
use durindex::core::clock::ManualClock;
use durindex::storage::layout::StorageLayout;
use durindex::{Batch, Change, ChangeBody, Config, Document, DocumentSource, Error, ErrorKind, Etag, Index, Result};
use parking_lot::Mutex;

#[derive(Default)]
struct StoreState {
    changes: Vec<Change>,
    last_etag: Etag,
    unreachable: bool,
}

/// Change feed with strictly increasing etags
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<StoreState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        MemoryDocumentStore::default()
    }

    pub fn put(&self, doc: Document) -> Etag {
        let mut state = self.state.lock();
        state.last_etag += 1;
        let etag = state.last_etag;
        state.changes.push(Change::put(doc, etag));
        etag
    }

    pub fn delete(&self, external_id: &str) -> Etag {
        let mut state = self.state.lock();
        state.last_etag += 1;
        let etag = state.last_etag;
        state.changes.push(Change::delete(external_id, etag));
        etag
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn last_etag(&self) -> Etag {
        self.state.lock().last_etag
    }
}

impl DocumentSource for MemoryDocumentStore {
    fn get_changes_since(&self, etag: Etag) -> Result<Vec<Change>> {
        let state = self.state.lock();
        if state.unreachable {
            return Err(Error::new(ErrorKind::Io, "connection refused"));
        }
        Ok(state.changes.iter().filter(|c| c.etag > etag).cloned().collect())
    }
}

/// Feed a source that replays a fixed list, for out-of-order feeds
pub struct FixedFeed(pub Vec<Change>);

impl DocumentSource for FixedFeed {
    fn get_changes_since(&self, _etag: Etag) -> Result<Vec<Change>> {
        Ok(self.0.clone())
    }
}

pub fn user(id: &str, name: &str) -> Document {
    Document::new(id).with_field("Name", name)
}

/// Commit point after every flush
pub fn eager_config(dir: &Path) -> Config {
    Config::with_storage_path(dir).commit_point_after_each_flush()
}

/// Commit point on the first flush only
pub fn first_flush_only_config(dir: &Path) -> Config {
    let mut config = Config::with_storage_path(dir);
    config.min_commit_point_interval_secs = 30 * 60;
    config.max_commit_point_interval_secs = u64::MAX;
    config
}

pub fn open(config: Config, store: &MemoryDocumentStore) -> Index {
    open_with(config, store, Arc::new(ManualClock::default()))
}

pub fn open_with(config: Config, store: &dyn DocumentSource, clock: Arc<ManualClock>) -> Index {
    Index::open_with_clock(config, analysis::keyword(), clock, store).unwrap()
}

/// Store a document and index it as one batch
pub fn put(index: &Index, store: &MemoryDocumentStore, doc: Document) {
    let etag = store.put(doc.clone());
    index.apply(Batch::new().put(doc), etag).unwrap();
}

pub fn delete(index: &Index, store: &MemoryDocumentStore, external_id: &str) {
    let etag = store.delete(external_id);
    index.apply(Batch::new().delete(external_id), etag).unwrap();
}

/// Apply every change of the feed, one batch each
pub fn index_all(index: &Index, source: &dyn DocumentSource) {
    for change in source.get_changes_since(index.last_processed_etag()).unwrap() {
        let batch = match change.body {
            ChangeBody::Put(fields) => Batch::new().put(Document { id: change.external_id, fields }),
            ChangeBody::Delete => Batch::new().delete(change.external_id),
        };
        index.apply(batch, change.etag).unwrap();
    }
}

/// Overwrite the middle of the newest live segment file
pub fn corrupt_newest_segment(dir: &Path) {
    let layout = StorageLayout::new(dir).unwrap();
    let newest = *layout.list_segment_generations().unwrap().last().unwrap();
    let path = layout.segment_path(newest);

    let mut bytes = std::fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    for byte in &mut bytes[middle..] {
        *byte = 0xAB;
    }
    std::fs::write(&path, &bytes).unwrap();
}

/// Flip the last byte of every segment copy kept by one commit point
pub fn corrupt_commit_point_copy(dir: &Path, id: u64) {
    let point_dir = dir.join("CommitPoints").join(format!("{:08}", id));
    for entry in std::fs::read_dir(&point_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "seg") {
            let mut bytes = std::fs::read(&path).unwrap();
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
            std::fs::write(&path, &bytes).unwrap();
        }
    }
}

pub fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}
