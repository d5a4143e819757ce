//! Durable full-text index: an inverted index fed by a document change feed,
//! snapshotted into commit points and repaired from them on open.

pub mod core;
pub mod storage;
pub mod analysis;
pub mod index;
pub mod search;
pub mod query;
pub mod mvcc;
pub mod writer;
pub mod reader;
pub mod parallel;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::index::Index;
pub use crate::core::types::{DocId, Document, Etag, FieldValue};
pub use crate::query::ast::Query;
pub use crate::storage::recovery::{Change, ChangeBody, DocumentSource, RecoveryState};
pub use crate::writer::batch::Batch;

/*
┌───────────────────────────────────── RELATIONSHIPS ──────────────────────────────────────┐
│                                                                                           │
│  Index ──owns──> IndexWriter ──uses──> ParallelIndexer ──tokenize──> Term                 │
│    │                 │                                                                    │
│    │                 ├──mutates──> InvertedIndex ──contains──> PostingList               │
│    │                 ├──flush──> SegmentWriter ──writes──> segment_<gen>.seg              │
│    │                 └──schedules──> CommitPointStore ──copies──> CommitPoints/<id>/     │
│    │                                                                                      │
│    ├──owns──> SegmentArena ──pins──> ReaderLease (readers + commit points refcount)      │
│    │                                    │                                                 │
│    │                                    ├──> Searcher ──uses──> QueryPlanner ──> Plan    │
│    │                                    │       └──uses──> FacetAggregator               │
│    │                                    └──> TermReader ──yields──> EntryValue           │
│    │                                                                                      │
│    ├──owns──> FacetSetupStore ──stores──> Facets/<id>.json                               │
│    │                                                                                      │
│    └──on open──> RecoveryManager: Validating ─> Restoring ─> Replaying ─> Ready          │
│                        └──pulls──> DocumentSource::get_changes_since(etag)               │
│                                                                                           │
└───────────────────────────────────────────────────────────────────────────────────────────┘
*/
