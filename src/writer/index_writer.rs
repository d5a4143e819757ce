use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use crate::analysis::Tokenize;
use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Etag;
use crate::index::inverted::InvertedIndex;
use crate::mvcc::controller::SegmentArena;
use crate::parallel::indexer::{IndexingFailure, ParallelIndexer};
use crate::storage::commit_point::{CommitPoint, CommitPointStore};
use crate::storage::segment::Segment;
use crate::storage::segment_writer::SegmentWriter;
use crate::writer::batch::Batch;

/// Result of applying one batch
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// Newest durable generation after the batch
    pub generation: u64,
    pub flushed: bool,
    pub commit_point: Option<CommitPoint>,
    pub failures: Vec<IndexingFailure>,
}

#[derive(Debug, Clone)]
pub struct FlushOutcome {
    pub generation: u64,
    pub flushed: bool,
    pub commit_point: Option<CommitPoint>,
}

/// Single writer over the active segment
///
/// Mutations land in an in-memory working copy; a flush writes it as the
/// next generation and publishes it to readers.
pub struct IndexWriter {
    config: Config,
    arena: Arc<SegmentArena>,
    commit_points: CommitPointStore,
    segment_writer: SegmentWriter,
    indexer: ParallelIndexer,
    clock: Arc<dyn Clock>,

    active: InvertedIndex,
    last_generation: u64,
    last_etag: Etag,
    dirty: bool,
    batches_since_flush: usize,
    pending_bytes: usize,

    last_commit_point_at: Option<DateTime<Utc>>,
    last_commit_point_generation: Option<u64>,
}

impl IndexWriter {
    pub fn new(
        config: Config,
        arena: Arc<SegmentArena>,
        commit_points: CommitPointStore,
        segment_writer: SegmentWriter,
        tokenize: Tokenize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let current = arena.current();
        let latest = commit_points.latest()?;

        Ok(IndexWriter {
            config,
            commit_points,
            segment_writer,
            indexer: ParallelIndexer::new(tokenize),
            clock,
            active: current.index.clone(),
            last_generation: current.generation,
            last_etag: current.last_etag,
            dirty: false,
            batches_since_flush: 0,
            pending_bytes: 0,
            // The first durable generation after open always gets a commit point
            last_commit_point_at: None,
            last_commit_point_generation: latest.map(|p| p.generation),
            arena,
        })
    }

    /// Apply one batch atomically, then run the flush and commit point policies
    pub fn apply(&mut self, batch: Batch, source_etag: Etag) -> Result<ApplyOutcome> {
        let available = u32::MAX as usize - self.active.doc_count();
        if batch.puts.len() > available {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("batch of {} puts exceeds remaining id space", batch.puts.len()),
            ));
        }

        // Analysis is the only step that can fail per document; run it before
        // touching the postings
        let analyzed = self.indexer.analyze_batch(&batch.puts);

        for external_id in &batch.deletes {
            if self.active.delete(external_id).is_some() {
                self.dirty = true;
            }
        }

        let mut failures = Vec::new();
        for doc in analyzed {
            self.active.add_document(&doc.external_id, &doc.terms)?;
            self.pending_bytes += doc.approximate_bytes;
            failures.extend(doc.failures);
            self.dirty = true;
        }

        if source_etag > self.last_etag {
            self.last_etag = source_etag;
            self.dirty = true;
        }
        self.batches_since_flush += 1;

        if !failures.is_empty() {
            debug!(count = failures.len(), etag = source_etag, "Fields failed to index");
        }

        let flushed = if self.should_flush() {
            self.flush_active()?
        } else {
            false
        };
        let commit_point = self.run_commit_point_schedule(flushed)?;

        Ok(ApplyOutcome {
            generation: self.arena.generation(),
            flushed,
            commit_point,
            failures,
        })
    }

    /// Flush pending changes now
    pub fn flush(&mut self) -> Result<FlushOutcome> {
        let flushed = self.flush_active()?;
        let commit_point = self.run_commit_point_schedule(flushed)?;

        Ok(FlushOutcome {
            generation: self.arena.generation(),
            flushed,
            commit_point,
        })
    }

    /// Time-driven policy check without a new batch
    pub fn maintain(&mut self) -> Result<Option<CommitPoint>> {
        self.run_commit_point_schedule(false)
    }

    /// Drop tombstoned and superseded documents, renumber, and flush the result
    pub fn compact(&mut self) -> Result<FlushOutcome> {
        let before = self.active.doc_count();
        let compacted = self.active.compacted();
        let after = compacted.doc_count();

        if after != before {
            self.active = compacted;
            self.dirty = true;
        }
        info!(before, after, "Compacting index");

        self.flush()
    }

    pub fn generation(&self) -> u64 {
        self.arena.generation()
    }

    /// Number future generations above `generation`, so files left by a
    /// damaged index are never reused
    pub fn raise_generation_floor(&mut self, generation: u64) {
        self.last_generation = self.last_generation.max(generation);
    }

    /// Highest etag applied, flushed or not
    pub fn last_etag(&self) -> Etag {
        self.last_etag
    }

    pub fn commit_points(&self) -> &CommitPointStore {
        &self.commit_points
    }

    fn should_flush(&self) -> bool {
        self.batches_since_flush >= self.config.flush_batch_threshold
            || self.pending_bytes >= self.config.flush_byte_threshold
    }

    /// Write the working copy as the next generation. On error nothing is
    /// published and the pending state is kept for the next attempt.
    fn flush_active(&mut self) -> Result<bool> {
        if !self.dirty {
            self.batches_since_flush = 0;
            return Ok(false);
        }

        let segment = Segment {
            generation: self.last_generation + 1,
            last_etag: self.last_etag,
            created_at: self.clock.now(),
            index: self.active.clone(),
        };
        self.segment_writer.write(&segment)?;

        info!(
            generation = segment.generation,
            etag = segment.last_etag,
            docs = segment.doc_count(),
            terms = segment.index.term_count(),
            pending_bytes = self.pending_bytes,
            "Flushed segment"
        );

        self.last_generation = segment.generation;
        self.arena.publish(Arc::new(segment));
        self.dirty = false;
        self.batches_since_flush = 0;
        self.pending_bytes = 0;
        Ok(true)
    }

    fn run_commit_point_schedule(&mut self, flushed: bool) -> Result<Option<CommitPoint>> {
        let due = match self.last_commit_point_at {
            None => self.arena.generation() > 0,
            Some(last) => {
                let elapsed = (self.clock.now() - last).to_std().unwrap_or_default();
                if flushed && elapsed >= self.config.min_commit_point_interval() {
                    true
                } else if elapsed >= self.config.max_commit_point_interval() {
                    if self.dirty {
                        self.flush_active()?;
                    }
                    true
                } else {
                    false
                }
            }
        };
        if !due {
            return Ok(None);
        }

        let current = self.arena.current();
        if current.generation == 0 || self.last_commit_point_generation == Some(current.generation) {
            return Ok(None);
        }

        let point = self.commit_points.snapshot(current.generation, current.last_etag)?;
        self.last_commit_point_at = Some(point.timestamp);
        self.last_commit_point_generation = Some(point.generation);
        Ok(Some(point))
    }
}
