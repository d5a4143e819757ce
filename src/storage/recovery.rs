use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::mem;
use tracing::{debug, info, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Document, Etag, FieldValue};
use crate::storage::commit_point::{quarantine, read_commit_points, CommitPoint};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::Segment;
use crate::storage::segment_reader::SegmentReader;
use crate::storage::segment_writer::write_atomic;
use crate::writer::batch::Batch;
use crate::writer::index_writer::IndexWriter;

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeBody {
    Put(BTreeMap<String, FieldValue>),
    Delete,
}

/// One entry of the document store's change feed
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub external_id: String,
    pub body: ChangeBody,
    pub etag: Etag,
}

impl Change {
    pub fn put(doc: Document, etag: Etag) -> Self {
        Change {
            external_id: doc.id,
            body: ChangeBody::Put(doc.fields),
            etag,
        }
    }

    pub fn delete(external_id: impl Into<String>, etag: Etag) -> Self {
        Change {
            external_id: external_id.into(),
            body: ChangeBody::Delete,
            etag,
        }
    }
}

/// The authoritative document store
pub trait DocumentSource: Send + Sync {
    /// Every change with an etag greater than `etag`, ascending
    fn get_changes_since(&self, etag: Etag) -> Result<Vec<Change>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Validating,
    Restoring,
    Replaying,
    Ready,
}

/// What recovery did on open
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub transitions: Vec<RecoveryState>,
    pub restored_from: Option<CommitPoint>,
    pub replayed_changes: usize,
    pub resumed_etag: Etag,
    pub generation: u64,
    /// Highest generation found on disk, damaged files included; new
    /// generations are numbered above it
    pub highest_generation: u64,
}

impl RecoveryReport {
    pub fn restored(&self) -> bool {
        self.transitions.contains(&RecoveryState::Restoring)
    }
}

/// Startup state machine: validate, restore, replay
///
/// Runs in two steps so the restored segment can seed the writer before
/// replay feeds it.
pub struct RecoveryManager {
    layout: StorageLayout,
    report: RecoveryReport,
    needs_replay: bool,
}

impl RecoveryManager {
    pub fn new(layout: StorageLayout) -> Self {
        RecoveryManager {
            layout,
            report: RecoveryReport::default(),
            needs_replay: false,
        }
    }

    fn enter(&mut self, state: RecoveryState) {
        debug!(?state, "Recovery state");
        self.report.transitions.push(state);
    }

    /// Validate the newest live segment, restoring from a commit point when
    /// it is missing or damaged
    pub fn restore(&mut self) -> Result<Segment> {
        self.enter(RecoveryState::Validating);

        let generations = self.layout.list_segment_generations()?;
        let points = read_commit_points(&self.layout)?;
        self.report.highest_generation = generations
            .iter()
            .copied()
            .chain(points.iter().map(|p| p.generation))
            .max()
            .unwrap_or(0);

        let Some(&newest) = generations.last() else {
            if points.is_empty() {
                info!(path = %self.layout.base_dir.display(), "Opening empty index");
                self.enter(RecoveryState::Ready);
                return Ok(Segment::empty());
            }
            warn!("Segment files missing while commit points exist");
            return self.restore_from(points);
        };

        match SegmentReader::open(&self.layout.segment_path(newest)) {
            Ok(segment) => {
                info!(
                    generation = segment.generation,
                    etag = segment.last_etag,
                    "Index validated"
                );
                self.report.generation = segment.generation;
                self.report.resumed_etag = segment.last_etag;
                self.enter(RecoveryState::Ready);
                Ok(segment)
            }
            Err(e) if e.is_corruption() => {
                warn!(generation = newest, error = %e, "Segment failed validation");
                self.restore_from(points)
            }
            Err(e) => Err(e),
        }
    }

    fn restore_from(&mut self, mut points: Vec<CommitPoint>) -> Result<Segment> {
        self.enter(RecoveryState::Restoring);
        self.needs_replay = true;

        let mut restored = None;
        while let Some(point) = points.pop() {
            match Self::validate_commit_point(&point) {
                Ok(segment) => {
                    restored = Some((point, segment));
                    break;
                }
                Err(e) => {
                    warn!(id = point.id, error = %e, "Commit point failed validation, trying older");
                    if let Err(e) = quarantine(&point) {
                        return Err(Error::new(
                            ErrorKind::RecoveryFailed,
                            format!("cannot quarantine commit point {}: {}", point.id, e),
                        ));
                    }
                }
            }
        }

        let floor = restored.as_ref().map(|(point, _)| point.generation).unwrap_or(0);
        for generation in self.layout.list_segment_generations()? {
            if generation > floor {
                fs::remove_file(self.layout.segment_path(generation))?;
                debug!(generation, "Removed segment newer than restore point");
            }
        }

        let segment = match restored {
            Some((point, segment)) => {
                for path in point.segment_paths() {
                    if let Some(name) = path.file_name() {
                        let bytes = fs::read(&path)?;
                        write_atomic(&self.layout.base_dir.join(name), &bytes)?;
                    }
                }
                info!(
                    id = point.id,
                    generation = segment.generation,
                    etag = segment.last_etag,
                    "Restored from commit point"
                );
                self.report.restored_from = Some(point);
                segment
            }
            None => {
                warn!("No usable commit point, rebuilding from an empty index");
                Segment::empty()
            }
        };

        self.report.generation = segment.generation;
        self.report.resumed_etag = segment.last_etag;
        Ok(segment)
    }

    fn validate_commit_point(point: &CommitPoint) -> Result<Segment> {
        let paths = point.segment_paths();
        let Some(path) = paths.first() else {
            return Err(Error::corruption(format!("commit point {} has no segment files", point.id)));
        };

        let segment = SegmentReader::open(path).map_err(|e| match e.kind {
            ErrorKind::NotFound => Error::corruption(e.context),
            _ => e,
        })?;
        if segment.generation != point.generation || segment.last_etag != point.last_processed_etag {
            return Err(Error::corruption(format!(
                "commit point {} metadata does not match its segment",
                point.id
            )));
        }
        Ok(segment)
    }

    /// Feed every change after the restored etag through the writer
    pub fn replay(
        &mut self,
        writer: &mut IndexWriter,
        source: &dyn DocumentSource,
        batch_size: usize,
    ) -> Result<()> {
        if !self.needs_replay {
            return Ok(());
        }
        self.enter(RecoveryState::Replaying);

        let from = writer.last_etag();
        let changes = source.get_changes_since(from).map_err(|e| {
            Error::new(
                ErrorKind::RecoveryFailed,
                format!("document store unavailable during replay from etag {}: {}", from, e),
            )
        })?;
        info!(from, changes = changes.len(), "Replaying changes");

        let batch_size = batch_size.max(1);
        let mut previous = from;
        let mut batch = Batch::new();
        let mut batch_ids = HashSet::new();
        let mut batch_etag = from;

        for change in changes {
            if change.etag <= previous {
                return Err(Error::new(
                    ErrorKind::RecoveryFailed,
                    format!("change feed not ascending: etag {} after {}", change.etag, previous),
                ));
            }
            previous = change.etag;

            // A repeated id would reorder within a batch, so it starts a new one
            if batch.len() >= batch_size || batch_ids.contains(&change.external_id) {
                writer.apply(mem::take(&mut batch), batch_etag)?;
                batch_ids.clear();
            }

            batch_ids.insert(change.external_id.clone());
            batch_etag = change.etag;
            match change.body {
                ChangeBody::Put(fields) => batch.add_put(Document {
                    id: change.external_id,
                    fields,
                }),
                ChangeBody::Delete => batch.add_delete(change.external_id),
            }
            self.report.replayed_changes += 1;
        }

        if !batch.is_empty() {
            writer.apply(batch, batch_etag)?;
        }
        writer.flush()?;

        self.report.generation = writer.generation();
        self.report.resumed_etag = writer.last_etag();
        info!(
            replayed = self.report.replayed_changes,
            etag = self.report.resumed_etag,
            generation = self.report.generation,
            "Replay complete"
        );
        self.enter(RecoveryState::Ready);
        Ok(())
    }

    pub fn highest_generation(&self) -> u64 {
        self.report.highest_generation
    }

    pub fn finish(self) -> RecoveryReport {
        self.report
    }
}
