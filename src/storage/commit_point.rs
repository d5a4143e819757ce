use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::core::clock::Clock;
use crate::core::error::Result;
use crate::core::types::Etag;
use crate::mvcc::controller::SegmentArena;
use crate::storage::layout::{sync_dir, StorageLayout};

/// Metadata file inside every commit point directory
pub const COMMIT_POINT_FILE: &str = "index.commitPoint";

const STAGING_SUFFIX: &str = ".tmp";
/// Commit points that failed validation are renamed aside, never reused
const QUARANTINE_SUFFIX: &str = ".corrupt";

/// A recovery snapshot: the index was consistent with the document store up
/// to `last_processed_etag` at `timestamp`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPoint {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub generation: u64,
    pub last_processed_etag: Etag,
    /// Segment files copied into the commit point directory
    pub segment_files: Vec<String>,
    #[serde(skip)]
    pub dir: PathBuf,
}

impl CommitPoint {
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.segment_files.iter().map(|name| self.dir.join(name)).collect()
    }
}

/// Read every commit point under the layout, oldest first
///
/// Directories without readable metadata are skipped.
pub fn read_commit_points(layout: &StorageLayout) -> Result<Vec<CommitPoint>> {
    let mut points = Vec::new();

    for entry in fs::read_dir(&layout.commit_points_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(|n| n.parse::<u64>().ok()) else {
            continue;
        };

        let dir = entry.path();
        match read_metadata(&dir) {
            Ok(mut point) if point.id == id => {
                point.dir = dir;
                points.push(point);
            }
            Ok(point) => {
                warn!(dir = %dir.display(), id = point.id, "Commit point id does not match its directory, skipping");
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Unreadable commit point, skipping");
            }
        }
    }

    points.sort_by_key(|p| p.id);
    Ok(points)
}

fn read_metadata(dir: &Path) -> Result<CommitPoint> {
    let data = fs::read(dir.join(COMMIT_POINT_FILE))?;
    Ok(serde_json::from_slice(&data)?)
}

fn dir_name(id: u64) -> String {
    format!("{:08}", id)
}

/// Move a damaged commit point out of the way, keeping it for inspection
pub fn quarantine(point: &CommitPoint) -> Result<PathBuf> {
    let mut name = point.dir.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(QUARANTINE_SUFFIX);
    let target = point.dir.with_file_name(name);

    fs::rename(&point.dir, &target)?;
    if let Some(parent) = target.parent() {
        sync_dir(parent)?;
    }
    warn!(id = point.id, generation = point.generation, dir = %target.display(), "Commit point quarantined");
    Ok(target)
}

/// Persists, enumerates and evicts commit points
#[derive(Clone)]
pub struct CommitPointStore {
    layout: StorageLayout,
    arena: Arc<SegmentArena>,
    clock: Arc<dyn Clock>,
    max_stored: usize,
    next_id: Arc<AtomicU64>,
}

impl CommitPointStore {
    /// Open the store, discarding half-built commit points and registering
    /// the surviving ones with the arena
    pub fn open(
        layout: StorageLayout,
        arena: Arc<SegmentArena>,
        clock: Arc<dyn Clock>,
        max_stored: usize,
    ) -> Result<Self> {
        let mut max_id = 0;
        for entry in fs::read_dir(&layout.commit_points_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if let Some(staged) = name.strip_suffix(STAGING_SUFFIX) {
                if let Ok(id) = staged.parse::<u64>() {
                    max_id = max_id.max(id);
                }
                match fs::remove_dir_all(entry.path()) {
                    Ok(()) => debug!(dir = %name, "Removed staged commit point"),
                    Err(e) => warn!(dir = %name, error = %e, "Failed to remove staged commit point"),
                }
                continue;
            }
            let id_part = name.strip_suffix(QUARANTINE_SUFFIX).unwrap_or(&name);
            if let Ok(id) = id_part.parse::<u64>() {
                max_id = max_id.max(id);
            }
        }

        let points = read_commit_points(&layout)?;
        for point in &points {
            arena.retain_for_commit_point(point.generation);
        }

        Ok(CommitPointStore {
            layout,
            arena,
            clock,
            max_stored,
            next_id: Arc::new(AtomicU64::new(max_id + 1)),
        })
    }

    /// Copy the durable files of `generation` into a new commit point, then
    /// evict the oldest beyond `max_stored`
    ///
    /// Only staging and publishing the copy can fail the call.
    pub fn snapshot(&self, generation: u64, last_processed_etag: Etag) -> Result<CommitPoint> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let final_dir = self.layout.commit_points_dir.join(dir_name(id));
        let staging_dir = self
            .layout
            .commit_points_dir
            .join(format!("{}{}", dir_name(id), STAGING_SUFFIX));

        let mut point = CommitPoint {
            id,
            timestamp: self.clock.now(),
            generation,
            last_processed_etag,
            segment_files: vec![StorageLayout::segment_file_name(generation)],
            dir: final_dir.clone(),
        };

        if let Err(e) = self.stage(&point, &staging_dir) {
            let _ = fs::remove_dir_all(&staging_dir);
            return Err(e);
        }
        fs::rename(&staging_dir, &final_dir)?;
        sync_dir(&self.layout.commit_points_dir)?;
        point.dir = final_dir;

        self.arena.retain_for_commit_point(generation);
        info!(
            id,
            generation,
            etag = last_processed_etag,
            "Commit point created"
        );

        // The commit point is durable at this point; a failed eviction is
        // retried after the next snapshot
        if let Err(e) = self.evict() {
            warn!(id, error = %e, "Commit point eviction failed");
        }
        Ok(point)
    }

    fn stage(&self, point: &CommitPoint, staging_dir: &Path) -> Result<()> {
        fs::create_dir_all(staging_dir)?;

        for name in &point.segment_files {
            let target = staging_dir.join(name);
            fs::copy(self.layout.base_dir.join(name), &target)?;
            File::open(&target)?.sync_all()?;
        }

        let metadata = serde_json::to_vec_pretty(point)?;
        let mut file = File::create(staging_dir.join(COMMIT_POINT_FILE))?;
        file.write_all(&metadata)?;
        file.sync_all()?;

        sync_dir(staging_dir)
    }

    /// Commit points, newest last
    pub fn list(&self) -> Result<Vec<CommitPoint>> {
        read_commit_points(&self.layout)
    }

    pub fn latest(&self) -> Result<Option<CommitPoint>> {
        Ok(self.list()?.pop())
    }

    /// Drop the oldest commit points while more than `max_stored` remain
    pub fn evict(&self) -> Result<Vec<CommitPoint>> {
        let mut points = self.list()?;
        let mut evicted = Vec::new();

        while points.len() > self.max_stored {
            let oldest = points.remove(0);
            fs::remove_dir_all(&oldest.dir)?;
            self.arena.release_commit_point(oldest.generation);
            info!(id = oldest.id, generation = oldest.generation, "Commit point evicted");
            evicted.push(oldest);
        }

        Ok(evicted)
    }
}
