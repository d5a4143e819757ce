use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;

/// Ceiling for full-index materialization in the term reader
pub const DEFAULT_MAX_ENTRIES_FOR_DEBUG_READ: usize = 128 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,

    // Flush policy for the active segment
    pub flush_batch_threshold: usize,
    pub flush_byte_threshold: usize,

    // Commit point policy
    pub min_commit_point_interval_secs: u64,
    pub max_commit_point_interval_secs: u64,
    pub max_stored_commit_points: usize,

    pub max_entries_for_debug_read: usize,
    pub replay_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            flush_batch_threshold: 1,                  // Flush after every batch
            flush_byte_threshold: 8 * 1024 * 1024,     // 8MB of pending postings
            min_commit_point_interval_secs: 60,
            max_commit_point_interval_secs: 5 * 60,
            max_stored_commit_points: 5,
            max_entries_for_debug_read: DEFAULT_MAX_ENTRIES_FOR_DEBUG_READ,
            replay_batch_size: 1024,
        }
    }
}

impl Config {
    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        Config {
            storage_path: path.into(),
            ..Config::default()
        }
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn min_commit_point_interval(&self) -> Duration {
        Duration::from_secs(self.min_commit_point_interval_secs)
    }

    pub fn max_commit_point_interval(&self) -> Duration {
        Duration::from_secs(self.max_commit_point_interval_secs)
    }

    /// Take a commit point after every flush
    pub fn commit_point_after_each_flush(mut self) -> Self {
        self.min_commit_point_interval_secs = 0;
        self.max_commit_point_interval_secs = 0;
        self
    }
}
