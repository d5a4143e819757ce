use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::Deref;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{debug, warn};
use crate::core::error::Result;
use crate::storage::layout::StorageLayout;
use crate::storage::segment::Segment;

/// Reference counts of one segment generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotRefs {
    pub readers: usize,
    pub commit_points: usize,
}

struct ArenaState {
    current: Arc<Segment>,
    slots: BTreeMap<u64, SlotRefs>,
}

/// Registry of segment generations
///
/// A generation's live file is deleted once it is no longer current and both
/// its reader count and commit point count are zero.
pub struct SegmentArena {
    layout: StorageLayout,
    state: Mutex<ArenaState>,
}

impl SegmentArena {
    pub fn new(layout: StorageLayout, initial: Segment) -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(initial.generation, SlotRefs::default());

        SegmentArena {
            layout,
            state: Mutex::new(ArenaState {
                current: Arc::new(initial),
                slots,
            }),
        }
    }

    pub fn current(&self) -> Arc<Segment> {
        self.state.lock().current.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().current.generation
    }

    /// Pin the current generation for the lifetime of the lease
    pub fn acquire_reader(self: &Arc<Self>) -> ReaderLease {
        let segment = {
            let mut state = self.state.lock();
            let segment = state.current.clone();
            state.slots.entry(segment.generation).or_default().readers += 1;
            segment
        };

        ReaderLease {
            arena: Arc::clone(self),
            segment,
        }
    }

    /// Make a freshly flushed generation current
    pub fn publish(&self, segment: Arc<Segment>) {
        let retired = {
            let mut state = self.state.lock();
            let previous = state.current.generation;
            state.slots.entry(segment.generation).or_default();
            state.current = segment;
            Self::take_if_unreferenced(&mut state, previous)
        };

        if let Some(generation) = retired {
            self.delete_segment_file(generation);
        }
    }

    pub fn retain_for_commit_point(&self, generation: u64) {
        let mut state = self.state.lock();
        state.slots.entry(generation).or_default().commit_points += 1;
    }

    pub fn release_commit_point(&self, generation: u64) {
        let retired = {
            let mut state = self.state.lock();
            match state.slots.get_mut(&generation) {
                Some(slot) if slot.commit_points > 0 => slot.commit_points -= 1,
                _ => {
                    warn!(generation, "Commit point release without matching retain");
                    return;
                }
            }
            Self::take_if_unreferenced(&mut state, generation)
        };

        if let Some(generation) = retired {
            self.delete_segment_file(generation);
        }
    }

    fn release_reader(&self, generation: u64) {
        let retired = {
            let mut state = self.state.lock();
            if let Some(slot) = state.slots.get_mut(&generation) {
                slot.readers = slot.readers.saturating_sub(1);
            }
            Self::take_if_unreferenced(&mut state, generation)
        };

        if let Some(generation) = retired {
            self.delete_segment_file(generation);
        }
    }

    pub fn refs(&self, generation: u64) -> Option<SlotRefs> {
        self.state.lock().slots.get(&generation).copied()
    }

    /// Generations with a registered slot, ascending
    pub fn tracked_generations(&self) -> Vec<u64> {
        self.state.lock().slots.keys().copied().collect()
    }

    /// Remove live segment files and temp files nothing references
    pub fn sweep_unreferenced(&self) -> Result<()> {
        let tracked = self.tracked_generations();
        for generation in self.layout.list_segment_generations()? {
            if tracked.binary_search(&generation).is_err() {
                self.delete_segment_file(generation);
            }
        }

        for path in self.layout.list_temp_files()? {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed stale temp file"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale temp file"),
            }
        }
        Ok(())
    }

    fn take_if_unreferenced(state: &mut ArenaState, generation: u64) -> Option<u64> {
        if generation == state.current.generation {
            return None;
        }
        match state.slots.get(&generation) {
            Some(slot) if slot.readers == 0 && slot.commit_points == 0 => {
                state.slots.remove(&generation);
                Some(generation)
            }
            _ => None,
        }
    }

    // Best effort: a leftover file is swept at next open
    fn delete_segment_file(&self, generation: u64) {
        if generation == 0 {
            return;
        }
        let path = self.layout.segment_path(generation);
        match fs::remove_file(&path) {
            Ok(()) => debug!(generation, "Deleted retired segment"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(generation, error = %e, "Failed to delete retired segment"),
        }
    }
}

/// An open reader's pin on one immutable generation
pub struct ReaderLease {
    arena: Arc<SegmentArena>,
    segment: Arc<Segment>,
}

impl ReaderLease {
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn generation(&self) -> u64 {
        self.segment.generation
    }
}

impl Deref for ReaderLease {
    type Target = Segment;

    fn deref(&self) -> &Segment {
        &self.segment
    }
}

impl Drop for ReaderLease {
    fn drop(&mut self) {
        self.arena.release_reader(self.segment.generation);
    }
}
