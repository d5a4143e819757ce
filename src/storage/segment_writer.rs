use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use crc32fast::Hasher;
use tracing::debug;
use crate::core::error::Result;
use crate::storage::layout::{sync_dir, StorageLayout};
use crate::storage::segment::{Segment, SegmentHeader};

/// Serialize a segment into its on-disk bytes
// [ HEADER (magic, version, payload_len, crc32, flags) ] <- byte 0
// [ LZ4( bincode(Segment) ) ]
pub fn encode_segment(segment: &Segment) -> Result<Vec<u8>> {
    let raw = bincode::serialize(segment)?;
    let payload = lz4_flex::compress_prepend_size(&raw);

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let header = SegmentHeader::new(payload.len() as u64, hasher.finalize());

    let mut buf = Vec::with_capacity(SegmentHeader::SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Write `bytes` to `path` atomically: temp file, fsync, rename, fsync dir
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = StorageLayout::temp_path(path);
    let written = (|| -> Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if let Err(e) = written {
        // Never leave a partial file behind for a later open to trip over
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Some(dir) = path.parent() {
        sync_dir(dir)?;
    }
    Ok(())
}

pub struct SegmentWriter {
    layout: StorageLayout,
}

impl SegmentWriter {
    pub fn new(layout: StorageLayout) -> Self {
        SegmentWriter { layout }
    }

    /// Durably write `segment` as `segment_<generation>.seg`
    pub fn write(&self, segment: &Segment) -> Result<PathBuf> {
        let path = self.layout.segment_path(segment.generation);
        let bytes = encode_segment(segment)?;
        write_atomic(&path, &bytes)?;

        debug!(
            generation = segment.generation,
            docs = segment.doc_count(),
            bytes = bytes.len(),
            "Segment written"
        );
        Ok(path)
    }
}
