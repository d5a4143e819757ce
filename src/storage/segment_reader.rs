use std::fs::File;
use std::io;
use std::path::Path;
use crc32fast::Hasher;
use memmap2::Mmap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;
use crate::storage::segment::{Segment, SegmentHeader};

/// Decode and fully validate a segment from its on-disk bytes
pub fn decode_segment(bytes: &[u8]) -> Result<Segment> {
    let header = SegmentHeader::decode(bytes)?;

    let payload = &bytes[SegmentHeader::SIZE..];
    if payload.len() as u64 != header.payload_len {
        return Err(Error::corruption(format!(
            "segment payload is {} bytes, header says {}",
            payload.len(),
            header.payload_len
        )));
    }

    let mut hasher = Hasher::new();
    hasher.update(payload);
    let checksum = hasher.finalize();
    if checksum != header.checksum {
        return Err(Error::corruption(format!(
            "segment checksum mismatch: {:#010x} != {:#010x}",
            checksum, header.checksum
        )));
    }

    let raw = lz4_flex::decompress_size_prepended(payload)
        .map_err(|e| Error::corruption(format!("segment decompression failed: {}", e)))?;
    let mut segment: Segment = bincode::deserialize(&raw)
        .map_err(|e| Error::corruption(format!("segment decode failed: {}", e)))?;

    segment.index.validate()?;
    segment.index.rebuild_lookup();
    Ok(segment)
}

pub struct SegmentReader;

impl SegmentReader {
    /// Map and validate the segment at `path`
    ///
    /// A missing file is `NotFound`; anything unreadable as a segment is
    /// `Corruption`.
    pub fn open(path: &Path) -> Result<Segment> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                Error::new(ErrorKind::NotFound, format!("{} does not exist", path.display()))
            }
            _ => Error::from(e),
        })?;

        // Empty files cannot be mapped
        let len = file.metadata()?.len();
        if len < SegmentHeader::SIZE as u64 {
            return Err(Error::corruption(format!(
                "{} is truncated ({} bytes)",
                path.display(),
                len
            )));
        }

        let mmap = unsafe { Mmap::map(&file)? };
        let segment = decode_segment(&mmap)?;

        let expected = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(StorageLayout::parse_segment_file_name);
        if let Some(expected) = expected {
            if expected != segment.generation {
                return Err(Error::corruption(format!(
                    "{} holds generation {}",
                    path.display(),
                    segment.generation
                )));
            }
        }

        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::term::Term;
    use crate::storage::segment_writer::SegmentWriter;

    fn sample(generation: u64) -> Segment {
        let mut segment = Segment::empty();
        segment.generation = generation;
        segment.last_etag = 7;
        segment.index.add_document("users/1", &[Term::new("Name", "arek")]).unwrap();
        segment.index.add_document("users/2", &[Term::new("Name", "oren")]).unwrap();
        segment.index.delete("users/1");
        segment
    }

    #[test]
    fn written_segment_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        let path = SegmentWriter::new(layout.clone()).write(&sample(3)).unwrap();

        let segment = SegmentReader::open(&path).unwrap();
        assert_eq!(segment.generation, 3);
        assert_eq!(segment.last_etag, 7);
        assert_eq!(segment.index.live_count(), 1);
        assert!(layout.list_temp_files().unwrap().is_empty());
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        let path = SegmentWriter::new(layout).write(&sample(1)).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(SegmentReader::open(&path).unwrap_err().kind, ErrorKind::Corruption);
    }

    #[test]
    fn empty_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        let path = layout.segment_path(5);

        assert_eq!(SegmentReader::open(&path).unwrap_err().kind, ErrorKind::NotFound);

        std::fs::write(&path, b"").unwrap();
        assert_eq!(SegmentReader::open(&path).unwrap_err().kind, ErrorKind::Corruption);
    }

    #[test]
    fn renamed_segment_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        let path = SegmentWriter::new(layout.clone()).write(&sample(2)).unwrap();
        let moved = layout.segment_path(9);
        std::fs::rename(&path, &moved).unwrap();

        assert!(SegmentReader::open(&moved).unwrap_err().is_corruption());
    }
}
