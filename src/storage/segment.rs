use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::Etag;
use crate::index::inverted::InvertedIndex;

/// One immutable generation of the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub generation: u64,
    /// Highest source etag reflected by this generation
    pub last_etag: Etag,
    pub created_at: DateTime<Utc>,
    pub index: InvertedIndex,
}

impl Segment {
    /// Generation 0: nothing indexed, nothing on disk
    pub fn empty() -> Self {
        Segment {
            generation: 0,
            last_etag: 0,
            created_at: DateTime::<Utc>::default(),
            index: InvertedIndex::new(),
        }
    }

    pub fn doc_count(&self) -> usize {
        self.index.doc_count()
    }
}

pub const SEGMENT_MAGIC: &[u8; 4] = b"DIXS";

/// Payload is lz4 block compressed, length prepended
pub const FLAG_LZ4: u32 = 1;

/// Segment file header
///
/// ```text
/// [ magic: 4 ][ version: u32 ][ payload_len: u64 ][ crc32: u32 ][ flags: u32 ]
/// ```
/// All integers little endian. The checksum covers the payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub version: u32,
    pub payload_len: u64,
    pub checksum: u32,
    pub flags: u32,
}

impl SegmentHeader {
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 24; // Fixed header size

    pub fn new(payload_len: u64, checksum: u32) -> Self {
        SegmentHeader {
            version: Self::VERSION,
            payload_len,
            checksum,
            flags: FLAG_LZ4,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(SEGMENT_MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf[20..24].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::corruption(format!(
                "segment header truncated: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != SEGMENT_MAGIC {
            return Err(Error::corruption("bad segment magic"));
        }

        let version = read_u32(&bytes[4..8]);
        if version != Self::VERSION {
            return Err(Error::corruption(format!("unsupported segment version {}", version)));
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[8..16]);
        let header = SegmentHeader {
            version,
            payload_len: u64::from_le_bytes(len),
            checksum: read_u32(&bytes[16..20]),
            flags: read_u32(&bytes[20..24]),
        };

        if header.flags != FLAG_LZ4 {
            return Err(Error::corruption(format!("unknown segment flags {:#x}", header.flags)));
        }

        Ok(header)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed() {
        let header = SegmentHeader::new(1234, 0xDEADBEEF);
        let bytes = header.encode();

        assert_eq!(&bytes[0..4], b"DIXS");
        assert_eq!(SegmentHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn damaged_header_is_corruption() {
        let mut bytes = SegmentHeader::new(10, 1).encode();
        bytes[0] = b'X';
        assert!(SegmentHeader::decode(&bytes).unwrap_err().is_corruption());

        let bytes = SegmentHeader::new(10, 1).encode();
        assert!(SegmentHeader::decode(&bytes[..10]).unwrap_err().is_corruption());
    }
}
