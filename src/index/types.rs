use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trigram is a 3-byte sequence packed into a u32 (lower 24 bits only):
/// `b0<<16 | b1<<8 | b2`. Ordering is numeric.
pub type Trigram = u32;

/// Document id local to one segment, dense from zero in insertion order.
pub type LocalDocId = u32;

/// Document id within a reader snapshot: per-segment base plus local id.
/// Stable only for the lifetime of one reader.
pub type DocId = u64;

/// Random 128-bit segment identifier, rendered as 32 hex chars on disk.
pub type SegmentId = Uuid;

/// Current on-disk meta version.
pub const META_VERSION: u32 = 1;

/// Pack 3 bytes into a trigram.
#[inline]
pub fn trigram(b0: u8, b1: u8, b2: u8) -> Trigram {
    ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32)
}

/// Unpack a trigram back into its bytes.
#[inline]
pub fn trigram_bytes(t: Trigram) -> [u8; 3] {
    [((t >> 16) & 0xFF) as u8, ((t >> 8) & 0xFF) as u8, (t & 0xFF) as u8]
}

/// Interpret stored name bytes as a file system path.
pub fn path_from_bytes(name: &[u8]) -> std::path::PathBuf {
    std::path::PathBuf::from(String::from_utf8_lossy(name).as_ref())
}

/// Parse a 32-hex-char segment id.
pub fn parse_segment_id(s: &str) -> crate::Result<SegmentId> {
    if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(crate::Error::InvalidSegmentId(s.to_string()));
    }
    Uuid::try_parse(s).map_err(|_| crate::Error::InvalidSegmentId(s.to_string()))
}

/// On-disk segment format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SegmentVersion {
    /// Plain posting lists: trigram -> local doc ids.
    V1,
    /// Positional posting lists plus per-document rune-offset maps.
    #[default]
    V2,
}

/// Per-segment entry in the index meta.
///
/// Immutable after creation apart from the deletion fields, which advance
/// each time a new deletion bitmap replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    #[serde(with = "uuid::serde::simple")]
    pub id: SegmentId,
    /// Original doc count including tombstones; defines the global-id span.
    pub num_docs: u32,
    pub num_deleted_docs: u32,
    pub has_deletions: bool,
    pub del_gen: u64,
}

impl SegmentMeta {
    pub fn new(id: SegmentId, num_docs: u32) -> Self {
        Self {
            id,
            num_docs,
            num_deleted_docs: 0,
            has_deletions: false,
            del_gen: 0,
        }
    }

    pub fn live_docs(&self) -> u32 {
        self.num_docs - self.num_deleted_docs
    }

    /// Segment file name under `segments/`.
    pub fn seg_file_name(&self) -> String {
        format!("{}.seg", self.id.as_simple())
    }

    /// Deletion bitmap file name under `segments/`.
    pub fn del_file_name(&self) -> String {
        format!("{}.del", self.id.as_simple())
    }
}

/// The atomically committed table of live segments.
///
/// The segment order defines the global-id space: the global id of local
/// id L in the segment at position k is `sum(segments[0..k].num_docs) + L`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    /// Monotonically increasing commit counter, one per commit.
    pub opstamp: u64,
    pub segments: Vec<SegmentMeta>,
}

impl Default for IndexMeta {
    fn default() -> Self {
        Self {
            version: META_VERSION,
            opstamp: 0,
            segments: Vec::new(),
        }
    }
}

impl IndexMeta {
    /// Total live documents across all segments.
    pub fn live_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_docs() as u64).sum()
    }

    pub fn find_segment(&self, id: &SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == *id)
    }
}

/// Configuration for the index writer and searcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Buffered docs that trigger an automatic commit.
    pub flush_threshold: usize,
    /// Format written for new segments.
    pub segment_version: SegmentVersion,
    /// Context lines above and below each matching line in a snippet.
    pub context_lines: usize,
    /// Snippet cap per file.
    pub max_snippets_per_file: usize,
    /// Candidates verified per query: this factor times max_results.
    pub verify_candidates_factor: usize,
    /// Verification worker threads; None picks min(CPU count, 16).
    pub verify_threads: Option<usize>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 10_000,
            segment_version: SegmentVersion::V2,
            context_lines: 2,
            max_snippets_per_file: 10,
            verify_candidates_factor: 2,
            verify_threads: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigram_packing() {
        let t = trigram(b'a', b'b', b'c');
        assert_eq!(t, 0x616263);
        assert_eq!(trigram_bytes(t), *b"abc");
    }

    #[test]
    fn test_trigram_ordering_is_numeric() {
        assert!(trigram(b'a', b'b', b'c') < trigram(b'a', b'b', b'd'));
        assert!(trigram(0x00, 0xFF, 0xFF) < trigram(0x01, 0x00, 0x00));
    }

    #[test]
    fn test_segment_id_parse() {
        let id = Uuid::new_v4();
        let hex = id.as_simple().to_string();
        assert_eq!(hex.len(), 32);
        assert_eq!(parse_segment_id(&hex).unwrap(), id);

        assert!(parse_segment_id("not-hex").is_err());
        assert!(parse_segment_id("abcd").is_err());
    }

    #[test]
    fn test_meta_json_roundtrip() {
        let mut meta = IndexMeta::default();
        meta.opstamp = 3;
        let mut seg = SegmentMeta::new(Uuid::new_v4(), 10);
        seg.num_deleted_docs = 2;
        seg.has_deletions = true;
        seg.del_gen = 1;
        meta.segments.push(seg);

        let json = serde_json::to_string(&meta).unwrap();
        // ids serialize as bare 32-char hex
        assert!(json.contains(&meta.segments[0].id.as_simple().to_string()));
        let back: IndexMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
        assert_eq!(back.live_docs(), 8);
    }

    #[test]
    fn test_segment_file_names() {
        let seg = SegmentMeta::new(Uuid::new_v4(), 1);
        assert!(seg.seg_file_name().ends_with(".seg"));
        assert!(seg.del_file_name().ends_with(".del"));
        assert_eq!(seg.seg_file_name().len(), 36);
    }
}
