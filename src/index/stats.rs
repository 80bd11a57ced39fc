//! Index statistics.
//!
//! Structured counters over a reader snapshot: per-segment document and
//! trigram counts, tombstone totals, and on-disk footprint. Front ends
//! render these; the core only computes them.

use crate::index::meta::{META_FILE, SEGMENTS_DIR};
use crate::index::reader::IndexReader;
use std::fs;
use std::path::Path;

/// Statistics for one segment in a snapshot.
#[derive(Debug, Clone)]
pub struct SegmentStats {
    /// 32-hex segment id.
    pub id: String,
    pub num_docs: u32,
    pub num_deleted_docs: u32,
    pub del_gen: u64,
    pub distinct_trigrams: usize,
    pub size_bytes: u64,
}

/// Aggregate statistics for an index snapshot.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub opstamp: u64,
    pub total_docs: u64,
    pub live_docs: u64,
    pub deleted_docs: u64,
    /// Sum of per-segment distinct counts; trigrams shared between
    /// segments are counted once per segment.
    pub distinct_trigrams: usize,
    /// Bytes of every file this snapshot references: the meta, each
    /// segment, and each deletion bitmap.
    pub index_size_bytes: u64,
    pub segments: Vec<SegmentStats>,
}

/// Compute statistics for a reader's snapshot.
pub fn index_stats(reader: &IndexReader) -> IndexStats {
    let mut segments = Vec::new();
    let mut total_docs = 0u64;
    let mut deleted_docs = 0u64;
    let mut distinct_trigrams = 0usize;
    let mut index_size_bytes = file_len(&reader.dir().join(META_FILE));

    let segments_dir = reader.dir().join(SEGMENTS_DIR);
    for (meta, seg) in reader.segment_readers() {
        total_docs += meta.num_docs as u64;
        deleted_docs += meta.num_deleted_docs as u64;
        distinct_trigrams += seg.distinct_trigrams();
        index_size_bytes += seg.size_bytes();
        if meta.has_deletions {
            index_size_bytes += file_len(&segments_dir.join(meta.del_file_name()));
        }
        segments.push(SegmentStats {
            id: meta.id.as_simple().to_string(),
            num_docs: meta.num_docs,
            num_deleted_docs: meta.num_deleted_docs,
            del_gen: meta.del_gen,
            distinct_trigrams: seg.distinct_trigrams(),
            size_bytes: seg.size_bytes(),
        });
    }

    IndexStats {
        opstamp: reader.meta().opstamp,
        total_docs,
        live_docs: total_docs - deleted_docs,
        deleted_docs,
        distinct_trigrams,
        index_size_bytes,
        segments,
    }
}

/// Size of one snapshot file. A file a concurrent merge already removed
/// counts as zero rather than failing the whole computation.
fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
