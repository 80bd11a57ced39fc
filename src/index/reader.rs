//! The snapshot index reader.
//!
//! A reader observes exactly the segments referenced by the meta file it
//! loaded, no matter what a concurrent writer does afterwards: segments
//! and deletion bitmaps are write-once files and the meta is swapped by
//! rename, so an open reader keeps its view until dropped. Every byte
//! slice handed out borrows from the reader's memory maps.

use crate::error::Result;
use crate::index::deletes::{DeletionView, is_deleted_raw};
use crate::index::meta::{SEGMENTS_DIR, load_meta};
use crate::index::segment::{Postings, SegmentReader};
use crate::index::types::{DocId, IndexMeta, LocalDocId, Trigram};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

struct OpenSegment {
    reader: SegmentReader,
    /// Raw mmap of the deletion bitmap, header validated at open.
    deletes: Option<Mmap>,
    base_doc_id: DocId,
}

impl OpenSegment {
    #[inline]
    fn is_deleted(&self, local_id: LocalDocId) -> bool {
        match &self.deletes {
            Some(bytes) => is_deleted_raw(bytes, local_id),
            None => false,
        }
    }
}

/// A document reached through a trigram lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocRef {
    pub global_id: DocId,
    pub local_id: LocalDocId,
    pub segment_ord: u32,
}

/// Point-in-time reader over an index directory.
pub struct IndexReader {
    dir: PathBuf,
    meta: IndexMeta,
    segments: Vec<OpenSegment>,
}

impl IndexReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let meta = load_meta(dir)?;
        let segments_dir = dir.join(SEGMENTS_DIR);

        let mut segments = Vec::with_capacity(meta.segments.len());
        let mut base_doc_id: DocId = 0;
        for seg in &meta.segments {
            let reader = SegmentReader::open(&segments_dir.join(seg.seg_file_name()))?;

            let deletes = if seg.has_deletions {
                let del_path = segments_dir.join(seg.del_file_name());
                let file = File::open(&del_path)?;
                let mmap = unsafe { Mmap::map(&file)? };
                DeletionView::parse(&mmap, &del_path)?;
                Some(mmap)
            } else {
                None
            };

            let num_docs = reader.num_docs() as DocId;
            segments.push(OpenSegment {
                reader,
                deletes,
                base_doc_id,
            });
            base_doc_id += num_docs;
        }

        tracing::debug!(
            "reader opened: {} segments, {} live docs",
            segments.len(),
            meta.live_docs()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            meta,
            segments,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Live documents in this snapshot.
    pub fn document_count(&self) -> u64 {
        self.meta.live_docs()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Walk every live document listed under a trigram, in segment order
    /// and ascending global id. Single-pass, forward-only.
    pub fn lookup_trigram(&self, tri: Trigram) -> TrigramDocs<'_> {
        TrigramDocs {
            reader: self,
            tri,
            segment_ord: 0,
            current: None,
        }
    }

    /// Resolve a global id to its owning segment and local id.
    pub fn resolve(&self, global_id: DocId) -> Option<(u32, LocalDocId)> {
        // Linear accumulation in segment order; segment counts are small
        for (ord, seg) in self.segments.iter().enumerate() {
            let num_docs = seg.reader.num_docs() as DocId;
            if global_id < seg.base_doc_id + num_docs {
                return Some((ord as u32, (global_id - seg.base_doc_id) as LocalDocId));
            }
        }
        None
    }

    /// The stored name of a live document, borrowed from the segment map.
    /// O(local id) within the owning segment.
    pub fn name(&self, global_id: DocId) -> Option<&[u8]> {
        let (ord, local_id) = self.resolve(global_id)?;
        let seg = &self.segments[ord as usize];
        if seg.is_deleted(local_id) {
            return None;
        }
        seg.reader.name(local_id)
    }

    /// Per-file trigram positions from every v2 segment, tombstones
    /// filtered. v1 segments contribute nothing.
    pub fn positional_lookup(&self, tri: Trigram) -> Vec<(DocId, Vec<(u32, u32)>)> {
        let mut out = Vec::new();
        for seg in &self.segments {
            let Some(iter) = seg.reader.positional_postings(tri) else {
                continue;
            };
            for (local_id, positions) in iter {
                if seg.is_deleted(local_id) {
                    continue;
                }
                out.push((seg.base_doc_id + local_id as DocId, positions));
            }
        }
        out
    }

    /// Sampled rune-offset map of a document (v2 segments; empty for v1).
    pub fn rune_samples(&self, global_id: DocId) -> Vec<u32> {
        match self.resolve(global_id) {
            Some((ord, local_id)) => self.segments[ord as usize].reader.rune_samples(local_id),
            None => Vec::new(),
        }
    }

    pub(crate) fn segment_readers(
        &self,
    ) -> impl Iterator<Item = (&crate::index::types::SegmentMeta, &SegmentReader)> {
        self.meta
            .segments
            .iter()
            .zip(self.segments.iter().map(|s| &s.reader))
    }
}

/// Multi-segment trigram iterator. Walks segments in meta order, skipping
/// tombstoned ids, emitting ascending global ids.
pub struct TrigramDocs<'a> {
    reader: &'a IndexReader,
    tri: Trigram,
    segment_ord: usize,
    current: Option<Postings<'a>>,
}

impl<'a> Iterator for TrigramDocs<'a> {
    type Item = DocRef;

    fn next(&mut self) -> Option<DocRef> {
        let reader: &'a IndexReader = self.reader;
        loop {
            if self.current.is_none() {
                let seg = reader.segments.get(self.segment_ord)?;
                self.current = Some(seg.reader.postings(self.tri));
            }

            let seg = &reader.segments[self.segment_ord];
            for local_id in self.current.as_mut().unwrap().by_ref() {
                if seg.is_deleted(local_id) {
                    continue;
                }
                return Some(DocRef {
                    global_id: seg.base_doc_id + local_id as DocId,
                    local_id,
                    segment_ord: self.segment_ord as u32,
                });
            }

            self.current = None;
            self.segment_ord += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{IndexConfig, SegmentVersion, trigram};
    use crate::index::writer::IndexWriter;

    fn v1_config() -> IndexConfig {
        IndexConfig {
            segment_version: SegmentVersion::V1,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let reader = IndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.document_count(), 0);
        assert_eq!(reader.segment_count(), 0);
        assert!(reader.lookup_trigram(trigram(b'a', b'b', b'c')).next().is_none());
        assert!(reader.name(0).is_none());
    }

    #[test]
    fn test_multi_segment_global_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path()).unwrap();
        writer.add(b"hello.txt", b"hello").unwrap();
        writer.commit().unwrap();
        writer.add(b"world.txt", b"world").unwrap();
        writer.commit().unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.segment_count(), 2);
        assert_eq!(reader.document_count(), 2);

        let hel: Vec<DocRef> = reader.lookup_trigram(trigram(b'h', b'e', b'l')).collect();
        assert_eq!(hel.len(), 1);
        assert_eq!(hel[0].global_id, 0);
        assert_eq!(hel[0].segment_ord, 0);

        let wor: Vec<DocRef> = reader.lookup_trigram(trigram(b'w', b'o', b'r')).collect();
        assert_eq!(wor.len(), 1);
        // Second segment's base is the first segment's num_docs
        assert_eq!(wor[0].global_id, 1);
        assert_eq!(wor[0].local_id, 0);
        assert_eq!(wor[0].segment_ord, 1);

        assert_eq!(reader.name(0), Some(&b"hello.txt"[..]));
        assert_eq!(reader.name(1), Some(&b"world.txt"[..]));
        assert_eq!(reader.name(2), None);
    }

    #[test]
    fn test_global_ids_count_tombstones() {
        // Deleted docs keep their slot in the global id space
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path()).unwrap();
        writer.add(b"a.txt", b"hello aaa").unwrap();
        writer.add(b"b.txt", b"hello bbb").unwrap();
        writer.add(b"c.txt", b"hello ccc").unwrap();
        writer.commit().unwrap();
        writer.delete(b"b.txt");
        writer.commit().unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.document_count(), 2);
        let ids: Vec<u64> = reader
            .lookup_trigram(trigram(b'h', b'e', b'l'))
            .map(|d| d.global_id)
            .collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(reader.name(1).is_none());
    }

    #[test]
    fn test_snapshot_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path()).unwrap();
        writer.add(b"a.txt", b"hello snapshot").unwrap();
        writer.commit().unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();

        // Writer keeps going; the open reader must not notice
        writer.add(b"b.txt", b"hello again").unwrap();
        writer.delete(b"a.txt");
        writer.commit().unwrap();

        assert_eq!(reader.document_count(), 1);
        let ids: Vec<u64> = reader
            .lookup_trigram(trigram(b'h', b'e', b'l'))
            .map(|d| d.global_id)
            .collect();
        assert_eq!(ids, vec![0]);

        // A fresh reader sees the new state
        let fresh = IndexReader::open(dir.path()).unwrap();
        assert_eq!(fresh.document_count(), 1);
        assert_eq!(fresh.name(1), Some(&b"b.txt"[..]));
    }

    #[test]
    fn test_global_id_stable_within_reader() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path()).unwrap();
        writer.add(b"a.txt", b"stable ids here").unwrap();
        writer.commit().unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();
        let first: Vec<u64> = reader
            .lookup_trigram(trigram(b's', b't', b'a'))
            .map(|d| d.global_id)
            .collect();
        let second: Vec<u64> = reader
            .lookup_trigram(trigram(b'i', b'd', b's'))
            .map(|d| d.global_id)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_v1_segments_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::with_config(dir.path(), v1_config()).unwrap();
        writer.add(b"a.txt", b"plain old postings").unwrap();
        writer.commit().unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();
        let ids: Vec<u64> = reader
            .lookup_trigram(trigram(b'p', b'o', b's'))
            .map(|d| d.global_id)
            .collect();
        assert_eq!(ids, vec![0]);
        // No positional data in v1
        assert!(reader.positional_lookup(trigram(b'p', b'o', b's')).is_empty());
    }

    #[test]
    fn test_positional_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(dir.path()).unwrap();
        writer.add(b"a.txt", b"abc then abc").unwrap();
        writer.commit().unwrap();

        let reader = IndexReader::open(dir.path()).unwrap();
        let hits = reader.positional_lookup(trigram(b'a', b'b', b'c'));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[0].1, vec![(0, 0), (9, 9)]);
    }
}
