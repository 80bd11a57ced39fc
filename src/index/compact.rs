//! Segment merging.
//!
//! A merge rewrites a set of segments as one fresh segment holding only
//! their live documents, compacting away tombstones. It is never required
//! for correctness and carries no automatic policy; callers decide when
//! to run it. Contents are re-read from the file system at each stored
//! path, so documents whose files have vanished fall out of the merged
//! segment (best-effort, like any other skip).

use crate::error::{Error, Result};
use crate::index::deletes::DeletionBitmap;
use crate::index::meta::{SEGMENTS_DIR, save_meta};
use crate::index::segment::{SegmentReader, SegmentWriter};
use crate::index::types::{IndexConfig, IndexMeta, LocalDocId, SegmentId, SegmentMeta, path_from_bytes};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Merge the named segments, returning the meta that now describes the
/// index. The input meta is not modified; the new meta is already saved
/// when this returns.
pub fn merge_segments(
    dir: &Path,
    config: &IndexConfig,
    meta: &IndexMeta,
    ids: &[SegmentId],
) -> Result<IndexMeta> {
    for id in ids {
        if meta.find_segment(id).is_none() {
            return Err(Error::UnknownSegment(id.as_simple().to_string()));
        }
    }
    if ids.is_empty() {
        return Ok(meta.clone());
    }

    let segments_dir = dir.join(SEGMENTS_DIR);
    let new_id: SegmentId = Uuid::new_v4();
    let mut writer = SegmentWriter::new(config.segment_version);
    let mut skipped = 0usize;

    // Inputs are walked in meta order so surviving docs keep their
    // relative order in the merged segment
    for seg in &meta.segments {
        if !ids.contains(&seg.id) {
            continue;
        }
        let reader = SegmentReader::open(&segments_dir.join(seg.seg_file_name()))?;
        let bitmap = if seg.has_deletions {
            Some(DeletionBitmap::load(&segments_dir.join(seg.del_file_name()))?)
        } else {
            None
        };

        for (local_id, name) in reader.names_iter().enumerate() {
            if bitmap
                .as_ref()
                .is_some_and(|b| b.is_deleted(local_id as LocalDocId))
            {
                continue;
            }
            let content = match fs::read(path_from_bytes(name)) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("merge skipping {}: {e}", String::from_utf8_lossy(name));
                    skipped += 1;
                    continue;
                }
            };
            if writer.add_document(name, &content).is_err() {
                skipped += 1;
            }
        }
    }

    let mut segments: Vec<SegmentMeta> = meta
        .segments
        .iter()
        .filter(|s| !ids.contains(&s.id))
        .cloned()
        .collect();

    let num_docs = writer.num_docs();
    if num_docs > 0 {
        let seg_meta = SegmentMeta::new(new_id, num_docs);
        let tmp_path = segments_dir.join(format!("{}.seg.tmp", new_id.as_simple()));
        writer.write_to(&tmp_path)?;
        fs::rename(&tmp_path, segments_dir.join(seg_meta.seg_file_name()))?;
        segments.push(seg_meta);
    }

    let new_meta = IndexMeta {
        version: meta.version,
        opstamp: meta.opstamp + 1,
        segments,
    };
    save_meta(dir, &new_meta)?;

    // The merged inputs are unreferenced now; removal is best-effort
    for seg in &meta.segments {
        if ids.contains(&seg.id) {
            let _ = fs::remove_file(segments_dir.join(seg.seg_file_name()));
            if seg.has_deletions {
                let _ = fs::remove_file(segments_dir.join(seg.del_file_name()));
            }
        }
    }

    tracing::info!(
        "merged {} segments into {} docs ({} skipped)",
        ids.len(),
        num_docs,
        skipped
    );
    Ok(new_meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::reader::IndexReader;
    use crate::index::types::trigram;
    use crate::index::writer::IndexWriter;
    use std::path::PathBuf;

    /// Write real files under `root` and index them by absolute path.
    fn add_file(writer: &mut IndexWriter, root: &Path, name: &str, content: &str) -> PathBuf {
        let file_path = root.join(name);
        fs::write(&file_path, content).unwrap();
        writer
            .add(file_path.to_string_lossy().as_bytes(), content.as_bytes())
            .unwrap();
        file_path
    }

    #[test]
    fn test_merge_compacts_tombstones() {
        let files = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(index.path()).unwrap();

        let a = add_file(&mut writer, files.path(), "a.txt", "alpha text");
        writer.commit().unwrap();
        add_file(&mut writer, files.path(), "b.txt", "bravo text");
        writer.commit().unwrap();
        writer.delete(a.to_string_lossy().as_bytes());
        writer.commit().unwrap();

        let ids: Vec<SegmentId> = writer.meta().segments.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        writer.merge(&ids).unwrap();

        let meta = writer.meta();
        assert_eq!(meta.segments.len(), 1);
        assert_eq!(meta.segments[0].num_docs, 1);
        assert_eq!(meta.segments[0].num_deleted_docs, 0);

        let reader = IndexReader::open(index.path()).unwrap();
        assert_eq!(reader.document_count(), 1);
        assert!(reader.lookup_trigram(trigram(b'a', b'l', b'p')).next().is_none());
        assert_eq!(
            reader.lookup_trigram(trigram(b'b', b'r', b'a')).count(),
            1
        );
    }

    #[test]
    fn test_merge_drops_old_files() {
        let files = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(index.path()).unwrap();
        add_file(&mut writer, files.path(), "a.txt", "some words here");
        writer.commit().unwrap();

        let old = writer.meta().segments[0].clone();
        writer.merge(&[old.id]).unwrap();

        let segments_dir = index.path().join(SEGMENTS_DIR);
        assert!(!segments_dir.join(old.seg_file_name()).exists());
        assert!(
            segments_dir
                .join(writer.meta().segments[0].seg_file_name())
                .exists()
        );
    }

    #[test]
    fn test_merge_skips_unreadable_paths() {
        let files = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(index.path()).unwrap();

        let a = add_file(&mut writer, files.path(), "a.txt", "keep this doc");
        add_file(&mut writer, files.path(), "b.txt", "lose this doc");
        writer.commit().unwrap();

        // b.txt disappears between commit and merge
        fs::remove_file(files.path().join("b.txt")).unwrap();

        let ids: Vec<SegmentId> = writer.meta().segments.iter().map(|s| s.id).collect();
        writer.merge(&ids).unwrap();

        let reader = IndexReader::open(index.path()).unwrap();
        assert_eq!(reader.document_count(), 1);
        assert_eq!(reader.name(0), Some(a.to_string_lossy().as_bytes()));
    }

    #[test]
    fn test_merge_unknown_segment_errors() {
        let index = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(index.path()).unwrap();
        let err = writer.merge(&[Uuid::new_v4()]).unwrap_err();
        assert!(matches!(err, Error::UnknownSegment(_)));
    }

    #[test]
    fn test_merge_fully_deleted_segment_vanishes() {
        let files = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        let mut writer = IndexWriter::open(index.path()).unwrap();

        let a = add_file(&mut writer, files.path(), "a.txt", "goodbye soon");
        writer.commit().unwrap();
        writer.delete(a.to_string_lossy().as_bytes());
        writer.commit().unwrap();

        let ids: Vec<SegmentId> = writer.meta().segments.iter().map(|s| s.id).collect();
        writer.merge(&ids).unwrap();

        assert!(writer.meta().segments.is_empty());
        let reader = IndexReader::open(index.path()).unwrap();
        assert_eq!(reader.document_count(), 0);
    }
}
