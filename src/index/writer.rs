//! The incremental index writer.
//!
//! A writer buffers added documents and queued deletions, then publishes
//! them as one atomic commit: a fresh immutable segment file, updated
//! deletion bitmaps for older segments, and finally the meta rename that
//! makes all of it visible. A crash at any earlier point leaves the
//! previous meta, and therefore the previous index, fully intact.
//!
//! Only one writer may own a directory at a time; enforcement is the
//! caller's responsibility.

use crate::error::Result;
use crate::index::deletes::DeletionBitmap;
use crate::index::meta::{SEGMENTS_DIR, load_meta, save_meta};
use crate::index::segment::{SegmentReader, SegmentWriter};
use crate::index::types::{IndexConfig, IndexMeta, LocalDocId, SegmentId, SegmentMeta};
use crate::utils::trigram::extract_unique;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Incremental writer over one index directory.
pub struct IndexWriter {
    dir: PathBuf,
    config: IndexConfig,
    meta: IndexMeta,
    /// path -> (position in meta.segments, local id). The authority for
    /// "does this path already exist" between commits.
    path_index: FxHashMap<Vec<u8>, (u32, LocalDocId)>,
    pending_docs: Vec<(Vec<u8>, Vec<u8>)>,
    /// segment position -> local ids to tombstone at the next commit.
    /// BTreeMap keeps bitmap rewrites in a deterministic order.
    pending_deletes: BTreeMap<u32, Vec<LocalDocId>>,
}

impl IndexWriter {
    pub fn open(dir: &Path) -> Result<Self> {
        Self::with_config(dir, IndexConfig::default())
    }

    pub fn with_config(dir: &Path, config: IndexConfig) -> Result<Self> {
        let meta = load_meta(dir)?;
        let path_index = build_path_index(dir, &meta)?;
        tracing::debug!(
            "writer opened: {} segments, {} live paths",
            meta.segments.len(),
            path_index.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            meta,
            path_index,
            pending_docs: Vec::new(),
            pending_deletes: BTreeMap::new(),
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn pending(&self) -> usize {
        self.pending_docs.len()
    }

    /// Buffer a document for the next commit.
    ///
    /// Returns false when the content fails indexing validation; the
    /// document is skipped, the batch continues, and a later add of the
    /// same path starts fresh. If the path is already live, its current
    /// id is queued for tombstoning. Hitting the flush threshold commits
    /// automatically.
    pub fn add(&mut self, path: &[u8], content: &[u8]) -> Result<bool> {
        if let Err(reason) = extract_unique(content) {
            tracing::debug!(
                "skipping {}: {reason}",
                String::from_utf8_lossy(path)
            );
            return Ok(false);
        }

        if let Some(&(seg_idx, local_id)) = self.path_index.get(path) {
            self.pending_deletes.entry(seg_idx).or_default().push(local_id);
        }

        self.pending_docs.push((path.to_vec(), content.to_vec()));

        if self.pending_docs.len() >= self.config.flush_threshold {
            self.commit()?;
        }
        Ok(true)
    }

    /// Queue a path for deletion. Returns whether the path was known,
    /// either committed or still buffered.
    pub fn delete(&mut self, path: &[u8]) -> bool {
        let mut found = false;

        if let Some((seg_idx, local_id)) = self.path_index.remove(path) {
            self.pending_deletes.entry(seg_idx).or_default().push(local_id);
            found = true;
        }

        // Local ids are assigned at commit, so an uncommitted add can be
        // withdrawn by dropping it from the buffer.
        let before = self.pending_docs.len();
        self.pending_docs.retain(|(p, _)| p != path);
        found |= self.pending_docs.len() != before;

        found
    }

    /// Publish all buffered work. Returns the new opstamp.
    ///
    /// Order matters for crash safety: the segment file and every
    /// deletion bitmap reach disk before the meta that references them.
    pub fn commit(&mut self) -> Result<u64> {
        if !self.pending_docs.is_empty() {
            self.flush_segment()?;
        }

        for (&seg_idx, local_ids) in &self.pending_deletes {
            let seg = &mut self.meta.segments[seg_idx as usize];
            let del_path = self.dir.join(SEGMENTS_DIR).join(seg.del_file_name());
            let mut bitmap = DeletionBitmap::load_or_new(&del_path, seg.num_docs)?;
            for &local_id in local_ids {
                bitmap.mark_deleted(local_id);
            }
            bitmap.write_atomic(&del_path)?;
            seg.del_gen += 1;
            seg.has_deletions = true;
            seg.num_deleted_docs = bitmap.num_deleted();
        }

        self.meta.opstamp += 1;
        save_meta(&self.dir, &self.meta)?;

        self.pending_docs.clear();
        self.pending_deletes.clear();
        tracing::info!(
            "commit {}: {} segments, {} live docs",
            self.meta.opstamp,
            self.meta.segments.len(),
            self.meta.live_docs()
        );
        Ok(self.meta.opstamp)
    }

    /// Write the buffered documents as a new segment and record it in the
    /// in-memory meta (not yet persisted).
    fn flush_segment(&mut self) -> Result<()> {
        let seg_id: SegmentId = Uuid::new_v4();
        let seg_idx = self.meta.segments.len() as u32;

        let mut writer = SegmentWriter::new(self.config.segment_version);
        let mut local_ids: Vec<Option<LocalDocId>> = Vec::with_capacity(self.pending_docs.len());
        for (path, content) in &self.pending_docs {
            match writer.add_document(path, content) {
                Ok(local_id) => local_ids.push(Some(local_id)),
                Err(reason) => {
                    // Validation ran at add(); a rejection here means the
                    // buffer was tampered with. Skip rather than abort.
                    tracing::debug!("skipping {} at flush: {reason}", String::from_utf8_lossy(path));
                    local_ids.push(None);
                }
            }
        }
        let num_docs = writer.num_docs();

        let segments_dir = self.dir.join(SEGMENTS_DIR);
        fs::create_dir_all(&segments_dir)?;
        let mut seg_meta = SegmentMeta::new(seg_id, num_docs);

        let final_path = segments_dir.join(seg_meta.seg_file_name());
        let tmp_path = segments_dir.join(format!("{}.seg.tmp", seg_id.as_simple()));
        writer.write_to(&tmp_path)?;
        fs::rename(&tmp_path, &final_path)?;

        // A path buffered more than once keeps only its last occurrence:
        // earlier duplicates are tombstoned in the segment they were just
        // written to.
        let mut last_for_path: FxHashMap<&[u8], LocalDocId> = FxHashMap::default();
        for ((path, _), local_id) in self.pending_docs.iter().zip(&local_ids) {
            if let Some(local_id) = local_id {
                last_for_path.insert(path.as_slice(), *local_id);
            }
        }
        let mut duplicate_tombstones = Vec::new();
        for ((path, _), local_id) in self.pending_docs.iter().zip(&local_ids) {
            if let Some(local_id) = local_id {
                if last_for_path[path.as_slice()] != *local_id {
                    duplicate_tombstones.push(*local_id);
                }
            }
        }
        if !duplicate_tombstones.is_empty() {
            let del_path = segments_dir.join(seg_meta.del_file_name());
            let mut bitmap = DeletionBitmap::new(num_docs);
            for local_id in duplicate_tombstones {
                bitmap.mark_deleted(local_id);
            }
            bitmap.write_atomic(&del_path)?;
            seg_meta.has_deletions = true;
            seg_meta.del_gen = 1;
            seg_meta.num_deleted_docs = bitmap.num_deleted();
        }

        for (path, local_id) in std::mem::take(&mut self.pending_docs)
            .into_iter()
            .map(|(p, _)| p)
            .zip(local_ids)
        {
            if let Some(local_id) = local_id {
                self.path_index.insert(path, (seg_idx, local_id));
            }
        }

        self.meta.segments.push(seg_meta);
        Ok(())
    }

    /// Merge the named segments into one, dropping tombstones. Buffered
    /// work is committed first. See [`crate::index::compact`].
    pub fn merge(&mut self, ids: &[SegmentId]) -> Result<()> {
        if !self.pending_docs.is_empty() || !self.pending_deletes.is_empty() {
            self.commit()?;
        }
        let new_meta = crate::index::compact::merge_segments(
            &self.dir,
            &self.config,
            &self.meta,
            ids,
        )?;
        self.meta = new_meta;
        self.path_index = build_path_index(&self.dir, &self.meta)?;
        Ok(())
    }
}

/// Rebuild the path index by scanning every segment's name list and
/// skipping tombstoned entries. Later segments win, though a committed
/// index never holds two live entries for one path.
fn build_path_index(
    dir: &Path,
    meta: &IndexMeta,
) -> Result<FxHashMap<Vec<u8>, (u32, LocalDocId)>> {
    let mut path_index = FxHashMap::default();
    let segments_dir = dir.join(SEGMENTS_DIR);

    for (seg_idx, seg) in meta.segments.iter().enumerate() {
        let reader = SegmentReader::open(&segments_dir.join(seg.seg_file_name()))?;
        let bitmap = if seg.has_deletions {
            Some(DeletionBitmap::load(
                &segments_dir.join(seg.del_file_name()),
            )?)
        } else {
            None
        };

        for (local_id, name) in reader.names_iter().enumerate() {
            let local_id = local_id as LocalDocId;
            if bitmap.as_ref().is_some_and(|b| b.is_deleted(local_id)) {
                continue;
            }
            path_index.insert(name.to_vec(), (seg_idx as u32, local_id));
        }
    }

    Ok(path_index)
}
