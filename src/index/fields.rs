//! The field-aware index variant.
//!
//! Documents are split into named fields (title, body, ...), each indexed
//! separately: postings are keyed by (trigram, field) so queries can
//! boost fields independently and rank with per-field BM25. The on-disk
//! format extends the v1 segment codec with an interleaved field-name
//! list and the field id carried in every posting record:
//!
//! ```text
//! MAGIC_HEADER  "hound fld 1\n"                          (12 bytes)
//! NAME LIST     (varint len, name bytes) per local id
//! FIELD LIST    (varint len, name bytes) per field id
//! POSTING LISTS per list: 3 bytes trigram, varint field id,
//!               delta+1 ids, 0 terminator
//! POSTING INDEX per entry: 3 bytes trigram, varint field id,
//!               varint doc count, varint offset
//! TRAILER       seven big-endian u64 fields + trailer magic
//! ```
//!
//! Lists and index are ordered by (trigram asc, field id asc); lookup
//! binary-searches the packed 56-bit key `tri << 32 | field_id`. Field
//! contents are not reconstructible from the file system, so field
//! search ranks without a verification pass.
//!
//! Meta and deletion machinery are shared with the main index: the same
//! meta.json schema, the same bitmap files, the same commit ordering.

use crate::error::{Error, ExtractError, Result};
use crate::index::deletes::{DeletionBitmap, DeletionView, is_deleted_raw};
use crate::index::meta::{SEGMENTS_DIR, load_meta, save_meta};
use crate::index::segment::MAGIC_TRAILER;
use crate::index::types::{
    DocId, IndexConfig, IndexMeta, LocalDocId, SegmentId, SegmentMeta, Trigram, trigram_bytes,
};
use crate::query::scorer::idf;
use crate::utils::encoding::{
    PostingCursor, decode_varint, encode_postings, encode_varint, read_u64_be_at,
};
use crate::utils::trigram::{extract_unique, query_trigrams};
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MAGIC_FIELDS: &[u8; 12] = b"hound fld 1\n";

const TRAILER_SIZE: usize = 7 * 8 + MAGIC_TRAILER.len();

/// Field id within one segment. Ids are per-segment; names are the
/// cross-segment identity.
pub type FieldId = u32;

#[inline]
fn packed_key(tri: Trigram, field_id: FieldId) -> u64 {
    ((tri as u64) << 32) | field_id as u64
}

fn fseg_file_name(id: &SegmentId) -> String {
    format!("{}.fseg", id.as_simple())
}

/// Builds one field-aware segment in memory.
pub struct FieldSegmentWriter {
    names: Vec<Vec<u8>>,
    field_names: Vec<String>,
    field_ids: FxHashMap<String, FieldId>,
    postings: FxHashMap<u64, Vec<LocalDocId>>,
}

impl FieldSegmentWriter {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            field_names: Vec::new(),
            field_ids: FxHashMap::default(),
            postings: FxHashMap::default(),
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.names.len() as u32
    }

    fn field_id(&mut self, name: &str) -> FieldId {
        if let Some(&id) = self.field_ids.get(name) {
            return id;
        }
        let id = self.field_names.len() as FieldId;
        self.field_names.push(name.to_string());
        self.field_ids.insert(name.to_string(), id);
        id
    }

    /// Add a document with its fields. Every field is validated before
    /// anything is inserted, so a rejected document leaves no trace.
    pub fn add_document(
        &mut self,
        path: &[u8],
        fields: &[(&str, &[u8])],
    ) -> std::result::Result<LocalDocId, ExtractError> {
        let mut extracted = Vec::with_capacity(fields.len());
        for &(name, content) in fields {
            extracted.push((name, extract_unique(content)?));
        }

        let local_id = self.names.len() as LocalDocId;
        for (name, trigrams) in extracted {
            let field_id = self.field_id(name);
            for tri in trigrams {
                let docs = self.postings.entry(packed_key(tri, field_id)).or_default();
                if docs.last() != Some(&local_id) {
                    docs.push(local_id);
                }
            }
        }
        self.names.push(path.to_vec());
        Ok(local_id)
    }

    /// Write the segment file, fsynced; the caller renames it into place.
    pub fn write_to(&self, path: &Path) -> Result<u32> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(MAGIC_FIELDS)?;
        let mut offset = MAGIC_FIELDS.len() as u64;

        let name_list_offset = offset;
        let mut buf = Vec::new();
        for name in &self.names {
            buf.clear();
            encode_varint(name.len() as u64, &mut buf);
            out.write_all(&buf)?;
            out.write_all(name)?;
            offset += buf.len() as u64 + name.len() as u64;
        }

        let field_list_offset = offset;
        for name in &self.field_names {
            buf.clear();
            encode_varint(name.len() as u64, &mut buf);
            out.write_all(&buf)?;
            out.write_all(name.as_bytes())?;
            offset += buf.len() as u64 + name.len() as u64;
        }

        // (trigram, field) ascending by the packed key
        let postings_offset = offset;
        let mut keys: Vec<u64> = self.postings.keys().copied().collect();
        keys.sort_unstable();

        let mut index_buf = Vec::new();
        for &key in &keys {
            let docs = &self.postings[&key];
            let tri = (key >> 32) as Trigram;
            let field_id = key as u32;
            let list_offset = offset - postings_offset;

            buf.clear();
            buf.extend_from_slice(&trigram_bytes(tri));
            encode_varint(field_id as u64, &mut buf);
            encode_postings(docs, &mut buf);
            out.write_all(&buf)?;
            offset += buf.len() as u64;

            index_buf.extend_from_slice(&trigram_bytes(tri));
            encode_varint(field_id as u64, &mut index_buf);
            encode_varint(docs.len() as u64, &mut index_buf);
            encode_varint(list_offset, &mut index_buf);
        }

        let posting_index_offset = offset;
        out.write_all(&index_buf)?;

        let mut trailer = Vec::with_capacity(TRAILER_SIZE);
        trailer.extend_from_slice(&(self.names.len() as u64).to_be_bytes());
        trailer.extend_from_slice(&name_list_offset.to_be_bytes());
        trailer.extend_from_slice(&field_list_offset.to_be_bytes());
        trailer.extend_from_slice(&(self.field_names.len() as u64).to_be_bytes());
        trailer.extend_from_slice(&postings_offset.to_be_bytes());
        trailer.extend_from_slice(&posting_index_offset.to_be_bytes());
        trailer.extend_from_slice(&(keys.len() as u64).to_be_bytes());
        trailer.extend_from_slice(MAGIC_TRAILER);
        out.write_all(&trailer)?;

        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(self.names.len() as u32)
    }
}

impl Default for FieldSegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

struct FieldIndexEntry {
    key: u64,
    doc_count: u32,
    offset: u64,
}

/// Memory-mapped reader over one field-aware segment.
pub struct FieldSegmentReader {
    mmap: Mmap,
    num_docs: u32,
    name_list_offset: u64,
    name_list_end: u64,
    postings_offset: u64,
    fields: Vec<String>,
    posting_index: Vec<FieldIndexEntry>,
}

impl FieldSegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse(mmap, path)
    }

    fn parse(mmap: Mmap, path: &Path) -> Result<Self> {
        let data = &mmap[..];
        if data.len() < MAGIC_FIELDS.len() + TRAILER_SIZE {
            return Err(Error::FileTooSmall { path: path.to_path_buf() });
        }
        if &data[..12] != MAGIC_FIELDS {
            return Err(Error::InvalidMagic { path: path.to_path_buf() });
        }
        if &data[data.len() - MAGIC_TRAILER.len()..] != MAGIC_TRAILER {
            return Err(Error::InvalidTrailer { path: path.to_path_buf() });
        }

        let trailer_start = data.len() - TRAILER_SIZE;
        let field = |i: usize| read_u64_be_at(data, trailer_start + i * 8);
        let num_docs = field(0) as u32;
        let name_list_offset = field(1);
        let field_list_offset = field(2);
        let field_count = field(3) as usize;
        let postings_offset = field(4);
        let posting_index_offset = field(5);
        let posting_index_count = field(6) as usize;

        let malformed = || Error::InvalidTrailer { path: path.to_path_buf() };
        if postings_offset > posting_index_offset || posting_index_offset > trailer_start as u64 {
            return Err(malformed());
        }

        // Field list
        let mut fields = Vec::with_capacity(field_count);
        let mut pos = field_list_offset as usize;
        let field_end = postings_offset as usize;
        for _ in 0..field_count {
            let (len, read) = decode_varint(data.get(pos..field_end).ok_or_else(malformed)?);
            let start = pos + read;
            let end = start + len as usize;
            let bytes = data.get(start..end).ok_or_else(malformed)?;
            fields.push(String::from_utf8_lossy(bytes).into_owned());
            pos = end;
        }

        // Posting index
        let index_bytes = data
            .get(posting_index_offset as usize..trailer_start)
            .ok_or_else(malformed)?;
        let mut posting_index = Vec::with_capacity(posting_index_count);
        let mut pos = 0usize;
        for _ in 0..posting_index_count {
            let tri_bytes = index_bytes.get(pos..pos + 3).ok_or_else(malformed)?;
            let tri = crate::index::types::trigram(tri_bytes[0], tri_bytes[1], tri_bytes[2]);
            pos += 3;
            let (field_id, read) = decode_varint(&index_bytes[pos..]);
            pos += read;
            let (doc_count, read) = decode_varint(&index_bytes[pos..]);
            pos += read;
            let (offset, read) = decode_varint(&index_bytes[pos..]);
            pos += read;
            posting_index.push(FieldIndexEntry {
                key: packed_key(tri, field_id as u32),
                doc_count: doc_count as u32,
                offset,
            });
            if pos > index_bytes.len() {
                return Err(malformed());
            }
        }

        Ok(Self {
            mmap,
            num_docs,
            name_list_offset,
            name_list_end: field_list_offset,
            postings_offset,
            fields,
            posting_index,
        })
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().position(|f| f == name).map(|i| i as FieldId)
    }

    fn find_entry(&self, tri: Trigram, field_id: FieldId) -> Option<&FieldIndexEntry> {
        let key = packed_key(tri, field_id);
        self.posting_index
            .binary_search_by_key(&key, |e| e.key)
            .ok()
            .map(|i| &self.posting_index[i])
    }

    /// Documents listed under (trigram, field), tombstones included.
    pub fn doc_count_for(&self, tri: Trigram, field_id: FieldId) -> u32 {
        self.find_entry(tri, field_id).map_or(0, |e| e.doc_count)
    }

    /// Walk the posting list of (trigram, field).
    pub fn postings(&self, tri: Trigram, field_id: FieldId) -> PostingCursor<'_> {
        match self.find_entry(tri, field_id) {
            Some(entry) => {
                // Skip the trigram bytes and field id varint
                let start = (self.postings_offset + entry.offset) as usize + 3;
                let buf = self.mmap.get(start..).unwrap_or(&[]);
                let (_, read) = decode_varint(buf);
                PostingCursor::new(&buf[read.min(buf.len())..])
            }
            None => PostingCursor::new(&[]),
        }
    }

    pub fn name(&self, local_id: LocalDocId) -> Option<&[u8]> {
        if local_id >= self.num_docs {
            return None;
        }
        self.names_iter().nth(local_id as usize)
    }

    pub fn names_iter(&self) -> impl Iterator<Item = &[u8]> {
        let data = &self.mmap[..];
        let end = self.name_list_end as usize;
        let mut pos = self.name_list_offset as usize;
        let mut remaining = self.num_docs;
        std::iter::from_fn(move || {
            if remaining == 0 || pos >= end {
                return None;
            }
            let (len, read) = decode_varint(&data[pos..end]);
            let start = pos + read;
            let item_end = start + len as usize;
            if item_end > end {
                return None;
            }
            pos = item_end;
            remaining -= 1;
            Some(&data[start..item_end])
        })
    }
}

/// Incremental writer for a field-aware index directory. Same commit
/// discipline as the main writer: segment files and bitmaps reach disk
/// before the meta rename that publishes them.
pub struct FieldIndexWriter {
    dir: PathBuf,
    config: IndexConfig,
    meta: IndexMeta,
    path_index: FxHashMap<Vec<u8>, (u32, LocalDocId)>,
    pending_docs: Vec<(Vec<u8>, Vec<(String, Vec<u8>)>)>,
    pending_deletes: BTreeMap<u32, Vec<LocalDocId>>,
}

impl FieldIndexWriter {
    pub fn open(dir: &Path) -> Result<Self> {
        Self::with_config(dir, IndexConfig::default())
    }

    pub fn with_config(dir: &Path, config: IndexConfig) -> Result<Self> {
        let meta = load_meta(dir)?;
        let path_index = build_field_path_index(dir, &meta)?;
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

    /// Buffer a fielded document. Returns false when any field fails
    /// indexing validation; the whole document is skipped.
    pub fn add(&mut self, path: &[u8], fields: &[(&str, &[u8])]) -> Result<bool> {
        for &(field, content) in fields {
            if let Err(reason) = extract_unique(content) {
                tracing::debug!(
                    "skipping {} (field {field}): {reason}",
                    String::from_utf8_lossy(path)
                );
                return Ok(false);
            }
        }

        if let Some(&(seg_idx, local_id)) = self.path_index.get(path) {
            self.pending_deletes.entry(seg_idx).or_default().push(local_id);
        }

        self.pending_docs.push((
            path.to_vec(),
            fields
                .iter()
                .map(|&(name, content)| (name.to_string(), content.to_vec()))
                .collect(),
        ));

        if self.pending_docs.len() >= self.config.flush_threshold {
            self.commit()?;
        }
        Ok(true)
    }

    /// Queue a path for deletion; uncommitted adds are withdrawn.
    pub fn delete(&mut self, path: &[u8]) -> bool {
        let mut found = false;
        if let Some((seg_idx, local_id)) = self.path_index.remove(path) {
            self.pending_deletes.entry(seg_idx).or_default().push(local_id);
            found = true;
        }
        let before = self.pending_docs.len();
        self.pending_docs.retain(|(p, _)| p != path);
        found |= self.pending_docs.len() != before;
        found
    }

    /// Publish buffered work; returns the new opstamp.
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
            "field commit {}: {} segments, {} live docs",
            self.meta.opstamp,
            self.meta.segments.len(),
            self.meta.live_docs()
        );
        Ok(self.meta.opstamp)
    }

    fn flush_segment(&mut self) -> Result<()> {
        let seg_id: SegmentId = Uuid::new_v4();
        let seg_idx = self.meta.segments.len() as u32;

        let mut writer = FieldSegmentWriter::new();
        let mut local_ids: Vec<Option<LocalDocId>> = Vec::with_capacity(self.pending_docs.len());
        for (path, fields) in &self.pending_docs {
            let borrowed: Vec<(&str, &[u8])> = fields
                .iter()
                .map(|(name, content)| (name.as_str(), content.as_slice()))
                .collect();
            match writer.add_document(path, &borrowed) {
                Ok(local_id) => local_ids.push(Some(local_id)),
                Err(reason) => {
                    tracing::debug!("skipping {} at flush: {reason}", String::from_utf8_lossy(path));
                    local_ids.push(None);
                }
            }
        }
        let num_docs = writer.num_docs();

        let segments_dir = self.dir.join(SEGMENTS_DIR);
        fs::create_dir_all(&segments_dir)?;
        let mut seg_meta = SegmentMeta::new(seg_id, num_docs);

        let tmp_path = segments_dir.join(format!("{}.fseg.tmp", seg_id.as_simple()));
        writer.write_to(&tmp_path)?;
        fs::rename(&tmp_path, segments_dir.join(fseg_file_name(&seg_id)))?;

        // Last occurrence of a duplicated path wins; earlier ones are
        // tombstoned in the fresh segment
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
}

fn build_field_path_index(
    dir: &Path,
    meta: &IndexMeta,
) -> Result<FxHashMap<Vec<u8>, (u32, LocalDocId)>> {
    let mut path_index = FxHashMap::default();
    let segments_dir = dir.join(SEGMENTS_DIR);

    for (seg_idx, seg) in meta.segments.iter().enumerate() {
        let reader = FieldSegmentReader::open(&segments_dir.join(fseg_file_name(&seg.id)))?;
        let bitmap = if seg.has_deletions {
            Some(DeletionBitmap::load(&segments_dir.join(seg.del_file_name()))?)
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

struct OpenFieldSegment {
    reader: FieldSegmentReader,
    deletes: Option<Mmap>,
    base_doc_id: DocId,
}

impl OpenFieldSegment {
    #[inline]
    fn is_deleted(&self, local_id: LocalDocId) -> bool {
        match &self.deletes {
            Some(bytes) => is_deleted_raw(bytes, local_id),
            None => false,
        }
    }
}

/// Point-in-time reader over a field-aware index directory.
pub struct FieldIndexReader {
    meta: IndexMeta,
    segments: Vec<OpenFieldSegment>,
}

impl FieldIndexReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let meta = load_meta(dir)?;
        let segments_dir = dir.join(SEGMENTS_DIR);

        let mut segments = Vec::with_capacity(meta.segments.len());
        let mut base_doc_id: DocId = 0;
        for seg in &meta.segments {
            let reader = FieldSegmentReader::open(&segments_dir.join(fseg_file_name(&seg.id)))?;
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
            segments.push(OpenFieldSegment {
                reader,
                deletes,
                base_doc_id,
            });
            base_doc_id += num_docs;
        }

        Ok(Self { meta, segments })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn document_count(&self) -> u64 {
        self.meta.live_docs()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Field names present anywhere in the index.
    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .segments
            .iter()
            .flat_map(|s| s.reader.fields().iter().cloned())
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }

    pub fn name(&self, global_id: DocId) -> Option<&[u8]> {
        for seg in &self.segments {
            let num_docs = seg.reader.num_docs() as DocId;
            if global_id < seg.base_doc_id + num_docs {
                let local_id = (global_id - seg.base_doc_id) as LocalDocId;
                if seg.is_deleted(local_id) {
                    return None;
                }
                return seg.reader.name(local_id);
            }
        }
        None
    }

    /// Live global ids under (trigram, field), in ascending order.
    fn live_docs_for(&self, tri: Trigram, field: &str) -> Vec<DocId> {
        let mut out = Vec::new();
        for seg in &self.segments {
            let Some(field_id) = seg.reader.field_id(field) else {
                continue;
            };
            for local_id in seg.reader.postings(tri, field_id) {
                if !seg.is_deleted(local_id) {
                    out.push(seg.base_doc_id + local_id as DocId);
                }
            }
        }
        out
    }
}

/// One ranked field-search hit. No content verification happens here:
/// field contents live only in the index, so the score is the result.
#[derive(Debug, Clone)]
pub struct FieldSearchResult {
    pub doc_id: DocId,
    pub path: String,
    pub score: f32,
}

/// BM25-style search over a field-aware index.
pub struct FieldSearcher<'a> {
    reader: &'a FieldIndexReader,
}

impl<'a> FieldSearcher<'a> {
    pub fn new(reader: &'a FieldIndexReader) -> Self {
        Self { reader }
    }

    /// Score every document matching the query in any boosted field:
    /// per (doc, field), the sum over matched trigrams of
    /// `boost * idf(trigram in field)`, aggregated across fields.
    /// Ties break by doc id ascending.
    pub fn search(
        &self,
        query: &str,
        boosts: &[(&str, f32)],
        max_results: usize,
    ) -> Result<Vec<FieldSearchResult>> {
        let trigrams = query_trigrams(query.as_bytes());
        if trigrams.is_empty() {
            return Ok(Vec::new());
        }

        let known = self.reader.fields();
        for &(field, _) in boosts {
            if !known.iter().any(|f| f == field) {
                return Err(Error::UnknownField(field.to_string()));
            }
        }

        let n = self.reader.document_count();
        let mut scores: FxHashMap<DocId, f32> = FxHashMap::default();
        for &(field, boost) in boosts {
            for &tri in &trigrams {
                let docs = self.reader.live_docs_for(tri, field);
                if docs.is_empty() {
                    continue;
                }
                let weight = boost * idf(n, docs.len() as u64);
                for doc in docs {
                    *scores.entry(doc).or_insert(0.0) += weight;
                }
            }
        }

        let mut ranked: Vec<(DocId, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(max_results);

        Ok(ranked
            .into_iter()
            .filter_map(|(doc_id, score)| {
                let name = self.reader.name(doc_id)?;
                Some(FieldSearchResult {
                    doc_id,
                    path: String::from_utf8_lossy(name).into_owned(),
                    score,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::trigram;

    #[test]
    fn test_segment_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fseg");

        let mut writer = FieldSegmentWriter::new();
        writer
            .add_document(b"a.rs", &[("title", b"alpha file"), ("body", b"fn main() {}")])
            .unwrap();
        writer
            .add_document(b"b.rs", &[("title", b"beta file"), ("body", b"fn beta() {}")])
            .unwrap();
        writer.write_to(&path).unwrap();

        let reader = FieldSegmentReader::open(&path).unwrap();
        assert_eq!(reader.num_docs(), 2);
        assert_eq!(reader.fields(), &["title", "body"]);
        assert_eq!(reader.name(0), Some(&b"a.rs"[..]));
        assert_eq!(reader.name(1), Some(&b"b.rs"[..]));

        let title = reader.field_id("title").unwrap();
        let body = reader.field_id("body").unwrap();

        // "file" appears in both titles
        let fil: Vec<u32> = reader.postings(trigram(b'f', b'i', b'l'), title).collect();
        assert_eq!(fil, vec![0, 1]);
        // "alpha" only in the first title
        let alp: Vec<u32> = reader.postings(trigram(b'a', b'l', b'p'), title).collect();
        assert_eq!(alp, vec![0]);
        // "alpha" never appears in a body
        let alp_body: Vec<u32> = reader.postings(trigram(b'a', b'l', b'p'), body).collect();
        assert!(alp_body.is_empty());

        assert_eq!(reader.doc_count_for(trigram(b'f', b'i', b'l'), title), 2);
        assert_eq!(reader.doc_count_for(trigram(b'z', b'z', b'z'), title), 0);
    }

    #[test]
    fn test_segment_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fseg");
        let mut writer = FieldSegmentWriter::new();
        writer.add_document(b"x", &[("body", b"abc")]).unwrap();
        writer.write_to(&path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..12], MAGIC_FIELDS);
        assert_eq!(&bytes[bytes.len() - 12..], MAGIC_TRAILER);
    }

    #[test]
    fn test_rejected_field_rejects_document() {
        let mut writer = FieldSegmentWriter::new();
        let result = writer.add_document(b"x", &[("good", b"fine text"), ("bad", b"nul\0here")]);
        assert!(result.is_err());
        assert_eq!(writer.num_docs(), 0);
        // Nothing leaked from the good field either
        writer.add_document(b"y", &[("good", b"other words")]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.fseg");
        writer.write_to(&path).unwrap();
        let reader = FieldSegmentReader::open(&path).unwrap();
        let fin: Vec<u32> = reader
            .postings(trigram(b'f', b'i', b'n'), reader.field_id("good").unwrap())
            .collect();
        assert!(fin.is_empty());
    }

    #[test]
    fn test_writer_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FieldIndexWriter::open(dir.path()).unwrap();
        writer
            .add(b"a.rs", &[("title", b"first doc"), ("body", b"hello world")])
            .unwrap();
        writer.commit().unwrap();

        let reader = FieldIndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.document_count(), 1);
        assert_eq!(reader.fields(), vec!["body".to_string(), "title".to_string()]);

        // Replace across writer instances
        let mut writer = FieldIndexWriter::open(dir.path()).unwrap();
        writer
            .add(b"a.rs", &[("title", b"second doc"), ("body", b"hello again")])
            .unwrap();
        writer.commit().unwrap();

        let reader = FieldIndexReader::open(dir.path()).unwrap();
        assert_eq!(reader.document_count(), 1);
        assert_eq!(reader.segment_count(), 2);
    }

    #[test]
    fn test_field_boost_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FieldIndexWriter::open(dir.path()).unwrap();
        writer
            .add(b"in_title.rs", &[("title", b"needle here"), ("body", b"plain text")])
            .unwrap();
        writer
            .add(b"in_body.rs", &[("title", b"plain name"), ("body", b"needle here")])
            .unwrap();
        writer.commit().unwrap();

        let reader = FieldIndexReader::open(dir.path()).unwrap();
        let searcher = FieldSearcher::new(&reader);

        // Title boosted: the title hit must outrank the body hit
        let results = searcher
            .search("needle", &[("title", 3.0), ("body", 1.0)], 10)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "in_title.rs");
        assert!(results[0].score > results[1].score);

        // Body boosted: order flips
        let results = searcher
            .search("needle", &[("title", 1.0), ("body", 3.0)], 10)
            .unwrap();
        assert_eq!(results[0].path, "in_body.rs");
    }

    #[test]
    fn test_unknown_field_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FieldIndexWriter::open(dir.path()).unwrap();
        writer.add(b"a.rs", &[("body", b"some text")]).unwrap();
        writer.commit().unwrap();

        let reader = FieldIndexReader::open(dir.path()).unwrap();
        let searcher = FieldSearcher::new(&reader);
        assert!(matches!(
            searcher.search("some", &[("missing", 1.0)], 10),
            Err(Error::UnknownField(_))
        ));
    }

    #[test]
    fn test_deleted_docs_excluded_from_search() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FieldIndexWriter::open(dir.path()).unwrap();
        writer.add(b"keep.rs", &[("body", b"shared words")]).unwrap();
        writer.add(b"drop.rs", &[("body", b"shared words")]).unwrap();
        writer.commit().unwrap();
        assert!(writer.delete(b"drop.rs"));
        writer.commit().unwrap();

        let reader = FieldIndexReader::open(dir.path()).unwrap();
        let searcher = FieldSearcher::new(&reader);
        let results = searcher.search("shared", &[("body", 1.0)], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "keep.rs");
    }

    #[test]
    fn test_rare_trigram_scores_higher() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FieldIndexWriter::open(dir.path()).unwrap();
        // "common" in every body, "unique" in one
        for i in 0..5u32 {
            let name = format!("doc{i}.rs");
            let body: &[u8] = if i == 0 {
                b"common unique words"
            } else {
                b"common words only"
            };
            writer.add(name.as_bytes(), &[("body", body)]).unwrap();
        }
        writer.commit().unwrap();

        let reader = FieldIndexReader::open(dir.path()).unwrap();
        let searcher = FieldSearcher::new(&reader);

        let rare = searcher.search("unique", &[("body", 1.0)], 10).unwrap();
        let common = searcher.search("common", &[("body", 1.0)], 10).unwrap();
        assert_eq!(rare.len(), 1);
        assert_eq!(common.len(), 5);
        assert!(rare[0].score > common[0].score);
    }

    #[test]
    fn test_ties_break_by_doc_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FieldIndexWriter::open(dir.path()).unwrap();
        writer.add(b"b.rs", &[("body", b"equal words")]).unwrap();
        writer.add(b"a.rs", &[("body", b"equal words")]).unwrap();
        writer.commit().unwrap();

        let reader = FieldIndexReader::open(dir.path()).unwrap();
        let searcher = FieldSearcher::new(&reader);
        let results = searcher.search("equal", &[("body", 1.0)], 10).unwrap();
        // Same score: insertion order (doc id), not path order
        assert_eq!(results[0].path, "b.rs");
        assert_eq!(results[1].path, "a.rs");
        assert_eq!(results[0].score, results[1].score);
    }
}
