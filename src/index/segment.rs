//! The immutable on-disk segment format.
//!
//! Big-endian file layout, v1:
//!
//! ```text
//! MAGIC_HEADER  "hound idx 1\n"                         (12 bytes)
//! NAME LIST     (varint len, name bytes) per local id
//! POSTING LISTS per list: 3 bytes trigram, delta+1 ids, 0 terminator
//! POSTING INDEX per entry: 3 bytes trigram, varint doc count,
//!               varint offset within the postings section
//! TRAILER       six big-endian u64 fields + trailer magic
//! ```
//!
//! v2 ("hound idx 2\n") inserts a rune-offset map section between the
//! name list and the postings, stores byte/rune position pairs inside each
//! posting list, adds a position count to every posting index entry, and
//! extends the trailer with the rune map offset and count.
//!
//! Segments are write-once: after the rename that publishes a `.seg`
//! file, its bytes never change. Readers memory-map the file and parse
//! only the posting index up front.

use crate::error::{Error, ExtractError, Result};
use crate::index::types::{LocalDocId, SegmentVersion, Trigram, trigram_bytes};
use crate::utils::encoding::{
    decode_varint, encode_deltas, encode_postings, encode_varint, read_u64_be_at,
};
use crate::utils::trigram::{TrigramHit, extract};
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MAGIC_V1: &[u8; 12] = b"hound idx 1\n";
pub const MAGIC_V2: &[u8; 12] = b"hound idx 2\n";
pub const MAGIC_TRAILER: &[u8; 12] = b"hound trl 1\n";

/// Rune-offset samples are taken every this many runes.
pub const RUNE_SAMPLE_INTERVAL: u32 = 100;

const TRAILER_FIELDS_V1: usize = 6;
const TRAILER_FIELDS_V2: usize = 8;

const fn trailer_size(version: SegmentVersion) -> usize {
    let fields = match version {
        SegmentVersion::V1 => TRAILER_FIELDS_V1,
        SegmentVersion::V2 => TRAILER_FIELDS_V2,
    };
    fields * 8 + MAGIC_TRAILER.len()
}

/// Accumulated postings for one trigram during a segment build.
struct PostingBuilder {
    docs: Vec<LocalDocId>,
    /// Parallel to `docs`; each entry is the (byte, rune) offsets of every
    /// occurrence in that document. Unused for v1 segments.
    positions: Vec<Vec<(u32, u32)>>,
}

impl PostingBuilder {
    fn new() -> Self {
        Self {
            docs: Vec::new(),
            positions: Vec::new(),
        }
    }
}

/// Builds one immutable segment in memory and writes it out in a single
/// pass. Local ids are assigned densely in insertion order.
pub struct SegmentWriter {
    version: SegmentVersion,
    names: Vec<Vec<u8>>,
    postings: FxHashMap<Trigram, PostingBuilder>,
    rune_maps: Vec<Vec<u32>>,
}

impl SegmentWriter {
    pub fn new(version: SegmentVersion) -> Self {
        Self {
            version,
            names: Vec::new(),
            postings: FxHashMap::default(),
            rune_maps: Vec::new(),
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.names.len() as u32
    }

    /// Add a document. The content is validated and extracted here; a
    /// rejected document leaves the builder untouched so the caller can
    /// skip it without failing the batch.
    pub fn add_document(
        &mut self,
        path: &[u8],
        content: &[u8],
    ) -> std::result::Result<LocalDocId, ExtractError> {
        let hits = extract(content)?;
        let local_id = self.names.len() as LocalDocId;

        match self.version {
            SegmentVersion::V1 => self.add_hits_v1(local_id, &hits),
            SegmentVersion::V2 => {
                self.add_hits_v2(local_id, &hits);
                self.rune_maps.push(sample_rune_offsets(content));
            }
        }

        self.names.push(path.to_vec());
        Ok(local_id)
    }

    fn add_hits_v1(&mut self, local_id: LocalDocId, hits: &[TrigramHit]) {
        for hit in hits {
            let builder = self
                .postings
                .entry(hit.trigram)
                .or_insert_with(PostingBuilder::new);
            if builder.docs.last() != Some(&local_id) {
                builder.docs.push(local_id);
            }
        }
    }

    fn add_hits_v2(&mut self, local_id: LocalDocId, hits: &[TrigramHit]) {
        for hit in hits {
            let builder = self
                .postings
                .entry(hit.trigram)
                .or_insert_with(PostingBuilder::new);
            if builder.docs.last() != Some(&local_id) {
                builder.docs.push(local_id);
                builder.positions.push(Vec::new());
            }
            builder
                .positions
                .last_mut()
                .unwrap()
                .push((hit.byte_offset, hit.rune_offset));
        }
    }

    /// Write the complete segment file to `path`, fsynced. The caller is
    /// responsible for the `.tmp` + rename dance that publishes it.
    pub fn write_to(&self, path: &Path) -> Result<u32> {
        let mut out = BufWriter::new(File::create(path)?);
        let magic = match self.version {
            SegmentVersion::V1 => MAGIC_V1,
            SegmentVersion::V2 => MAGIC_V2,
        };
        out.write_all(magic)?;
        let mut offset = magic.len() as u64;

        // Name list
        let name_list_offset = offset;
        let mut buf = Vec::new();
        for name in &self.names {
            buf.clear();
            encode_varint(name.len() as u64, &mut buf);
            out.write_all(&buf)?;
            out.write_all(name)?;
            offset += buf.len() as u64 + name.len() as u64;
        }

        // Rune-offset maps (v2)
        let rune_map_offset = offset;
        if self.version == SegmentVersion::V2 {
            for samples in &self.rune_maps {
                buf.clear();
                encode_varint(samples.len() as u64, &mut buf);
                encode_deltas(samples, &mut buf);
                out.write_all(&buf)?;
                offset += buf.len() as u64;
            }
        }

        // Posting lists, trigram ascending, with the index built alongside
        let postings_offset = offset;
        let mut trigrams: Vec<Trigram> = self.postings.keys().copied().collect();
        trigrams.sort_unstable();

        let mut index_buf = Vec::new();
        for &tri in &trigrams {
            let builder = &self.postings[&tri];
            let list_offset = offset - postings_offset;

            buf.clear();
            buf.extend_from_slice(&trigram_bytes(tri));
            let mut position_count = 0u64;
            match self.version {
                SegmentVersion::V1 => encode_postings(&builder.docs, &mut buf),
                SegmentVersion::V2 => {
                    let mut prev_doc = 0u32;
                    for (i, &doc) in builder.docs.iter().enumerate() {
                        encode_varint((doc - prev_doc) as u64 + 1, &mut buf);
                        prev_doc = doc;

                        let positions = &builder.positions[i];
                        position_count += positions.len() as u64;
                        encode_varint(positions.len() as u64, &mut buf);
                        let (mut prev_byte, mut prev_rune) = (0u32, 0u32);
                        for &(byte, rune) in positions {
                            encode_varint((byte - prev_byte) as u64, &mut buf);
                            encode_varint((rune - prev_rune) as u64, &mut buf);
                            prev_byte = byte;
                            prev_rune = rune;
                        }
                    }
                    encode_varint(0, &mut buf);
                }
            }
            out.write_all(&buf)?;
            offset += buf.len() as u64;

            index_buf.extend_from_slice(&trigram_bytes(tri));
            encode_varint(builder.docs.len() as u64, &mut index_buf);
            encode_varint(list_offset, &mut index_buf);
            if self.version == SegmentVersion::V2 {
                encode_varint(position_count, &mut index_buf);
            }
        }
        let postings_len = offset - postings_offset;

        // Posting index
        let posting_index_offset = offset;
        out.write_all(&index_buf)?;

        // Trailer
        let mut trailer = Vec::with_capacity(trailer_size(self.version));
        trailer.extend_from_slice(&(self.names.len() as u64).to_be_bytes());
        trailer.extend_from_slice(&name_list_offset.to_be_bytes());
        trailer.extend_from_slice(&postings_offset.to_be_bytes());
        trailer.extend_from_slice(&posting_index_offset.to_be_bytes());
        trailer.extend_from_slice(&(trigrams.len() as u64).to_be_bytes());
        trailer.extend_from_slice(&postings_len.to_be_bytes());
        if self.version == SegmentVersion::V2 {
            trailer.extend_from_slice(&rune_map_offset.to_be_bytes());
            trailer.extend_from_slice(&(self.rune_maps.len() as u64).to_be_bytes());
        }
        trailer.extend_from_slice(MAGIC_TRAILER);
        out.write_all(&trailer)?;

        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(self.names.len() as u32)
    }
}

/// Sample the byte offset of every [`RUNE_SAMPLE_INTERVAL`]-th rune. Rune
/// offsets are implicit in the result: index i holds the byte offset of
/// rune i * 100.
fn sample_rune_offsets(content: &[u8]) -> Vec<u32> {
    let mut samples = Vec::new();
    let mut rune = 0u32;
    for (i, &byte) in content.iter().enumerate() {
        if (0x80..0xC0).contains(&byte) {
            continue;
        }
        if rune % RUNE_SAMPLE_INTERVAL == 0 {
            samples.push(i as u32);
        }
        rune += 1;
    }
    samples
}

/// One parsed posting index entry.
#[derive(Debug, Clone, Copy)]
pub struct PostingIndexEntry {
    pub trigram: Trigram,
    pub doc_count: u32,
    pub offset: u64,
    pub position_count: u64,
}

/// Read-only view of a segment file through a shared memory map.
///
/// All byte slices handed out borrow from the map and live only as long
/// as the reader.
pub struct SegmentReader {
    mmap: Mmap,
    path: PathBuf,
    version: SegmentVersion,
    num_docs: u32,
    name_list_offset: u64,
    name_list_end: u64,
    postings_offset: u64,
    posting_index: Vec<PostingIndexEntry>,
    /// Per-document (offset, sample count) into the rune map section.
    rune_map_ranges: Vec<(u64, u32)>,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse(mmap, path)
    }

    fn parse(mmap: Mmap, path: &Path) -> Result<Self> {
        let data = &mmap[..];
        let too_small = || Error::FileTooSmall { path: path.to_path_buf() };

        if data.len() < MAGIC_V1.len() {
            return Err(too_small());
        }
        let version = if &data[..12] == MAGIC_V1 {
            SegmentVersion::V1
        } else if &data[..12] == MAGIC_V2 {
            SegmentVersion::V2
        } else {
            return Err(Error::InvalidMagic { path: path.to_path_buf() });
        };

        let tsize = trailer_size(version);
        if data.len() < 12 + tsize {
            return Err(too_small());
        }
        let trailer_start = data.len() - tsize;
        if &data[data.len() - MAGIC_TRAILER.len()..] != MAGIC_TRAILER {
            return Err(Error::InvalidTrailer { path: path.to_path_buf() });
        }

        let field = |i: usize| read_u64_be_at(data, trailer_start + i * 8);
        let num_docs = field(0) as u32;
        let name_list_offset = field(1);
        let postings_offset = field(2);
        let posting_index_offset = field(3);
        let posting_index_count = field(4) as usize;
        let _postings_len = field(5);
        let (rune_map_offset, rune_map_count) = match version {
            SegmentVersion::V1 => (postings_offset, 0),
            SegmentVersion::V2 => (field(6), field(7) as usize),
        };

        if posting_index_offset > trailer_start as u64 || postings_offset > posting_index_offset {
            return Err(Error::InvalidTrailer { path: path.to_path_buf() });
        }

        // Parse the posting index into a sorted in-memory table
        let malformed = || Error::InvalidTrailer { path: path.to_path_buf() };
        let index_bytes = data
            .get(posting_index_offset as usize..trailer_start)
            .ok_or_else(malformed)?;
        let mut posting_index = Vec::with_capacity(posting_index_count);
        let mut pos = 0usize;
        for _ in 0..posting_index_count {
            let tri_bytes = index_bytes.get(pos..pos + 3).ok_or_else(malformed)?;
            let tri = crate::index::types::trigram(tri_bytes[0], tri_bytes[1], tri_bytes[2]);
            pos += 3;
            let (doc_count, read) = decode_varint(&index_bytes[pos..]);
            pos += read;
            let (offset, read) = decode_varint(&index_bytes[pos..]);
            pos += read;
            let position_count = if version == SegmentVersion::V2 {
                let (count, read) = decode_varint(&index_bytes[pos..]);
                pos += read;
                count
            } else {
                0
            };
            posting_index.push(PostingIndexEntry {
                trigram: tri,
                doc_count: doc_count as u32,
                offset,
                position_count,
            });
            if pos > index_bytes.len() {
                return Err(malformed());
            }
        }

        // Walk the rune map section once, recording per-document ranges
        let mut rune_map_ranges = Vec::with_capacity(rune_map_count);
        if version == SegmentVersion::V2 {
            let mut pos = rune_map_offset as usize;
            for _ in 0..rune_map_count {
                let (count, read) = decode_varint(data.get(pos..postings_offset as usize).ok_or_else(malformed)?);
                let start = pos + read;
                rune_map_ranges.push((start as u64, count as u32));
                let (_, consumed) =
                    crate::utils::encoding::decode_deltas(&data[start..postings_offset as usize], count as usize);
                pos = start + consumed;
            }
        }

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            version,
            num_docs,
            name_list_offset,
            name_list_end: rune_map_offset,
            postings_offset,
            posting_index,
            rune_map_ranges,
        })
    }

    pub fn version(&self) -> SegmentVersion {
        self.version
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct trigrams in this segment.
    pub fn distinct_trigrams(&self) -> usize {
        self.posting_index.len()
    }

    /// On-disk size of the segment file.
    pub fn size_bytes(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// The name of a local id, borrowed from the map. O(local_id): the
    /// name list is a varint-prefixed scan with no offset table.
    pub fn name(&self, local_id: LocalDocId) -> Option<&[u8]> {
        if local_id >= self.num_docs {
            return None;
        }
        let mut iter = self.names_iter();
        iter.nth(local_id as usize)
    }

    /// All names in local-id order.
    pub fn names_iter(&self) -> NamesIter<'_> {
        NamesIter {
            data: &self.mmap[..],
            pos: self.name_list_offset as usize,
            end: self.name_list_end as usize,
            remaining: self.num_docs,
        }
    }

    fn find_entry(&self, tri: Trigram) -> Option<&PostingIndexEntry> {
        self.posting_index
            .binary_search_by_key(&tri, |e| e.trigram)
            .ok()
            .map(|i| &self.posting_index[i])
    }

    /// Documents that may be listed under a trigram, from the index.
    pub fn doc_count_for(&self, tri: Trigram) -> u32 {
        self.find_entry(tri).map_or(0, |e| e.doc_count)
    }

    /// Iterate the local doc ids of a trigram's posting list. Yields
    /// nothing for an absent trigram; deletion filtering happens above.
    pub fn postings(&self, tri: Trigram) -> Postings<'_> {
        let buf = match self.find_entry(tri) {
            Some(entry) => {
                let start = (self.postings_offset + entry.offset) as usize + 3;
                self.mmap.get(start..).unwrap_or(&[])
            }
            None => &[][..],
        };
        Postings {
            positional: self.version == SegmentVersion::V2,
            buf,
            pos: 0,
            prev: 0,
            done: false,
        }
    }

    /// Iterate (local id, positions) for a trigram in a v2 segment.
    /// Returns None for v1 segments.
    pub fn positional_postings(&self, tri: Trigram) -> Option<PositionalPostings<'_>> {
        if self.version != SegmentVersion::V2 {
            return None;
        }
        let buf = match self.find_entry(tri) {
            Some(entry) => {
                let start = (self.postings_offset + entry.offset) as usize + 3;
                self.mmap.get(start..).unwrap_or(&[])
            }
            None => &[][..],
        };
        Some(PositionalPostings {
            buf,
            pos: 0,
            prev: 0,
            done: false,
        })
    }

    /// The sampled byte offsets of a document's rune map: entry i is the
    /// byte offset of rune i * [`RUNE_SAMPLE_INTERVAL`]. Empty for v1.
    pub fn rune_samples(&self, local_id: LocalDocId) -> Vec<u32> {
        let Some(&(offset, count)) = self.rune_map_ranges.get(local_id as usize) else {
            return Vec::new();
        };
        let end = self.postings_offset as usize;
        let Some(bytes) = self.mmap.get(offset as usize..end) else {
            return Vec::new();
        };
        let (samples, _) = crate::utils::encoding::decode_deltas(bytes, count as usize);
        samples
    }
}

/// Forward name-list iterator.
pub struct NamesIter<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    remaining: u32,
}

impl<'a> Iterator for NamesIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.remaining == 0 || self.pos >= self.end {
            return None;
        }
        let (len, read) = decode_varint(&self.data[self.pos..self.end]);
        let start = self.pos + read;
        let end = start + len as usize;
        if end > self.end {
            return None;
        }
        self.pos = end;
        self.remaining -= 1;
        Some(&self.data[start..end])
    }
}

/// Local-id iterator over one posting list, either version. In v2 lists
/// the positional payload is decoded past but not materialized.
pub struct Postings<'a> {
    positional: bool,
    buf: &'a [u8],
    pos: usize,
    prev: u32,
    done: bool,
}

impl Iterator for Postings<'_> {
    type Item = LocalDocId;

    fn next(&mut self) -> Option<LocalDocId> {
        if self.done || self.pos >= self.buf.len() {
            return None;
        }
        let (value, read) = decode_varint(&self.buf[self.pos..]);
        self.pos += read;
        if value == 0 {
            self.done = true;
            return None;
        }
        let doc = self.prev + (value as u32 - 1);
        self.prev = doc;

        if self.positional {
            let (npos, read) = decode_varint(&self.buf[self.pos..]);
            self.pos += read;
            for _ in 0..npos * 2 {
                let (_, read) = decode_varint(&self.buf[self.pos..]);
                self.pos += read;
            }
        }
        Some(doc)
    }
}

/// (local id, positions) iterator over a v2 posting list.
pub struct PositionalPostings<'a> {
    buf: &'a [u8],
    pos: usize,
    prev: u32,
    done: bool,
}

impl Iterator for PositionalPostings<'_> {
    type Item = (LocalDocId, Vec<(u32, u32)>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.buf.len() {
            return None;
        }
        let (value, read) = decode_varint(&self.buf[self.pos..]);
        self.pos += read;
        if value == 0 {
            self.done = true;
            return None;
        }
        let doc = self.prev + (value as u32 - 1);
        self.prev = doc;

        let (npos, read) = decode_varint(&self.buf[self.pos..]);
        self.pos += read;
        let mut positions = Vec::with_capacity(npos as usize);
        let (mut byte, mut rune) = (0u32, 0u32);
        for _ in 0..npos {
            let (byte_delta, read) = decode_varint(&self.buf[self.pos..]);
            self.pos += read;
            let (rune_delta, read) = decode_varint(&self.buf[self.pos..]);
            self.pos += read;
            byte += byte_delta as u32;
            rune += rune_delta as u32;
            positions.push((byte, rune));
        }
        Some((doc, positions))
    }
}
