//! Query execution: candidate selection, parallel verification, results.
//!
//! The trigram index over-approximates: it names files that contain every
//! piece of the query, not files that contain the query. Verification
//! reads each candidate file back and is the source of truth; a candidate
//! whose file cannot be read is dropped silently.

use crate::error::{Error, Result};
use crate::index::reader::IndexReader;
use crate::index::types::{DocId, IndexConfig, Trigram, path_from_bytes};
use crate::query::regex::pattern_trigrams;
use crate::query::scorer::rank_candidates;
use crate::query::snippet::{Snippet, build_snippets};
use crate::utils::trigram::query_trigrams;
use memchr::memmem;
use memmap2::Mmap;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

/// One verified search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Global id, valid for the reader this searcher wraps.
    pub doc_id: DocId,
    pub path: String,
    /// Verified match count (content matches, plus one for a path match).
    pub match_count: u32,
    pub score: f32,
    pub snippets: Vec<Snippet>,
}

/// Executes literal, regex, and proximity queries against one reader
/// snapshot. Verification runs on a dedicated bounded thread pool.
pub struct Searcher<'a> {
    reader: &'a IndexReader,
    config: IndexConfig,
    pool: rayon::ThreadPool,
}

impl<'a> Searcher<'a> {
    pub fn new(reader: &'a IndexReader) -> Result<Self> {
        Self::with_config(reader, IndexConfig::default())
    }

    pub fn with_config(reader: &'a IndexReader, config: IndexConfig) -> Result<Self> {
        let threads = config.verify_threads.unwrap_or_else(default_verify_threads);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Io(io::Error::other(e)))?;
        Ok(Self {
            reader,
            config,
            pool,
        })
    }

    /// Literal substring search.
    ///
    /// The query's trigrams select and rank candidates; a byte-level
    /// substring scan of each candidate file (or its path) decides
    /// membership. Queries under three bytes, or failing document
    /// validation, match nothing.
    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let trigrams = query_trigrams(query.as_bytes());
        if trigrams.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self.collect_candidates(&trigrams, false);
        Ok(self.verify(&candidates, max_results, &Matcher::Literal(query.as_bytes())))
    }

    /// Regex search.
    ///
    /// Literal runs of the pattern provide the mandatory trigram filter:
    /// a candidate must carry every extracted trigram. A pattern that
    /// extracts none cannot constrain the index and is rejected rather
    /// than scanning every file.
    pub fn search_regex(&self, pattern: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let trigrams = pattern_trigrams(pattern);
        if trigrams.is_empty() {
            return Err(Error::UnconstrainedPattern(pattern.to_string()));
        }
        let regex = regex::bytes::Regex::new(pattern)?;
        let candidates = self.collect_candidates(&trigrams, true);
        Ok(self.verify(&candidates, max_results, &Matcher::Regex(&regex)))
    }

    /// Files containing both trigrams with some pair of occurrences at
    /// most `max_distance` runes apart. Ascending global ids.
    pub fn proximity(&self, a: Trigram, b: Trigram, max_distance: u32) -> Vec<DocId> {
        let docs_a = self.reader.positional_lookup(a);
        let docs_b = self.reader.positional_lookup(b);

        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < docs_a.len() && j < docs_b.len() {
            match docs_a[i].0.cmp(&docs_b[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    if within_rune_distance(&docs_a[i].1, &docs_b[j].1, max_distance) {
                        out.push(docs_a[i].0);
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        out
    }

    /// Per-doc count of how many query trigrams appear, optionally
    /// keeping only docs that carry all of them, ranked for verification.
    fn collect_candidates(&self, trigrams: &[Trigram], require_all: bool) -> Vec<(DocId, u32)> {
        let mut hits: FxHashMap<DocId, u32> = FxHashMap::default();
        for &tri in trigrams {
            for doc in self.reader.lookup_trigram(tri) {
                *hits.entry(doc.global_id).or_insert(0) += 1;
            }
        }
        if require_all {
            let needed = trigrams.len() as u32;
            hits.retain(|_, count| *count == needed);
        }
        rank_candidates(hits)
    }

    /// Verify the top candidates in parallel over disjoint slices and
    /// order the survivors by (match count desc, global id asc).
    fn verify(
        &self,
        candidates: &[(DocId, u32)],
        max_results: usize,
        matcher: &Matcher<'_>,
    ) -> Vec<SearchResult> {
        let limit = candidates
            .len()
            .min(self.config.verify_candidates_factor.saturating_mul(max_results));
        let slice = &candidates[..limit];

        let verified: Vec<Option<SearchResult>> = self.pool.install(|| {
            slice
                .par_iter()
                .map(|&(doc_id, _)| self.verify_candidate(doc_id, matcher))
                .collect()
        });

        let mut results: Vec<SearchResult> = verified.into_iter().flatten().collect();
        results.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        results.truncate(max_results);
        results
    }

    fn verify_candidate(&self, doc_id: DocId, matcher: &Matcher<'_>) -> Option<SearchResult> {
        let name = self.reader.name(doc_id)?;
        let path_span = matcher.path_span(name);

        let content = match read_file(&path_from_bytes(name)) {
            Ok(content) => content,
            Err(_) => return None,
        };
        let spans = matcher.find_spans(&content);
        if spans.is_empty() && path_span.is_none() {
            return None;
        }

        let path = String::from_utf8_lossy(name).into_owned();
        let mut snippets = Vec::new();
        if let Some((start, end)) = path_span {
            snippets.push(Snippet::for_path(&path, (start as u32, end as u32)));
        }
        snippets.extend(build_snippets(
            &content,
            &spans,
            self.config.context_lines,
            self.config.max_snippets_per_file.saturating_sub(snippets.len()),
        ));

        let match_count = spans.len() as u32 + u32::from(path_span.is_some());
        Some(SearchResult {
            doc_id,
            path,
            match_count,
            score: match_count as f32,
            snippets,
        })
    }
}

fn default_verify_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(16)
}

/// The verification predicate: a byte-level substring scan or a compiled
/// regex run over the file contents.
enum Matcher<'q> {
    Literal(&'q [u8]),
    Regex(&'q regex::bytes::Regex),
}

impl Matcher<'_> {
    fn find_spans(&self, content: &[u8]) -> Vec<(usize, usize)> {
        match self {
            Matcher::Literal(needle) => memmem::find_iter(content, needle)
                .map(|start| (start, start + needle.len()))
                .collect(),
            Matcher::Regex(regex) => regex
                .find_iter(content)
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }

    /// The path self-match special case applies to literal queries only.
    fn path_span(&self, name: &[u8]) -> Option<(usize, usize)> {
        match self {
            Matcher::Literal(needle) => {
                memmem::find(name, needle).map(|start| (start, start + needle.len()))
            }
            Matcher::Regex(_) => None,
        }
    }
}

/// Candidate file contents: mapped when the platform allows, read into
/// memory otherwise. Sources are never written through the map.
enum FileBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(mmap) => mmap,
            FileBytes::Owned(bytes) => bytes,
        }
    }
}

fn read_file(path: &Path) -> io::Result<FileBytes> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(FileBytes::Owned(Vec::new()));
    }
    match unsafe { Mmap::map(&file) } {
        Ok(mmap) => Ok(FileBytes::Mapped(mmap)),
        Err(_) => Ok(FileBytes::Owned(std::fs::read(path)?)),
    }
}

/// Any pair of occurrences within `max` runes? Both position lists are
/// ascending, so a single merge scan suffices.
fn within_rune_distance(a: &[(u32, u32)], b: &[(u32, u32)], max: u32) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let ra = a[i].1;
        let rb = b[j].1;
        if ra.abs_diff(rb) <= max {
            return true;
        }
        if ra < rb {
            i += 1;
        } else {
            j += 1;
        }
    }
    false
}
