//! # trix - persistent trigram code search
//!
//! trix is a crash-safe, trigram-based substring-and-regex index over a
//! corpus of text files, built for low-latency queries on codebases of
//! millions of lines.
//!
//! ## Architecture
//!
//! - [`index`] - Segment storage: codec, deletions, meta, writer, reader
//! - [`query`] - Trigram extraction from queries, ranking, verification
//! - [`utils`] - Varint/delta encodings and the trigram extractor
//!
//! The index is an append-only set of immutable segments. A writer
//! buffers documents and publishes them with an atomic meta commit;
//! deletions tombstone ids through per-segment bitmaps without touching
//! segment files. Readers memory-map a point-in-time snapshot and stay
//! consistent regardless of concurrent writers.
//!
//! ## Quick start
//!
//! ```no_run
//! use trix::index::{IndexReader, IndexWriter};
//! use trix::query::Searcher;
//! use std::path::Path;
//!
//! # fn main() -> trix::Result<()> {
//! let dir = Path::new("/tmp/my-index");
//! let mut writer = IndexWriter::open(dir)?;
//! writer.add(b"src/main.rs", b"fn main() { println!(\"hello\"); }")?;
//! writer.commit()?;
//!
//! let reader = IndexReader::open(dir)?;
//! let searcher = Searcher::new(&reader)?;
//! for result in searcher.search("hello", 10)? {
//!     println!("{} ({} matches)", result.path, result.match_count);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Query model
//!
//! Queries are literal substrings or regexes. Both reduce to trigram
//! lookups that select candidate files; the candidates are then verified
//! against the actual file contents in parallel, so the index is free to
//! over-approximate. Proximity queries run entirely on the positional
//! postings of v2 segments.

pub mod error;
pub mod index;
pub mod query;
pub mod utils;

pub use error::{Error, ExtractError, Result};
