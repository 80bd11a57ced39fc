//! Query execution over an index snapshot.
//!
//! ```text
//! query ──> trigram extraction ──> candidate ranking ──> verification ──> snippets
//! ```
//!
//! - [`executor`] - The [`Searcher`]: literal, regex, and proximity queries
//! - [`regex`] - Literal-run extraction from regex patterns
//! - [`scorer`] - Candidate ranking and BM25-style idf
//! - [`snippet`] - Line-oriented snippet assembly

pub mod executor;
pub mod regex;
pub mod scorer;
pub mod snippet;

pub use executor::{SearchResult, Searcher};
pub use snippet::{Snippet, SnippetLine};
