//! Shared utilities for the index and query layers.
//!
//! - [`encoding`] - Variable-length integer and delta codecs
//! - [`trigram`] - Trigram extraction and document validation

pub mod encoding;
pub mod trigram;

pub use encoding::*;
pub use trigram::*;
