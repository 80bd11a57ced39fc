//! Index storage: segments, deletions, meta, and the writer/reader pair.
//!
//! - [`types`] - Core data types (trigrams, ids, meta structures)
//! - [`meta`] - Atomic meta.json persistence
//! - [`segment`] - The immutable v1/v2 segment codec
//! - [`deletes`] - Per-segment deletion bitmaps
//! - [`writer`] - Incremental add/delete/commit writer
//! - [`reader`] - Snapshot reader with multi-segment lookups
//! - [`compact`] - Explicit segment merging
//! - [`stats`] - Structured statistics over a snapshot
//! - [`fields`] - The field-aware index variant
//!
//! ## On-disk layout
//!
//! One index per directory:
//!
//! ```text
//! <root>/
//! ├── meta.json           # atomic commit point
//! └── segments/
//!     ├── <32-hex-id>.seg # immutable segment
//!     └── <32-hex-id>.del # optional deletion bitmap
//! ```

pub mod compact;
pub mod deletes;
pub mod fields;
pub mod meta;
pub mod reader;
pub mod segment;
pub mod stats;
pub mod types;
pub mod writer;

pub use reader::{DocRef, IndexReader};
pub use types::*;
pub use writer::IndexWriter;
