use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the index and query layers.
///
/// Format errors are fatal at open time: the index is not usable. I/O
/// errors during a commit leave the on-disk state untouched because the
/// meta file has not been renamed yet. Per-document input problems never
/// appear here; they are [`ExtractError`]s and make the writer skip the
/// offending document.
#[derive(Debug, Error)]
pub enum Error {
    /// Segment or bitmap file does not start with the expected magic.
    #[error("invalid magic in {path}")]
    InvalidMagic { path: PathBuf },

    /// Segment trailer is missing or does not end with the trailer magic.
    #[error("invalid trailer in {path}")]
    InvalidTrailer { path: PathBuf },

    /// File is too small to hold the fixed header and trailer.
    #[error("file too small: {path}")]
    FileTooSmall { path: PathBuf },

    /// meta.json exists but cannot be parsed.
    #[error("invalid meta format: {0}")]
    InvalidMetaFormat(String),

    /// A segment id is not 32 hex characters.
    #[error("invalid segment id: {0}")]
    InvalidSegmentId(String),

    /// A segment id named in a merge request is not in the current meta.
    #[error("unknown segment: {0}")]
    UnknownSegment(String),

    /// A regex pattern yielded no trigrams and cannot constrain the
    /// candidate set. Rejected rather than falling back to a full scan.
    #[error("pattern extracts no trigrams and would scan every file: {0}")]
    UnconstrainedPattern(String),

    /// The regex pattern itself failed to compile.
    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// A field name used in a search does not exist in the index.
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-document rejection reasons from the trigram extractor.
///
/// All of these are recoverable at the caller: the document is skipped,
/// never partially indexed, and a subsequent add retries from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("document contains a NUL byte")]
    ContainsNul,

    #[error("document is not well-formed UTF-8")]
    InvalidUtf8,

    #[error("document exceeds the maximum indexable length")]
    FileTooLong,

    #[error("document contains a line over the rune limit")]
    LineTooLong,

    #[error("document exceeds the unique-trigram limit")]
    TooManyTrigrams,
}
