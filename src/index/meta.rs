//! Atomic persistence of the index meta.
//!
//! The meta file is the commit point of the index: everything it
//! references must be fully on disk before the rename that publishes it.

use crate::error::{Error, Result};
use crate::index::types::IndexMeta;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub const META_FILE: &str = "meta.json";
pub const SEGMENTS_DIR: &str = "segments";

/// Load the meta from an index directory.
///
/// A missing meta file is the empty index. Any other failure means the
/// index is unusable and must not be silently discarded.
pub fn load_meta(dir: &Path) -> Result<IndexMeta> {
    let meta_path = dir.join(META_FILE);

    let bytes = match fs::read(&meta_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(IndexMeta::default());
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes).map_err(|e| Error::InvalidMetaFormat(e.to_string()))
}

/// Write the meta atomically: tmp file, fsync, rename over the old meta,
/// then a best-effort fsync of the containing directory.
pub fn save_meta(dir: &Path, meta: &IndexMeta) -> Result<()> {
    fs::create_dir_all(dir.join(SEGMENTS_DIR))?;

    let meta_path = dir.join(META_FILE);
    let tmp_path = dir.join("meta.json.tmp");

    {
        let mut file = File::create(&tmp_path)?;
        serde_json::to_writer_pretty(&mut file, meta)
            .map_err(|e| Error::InvalidMetaFormat(e.to_string()))?;
        file.flush()?;
        file.sync_all()?;
    }

    // Atomic rename - this commits the transaction
    fs::rename(&tmp_path, &meta_path)?;

    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{META_VERSION, SegmentMeta};
    use uuid::Uuid;

    #[test]
    fn test_missing_meta_is_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let meta = load_meta(dir.path()).unwrap();
        assert_eq!(meta.version, META_VERSION);
        assert_eq!(meta.opstamp, 0);
        assert!(meta.segments.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = IndexMeta::default();
        meta.opstamp = 7;
        meta.segments.push(SegmentMeta::new(Uuid::new_v4(), 42));

        save_meta(dir.path(), &meta).unwrap();
        assert!(dir.path().join(SEGMENTS_DIR).is_dir());
        assert!(!dir.path().join("meta.json.tmp").exists());

        let loaded = load_meta(dir.path()).unwrap();
        assert_eq!(meta, loaded);
    }

    #[test]
    fn test_save_replaces_previous_meta() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = IndexMeta::default();
        save_meta(dir.path(), &meta).unwrap();

        meta.opstamp = 1;
        meta.segments.push(SegmentMeta::new(Uuid::new_v4(), 5));
        save_meta(dir.path(), &meta).unwrap();

        let loaded = load_meta(dir.path()).unwrap();
        assert_eq!(loaded.opstamp, 1);
        assert_eq!(loaded.segments.len(), 1);
    }

    #[test]
    fn test_corrupt_meta_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(META_FILE), b"{not json").unwrap();
        assert!(matches!(
            load_meta(dir.path()),
            Err(Error::InvalidMetaFormat(_))
        ));
    }
}
