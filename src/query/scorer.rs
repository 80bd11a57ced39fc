//! Candidate ranking and BM25-style trigram scoring.
//!
//! Plain substring and regex queries rank candidates by how many of the
//! query's trigrams each document carries; verification then reorders by
//! real match counts. The field-aware index scores (doc, field) pairs
//! with an inverse-document-frequency sum per matched trigram. There is
//! no document-length normalization: trigram density over code files is
//! flat enough that the idf sum alone ranks usefully, at the cost of
//! non-standard BM25 values.

use crate::index::types::DocId;
use rustc_hash::FxHashMap;

/// Inverse document frequency of a trigram:
/// `ln((N - df + 0.5) / (df + 0.5) + 1)`.
pub fn idf(num_docs: u64, doc_freq: u64) -> f32 {
    let n = num_docs as f32;
    let df = doc_freq as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Order candidates by (trigram hits descending, global id ascending).
/// The result is fully deterministic for a given hit map.
pub fn rank_candidates(hits: FxHashMap<DocId, u32>) -> Vec<(DocId, u32)> {
    let mut ranked: Vec<(DocId, u32)> = hits.into_iter().collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_decreases_with_frequency() {
        let rare = idf(1000, 1);
        let common = idf(1000, 900);
        assert!(rare > common);
        assert!(common > 0.0);
    }

    #[test]
    fn test_idf_universal_trigram_near_floor() {
        // df == N: the +1 keeps the value positive but tiny
        let floor = idf(1000, 1000);
        assert!(floor > 0.0);
        assert!(floor < 0.01);
    }

    #[test]
    fn test_idf_exact_value() {
        // ln((10 - 2 + 0.5)/(2 + 0.5) + 1) = ln(4.4)
        let value = idf(10, 2);
        assert!((value - 4.4f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_rank_candidates_order() {
        let mut hits = FxHashMap::default();
        hits.insert(5u64, 2u32);
        hits.insert(1u64, 3u32);
        hits.insert(9u64, 3u32);
        hits.insert(3u64, 1u32);

        let ranked = rank_candidates(hits);
        assert_eq!(ranked, vec![(1, 3), (9, 3), (5, 2), (3, 1)]);
    }
}
