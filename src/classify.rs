//! Similarity-to-classification mapping.
//!
//! Takes the nearest-neighbor list for an issue and produces the three-way
//! classification (new / related / duplicate), a criticality label, reuse
//! advice, and the surfaced similar-issue list. Pure: all inputs come from
//! the vector index, nothing here performs I/O.

use crate::index::Neighbor;
use crate::models::{Classification, Criticality, ReuseAdvice, SimilarIssue};

/// Best-neighbor similarity at or above this is a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;
/// Best-neighbor similarity at or above this (but below duplicate) is related.
pub const RELATED_THRESHOLD: f64 = 0.70;
/// Neighbors below this similarity are not surfaced at all. Looser than the
/// classification thresholds on purpose: "related but not classified" issues
/// are still useful context.
pub const SURFACE_THRESHOLD: f64 = 0.5;
/// Surfaced similar-issue list cap.
pub const MAX_SURFACED: usize = 5;

const DIRECT_REUSE_THRESHOLD: f64 = 0.9;
const ADAPT_REUSE_THRESHOLD: f64 = 0.8;

/// Full verdict for one issue's neighbor query.
#[derive(Debug, Clone)]
pub struct SimilarityVerdict {
    pub classification: Classification,
    pub criticality: Criticality,
    /// Best-neighbor similarity rounded to 2 decimals; 0.0 when the
    /// collection held nothing to compare against.
    pub confidence: f64,
    pub reuse: ReuseAdvice,
    pub similar_issues: Vec<SimilarIssue>,
    pub max_similarity: f64,
}

/// Classify a best-neighbor similarity value.
pub fn classify_similarity(max_similarity: f64) -> Classification {
    if max_similarity >= DUPLICATE_THRESHOLD {
        Classification::Duplicate
    } else if max_similarity >= RELATED_THRESHOLD {
        Classification::Related
    } else {
        Classification::New
    }
}

/// Criticality tier for a best-neighbor similarity value.
pub fn criticality_for(max_similarity: f64) -> Criticality {
    if max_similarity >= DUPLICATE_THRESHOLD {
        Criticality::High
    } else if max_similarity >= RELATED_THRESHOLD {
        Criticality::Medium
    } else {
        Criticality::Low
    }
}

/// How much of the best neighbor's solution is expected to carry over.
pub fn reuse_for(max_similarity: f64) -> ReuseAdvice {
    if max_similarity >= DIRECT_REUSE_THRESHOLD {
        ReuseAdvice::Direct
    } else if max_similarity >= ADAPT_REUSE_THRESHOLD {
        ReuseAdvice::Adapt
    } else if max_similarity >= RELATED_THRESHOLD {
        ReuseAdvice::Reference
    } else {
        ReuseAdvice::Minimal
    }
}

/// Evaluate a neighbor list for the issue `(number, title)`.
///
/// Self-matches are excluded two ways: by issue number, and by exact title.
/// The title rule matters because an issue may be analyzed before (or right
/// after) its own entry is upserted, in which case the freshest index entry
/// for it is a perfect-similarity ghost.
///
/// `collection_size` is the total entry count of the repository's
/// collection; with one entry or fewer there is nothing to compare against
/// and the verdict is the defined no-neighbor result, not an error.
pub fn evaluate_neighbors(
    number: i64,
    title: &str,
    neighbors: &[Neighbor],
    collection_size: u64,
) -> SimilarityVerdict {
    if collection_size <= 1 {
        return SimilarityVerdict {
            classification: Classification::New,
            criticality: Criticality::Low,
            confidence: 0.0,
            reuse: ReuseAdvice::Minimal,
            similar_issues: Vec::new(),
            max_similarity: 0.0,
        };
    }

    let mut others: Vec<&Neighbor> = neighbors
        .iter()
        .filter(|n| n.meta.number != number && n.meta.title != title)
        .collect();
    others.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let max_similarity = others.first().map(|n| n.similarity).unwrap_or(0.0);

    let similar_issues: Vec<SimilarIssue> = others
        .iter()
        .filter(|n| n.similarity >= SURFACE_THRESHOLD)
        .take(MAX_SURFACED)
        .map(|n| SimilarIssue {
            number: n.meta.number,
            title: n.meta.title.clone(),
            similarity: round3(n.similarity),
        })
        .collect();

    SimilarityVerdict {
        classification: classify_similarity(max_similarity),
        criticality: criticality_for(max_similarity),
        confidence: round2(max_similarity),
        reuse: reuse_for(max_similarity),
        similar_issues,
        max_similarity,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::EntryMeta;

    fn neighbor(number: i64, title: &str, similarity: f64) -> Neighbor {
        Neighbor {
            similarity,
            meta: EntryMeta {
                number,
                title: title.to_string(),
                category: "bug".to_string(),
                state: "open".to_string(),
            },
        }
    }

    #[test]
    fn test_threshold_boundaries_exact() {
        assert_eq!(classify_similarity(0.69), Classification::New);
        assert_eq!(classify_similarity(0.70), Classification::Related);
        assert_eq!(classify_similarity(0.849), Classification::Related);
        assert_eq!(classify_similarity(0.85), Classification::Duplicate);
    }

    #[test]
    fn test_classification_is_monotonic() {
        let samples = [
            0.0, 0.3, 0.5, 0.69, 0.699, 0.70, 0.701, 0.8, 0.849, 0.8499, 0.85, 0.851, 0.9, 1.0,
        ];
        for pair in samples.windows(2) {
            let lower = classify_similarity(pair[0]);
            let higher = classify_similarity(pair[1]);
            assert!(
                lower <= higher,
                "classification inverted between {} and {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_criticality_tracks_classification() {
        assert_eq!(criticality_for(0.5), Criticality::Low);
        assert_eq!(criticality_for(0.70), Criticality::Medium);
        assert_eq!(criticality_for(0.85), Criticality::High);
    }

    #[test]
    fn test_reuse_tiers() {
        assert_eq!(reuse_for(0.95), ReuseAdvice::Direct);
        assert_eq!(reuse_for(0.85), ReuseAdvice::Adapt);
        assert_eq!(reuse_for(0.75), ReuseAdvice::Reference);
        assert_eq!(reuse_for(0.5), ReuseAdvice::Minimal);
    }

    #[test]
    fn test_self_excluded_by_number() {
        let neighbors = vec![neighbor(7, "indexed under my own number", 1.0)];
        let verdict = evaluate_neighbors(7, "different title", &neighbors, 2);
        assert_eq!(verdict.classification, Classification::New);
        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.similar_issues.is_empty());
    }

    #[test]
    fn test_self_excluded_by_exact_title() {
        // Analyzed before its own upsert: same title under a different id.
        let neighbors = vec![neighbor(99, "App crashes on login", 1.0)];
        let verdict = evaluate_neighbors(7, "App crashes on login", &neighbors, 2);
        assert_eq!(verdict.classification, Classification::New);
        assert!(verdict.similar_issues.is_empty());
    }

    #[test]
    fn test_empty_collection_yields_defined_verdict() {
        let verdict = evaluate_neighbors(1, "anything", &[], 0);
        assert_eq!(verdict.classification, Classification::New);
        assert_eq!(verdict.criticality, Criticality::Low);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn test_single_entry_collection_yields_zero_confidence() {
        // The only entry is the issue itself.
        let neighbors = vec![neighbor(1, "self", 1.0)];
        let verdict = evaluate_neighbors(1, "self", &neighbors, 1);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.classification, Classification::New);
    }

    #[test]
    fn test_duplicate_verdict_with_neighbors() {
        let neighbors = vec![
            neighbor(1, "self", 1.0),
            neighbor(2, "near duplicate", 0.91),
            neighbor(3, "vaguely similar", 0.55),
        ];
        let verdict = evaluate_neighbors(1, "self", &neighbors, 3);
        assert_eq!(verdict.classification, Classification::Duplicate);
        assert_eq!(verdict.criticality, Criticality::High);
        assert_eq!(verdict.reuse, ReuseAdvice::Direct);
        assert_eq!(verdict.confidence, 0.91);
        assert_eq!(verdict.similar_issues.len(), 2);
        assert_eq!(verdict.similar_issues[0].number, 2);
    }

    #[test]
    fn test_surfacing_threshold_and_cap() {
        let mut neighbors = vec![neighbor(100, "below surface", 0.49)];
        for i in 0..8 {
            neighbors.push(neighbor(i, &format!("surfaced {i}"), 0.6 + (i as f64) * 0.01));
        }
        let verdict = evaluate_neighbors(999, "query", &neighbors, 10);
        assert_eq!(verdict.similar_issues.len(), MAX_SURFACED);
        assert!(verdict
            .similar_issues
            .iter()
            .all(|s| s.similarity >= SURFACE_THRESHOLD));
        // Sorted descending.
        for pair in verdict.similar_issues.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn test_confidence_rounding() {
        let neighbors = vec![neighbor(2, "other", 0.8449)];
        let verdict = evaluate_neighbors(1, "query", &neighbors, 2);
        assert_eq!(verdict.confidence, 0.84);
        assert_eq!(verdict.similar_issues[0].similarity, 0.845);
    }
}
