//! Nearest-neighbour identity matching.

use crate::types::{Descriptor, Identity};

/// Default acceptance threshold, in extractor output units (Facenet L2 distance).
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f32 = 0.8;

/// Best candidate for a query descriptor, within the acceptance threshold.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub identity: &'a Identity,
    /// L2 distance between the query and the matched descriptor.
    pub distance: f32,
}

/// Strategy for finding the enrolled identity closest to a query descriptor.
///
/// Implementations may index the candidate set (e.g. an ANN structure) as long as
/// they return the same answer as a full scan for the accepted candidate.
pub trait Matcher {
    fn best_match<'a>(&self, query: &Descriptor, candidates: &'a [Identity]) -> Option<Match<'a>>;
}

/// Full linear scan by Euclidean distance.
///
/// Candidates whose descriptor dimensionality differs from the query are skipped
/// with a warning (legacy encodings from another extractor model).
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ACCEPTANCE_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn best_match<'a>(&self, query: &Descriptor, candidates: &'a [Identity]) -> Option<Match<'a>> {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, candidate) in candidates.iter().enumerate() {
            let dist = match query.distance(&candidate.descriptor) {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(
                        id = candidate.id,
                        error = %err,
                        "skipping enrolled descriptor with incompatible dimension"
                    );
                    continue;
                }
            };
            tracing::debug!(id = candidate.id, distance = dist, "candidate distance");
            // Strict comparison keeps the first of equally distant candidates.
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < self.threshold => Some(Match {
                identity: &candidates[idx],
                distance: best_dist,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: i64, name: &str, values: &[f32]) -> Identity {
        Identity {
            id,
            name: name.into(),
            descriptor: Descriptor::new(values.to_vec()),
        }
    }

    #[test]
    fn test_empty_candidates_no_match() {
        let query = Descriptor::new(vec![1.0, 0.0]);
        assert!(EuclideanMatcher::default().best_match(&query, &[]).is_none());
    }

    #[test]
    fn test_exact_descriptor_matches() {
        let query = Descriptor::new(vec![0.3, 0.4, 0.5]);
        let gallery = vec![
            identity(1, "decoy", &[5.0, 5.0, 5.0]),
            identity(2, "alice", &[0.3, 0.4, 0.5]),
        ];
        let m = EuclideanMatcher::default().best_match(&query, &gallery).unwrap();
        assert_eq!(m.identity.id, 2);
        assert_eq!(m.distance, 0.0);
    }

    #[test]
    fn test_scans_whole_gallery_for_minimum() {
        // First candidate is within threshold but not the closest.
        let query = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity(1, "near", &[0.5, 0.0]),
            identity(2, "nearer", &[0.1, 0.0]),
            identity(3, "far", &[3.0, 0.0]),
        ];
        let m = EuclideanMatcher::default().best_match(&query, &gallery).unwrap();
        assert_eq!(m.identity.name, "nearer");
        assert!((m.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_all_beyond_threshold_no_match() {
        let query = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity(1, "a", &[1.0, 0.0]),
            identity(2, "b", &[0.0, -2.0]),
        ];
        assert!(EuclideanMatcher::new(0.8).best_match(&query, &gallery).is_none());
    }

    #[test]
    fn test_threshold_is_strict() {
        let query = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![identity(1, "edge", &[0.5, 0.0])];
        assert!(EuclideanMatcher::new(0.5).best_match(&query, &gallery).is_none());
        assert!(EuclideanMatcher::new(0.5001).best_match(&query, &gallery).is_some());
    }

    #[test]
    fn test_mismatched_dimension_skipped() {
        let query = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity(1, "legacy", &[0.0, 0.0, 0.0]),
            identity(2, "current", &[0.2, 0.0]),
        ];
        let m = EuclideanMatcher::default().best_match(&query, &gallery).unwrap();
        assert_eq!(m.identity.id, 2);
    }

    #[test]
    fn test_only_mismatched_candidates_no_match() {
        let query = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![identity(1, "legacy", &[0.0; 4])];
        assert!(EuclideanMatcher::default().best_match(&query, &gallery).is_none());
    }

    #[test]
    fn test_tie_returns_first() {
        let query = Descriptor::new(vec![0.0, 0.0]);
        let gallery = vec![
            identity(1, "first", &[0.3, 0.0]),
            identity(2, "second", &[0.0, 0.3]),
        ];
        let m = EuclideanMatcher::default().best_match(&query, &gallery).unwrap();
        assert_eq!(m.identity.id, 1);
    }
}
