//! Nearest-neighbour matching of probe descriptors against the gallery.

use crate::gallery::Gallery;
use crate::types::{DetectedFace, FaceDescriptor, MatchOutcome, MatchResult};

/// Default Euclidean tolerance for a positive match.
pub const DEFAULT_TOLERANCE: f64 = 0.5;

/// Strategy for deciding which enrolled identity, if any, a probe belongs to.
pub trait Matcher: Send + Sync {
    fn compare(&self, probe: &FaceDescriptor, gallery: &Gallery) -> MatchOutcome;

    /// Pair a detected face with its decision.
    fn match_face(&self, face: DetectedFace, gallery: &Gallery) -> MatchResult {
        let outcome = self.compare(&face.descriptor, gallery);
        MatchResult { face, outcome }
    }
}

/// Euclidean nearest-neighbour matcher.
///
/// The globally closest gallery descriptor wins; it is accepted only when its
/// distance is within tolerance. A closer out-of-tolerance entry is never
/// passed over for a farther in-tolerance one. Equal distances resolve to the
/// lowest gallery index.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    tolerance: f64,
}

impl EuclideanMatcher {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &FaceDescriptor, gallery: &Gallery) -> MatchOutcome {
        let mut best: Option<(usize, f64)> = None;

        for (i, candidate) in gallery.descriptors().iter().enumerate() {
            let distance = probe.euclidean_distance(candidate);
            // Strict comparison keeps the first-seen entry on ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) if distance <= self.tolerance => MatchOutcome::Matched {
                identity: gallery.identities()[idx].clone(),
                distance,
                gallery_index: idx,
            },
            _ => MatchOutcome::NoMatch {
                nearest_distance: best.map(|(_, d)| d).filter(|d| d.is_finite()),
            },
        }
    }
}
