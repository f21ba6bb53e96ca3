use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor has no values")]
    Empty,
    #[error("descriptor value at index {index} is not finite")]
    NonFinite { index: usize },
    #[error("descriptor has {actual} dimensions, gallery expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("malformed descriptor encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opaque reference to an enrolled person, owned by the enrollment store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Fixed-length face descriptor (512-dimensional for ArcFace).
///
/// Values are validated finite at construction and never change afterwards.
/// Persisted as a JSON array of numbers; `f64` survives the text round trip
/// exactly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FaceDescriptor {
    values: Vec<f64>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f64>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self { values })
    }

    /// Widen a model output into a descriptor.
    pub fn from_f32(values: &[f32]) -> Result<Self, DescriptorError> {
        Self::new(values.iter().map(|&v| f64::from(v)).collect())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to `other`.
    ///
    /// Descriptors of different dimension are never comparable and report
    /// an infinite distance, so they can never fall within a tolerance.
    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> f64 {
        if self.values.len() != other.values.len() {
            return f64::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Encode as the persisted JSON array form.
    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(&self.values)?)
    }

    /// Decode the persisted JSON array form.
    pub fn from_json(encoded: &str) -> Result<Self, DescriptorError> {
        let values: Vec<f64> = serde_json::from_str(encoded)?;
        Self::new(values)
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// A face found in one frame together with its descriptor.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub location: BoundingBox,
    pub descriptor: FaceDescriptor,
}

/// Decision for a single probe descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        identity: IdentityId,
        distance: f64,
        /// Position of the winning descriptor in the gallery.
        gallery_index: usize,
    },
    NoMatch {
        /// Distance to the closest gallery descriptor, if the gallery had any.
        nearest_distance: Option<f64>,
    },
}

impl MatchOutcome {
    pub fn identity(&self) -> Option<&IdentityId> {
        match self {
            MatchOutcome::Matched { identity, .. } => Some(identity),
            MatchOutcome::NoMatch { .. } => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// A detected face paired with its match decision.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub face: DetectedFace,
    pub outcome: MatchOutcome,
}
