//! What a recognition run found, and what it had to skip.

use attend_core::{IdentityId, PresenceSet, RejectedEntry};
use serde::Serialize;

/// Which budget cut the run short.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetLimit {
    Frames { max: usize },
    Time { seconds: f64 },
}

/// A sampled frame that produced no result.
#[derive(Debug, Clone, Serialize)]
pub struct FrameFailure {
    /// Position among sampled frames.
    pub ordinal: usize,
    /// Position in the decoded stream, when known.
    pub source_index: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub present: PresenceSet,
    /// Sampled frames examined, including ones that failed.
    pub frames_sampled: usize,
    pub faces_detected: usize,
    pub faces_matched: usize,
    pub frame_failures: Vec<FrameFailure>,
    /// Gallery rows skipped because their descriptor could not be decoded.
    pub rejected_entries: Vec<RejectedEntry>,
    pub budget_exhausted: Option<BudgetLimit>,
    /// Set when the video could not be opened and was treated as empty.
    pub video_error: Option<String>,
}

impl RunReport {
    pub fn is_present(&self, identity: &IdentityId) -> bool {
        self.present.contains(identity)
    }

    /// The run saw every frame it was asked to.
    pub fn is_complete(&self) -> bool {
        self.budget_exhausted.is_none() && self.video_error.is_none()
    }
}
