//! Folding per-face match decisions into the set of identities present in a clip.

use crate::types::{IdentityId, MatchResult};
use serde::Serialize;
use std::collections::BTreeSet;

/// Deduplicated identities judged present. Attendance is binary presence:
/// no frame index, timing, or distance survives into this set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PresenceSet(BTreeSet<IdentityId>);

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identity: &IdentityId) -> bool {
        self.0.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityId> {
        self.0.iter()
    }

    /// Returns `true` if the identity was not already present.
    pub fn insert(&mut self, identity: IdentityId) -> bool {
        self.0.insert(identity)
    }

    pub fn extend(&mut self, other: PresenceSet) {
        self.0.extend(other.0);
    }
}

impl FromIterator<IdentityId> for PresenceSet {
    fn from_iter<I: IntoIterator<Item = IdentityId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PresenceSet {
    type Item = IdentityId;
    type IntoIter = std::collections::btree_set::IntoIter<IdentityId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Incremental aggregator. Results may be recorded in any order.
#[derive(Debug, Default)]
pub struct PresenceAggregator {
    present: PresenceSet,
    faces_seen: usize,
    faces_matched: usize,
}

impl PresenceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &MatchResult) {
        self.faces_seen += 1;
        if let Some(identity) = result.outcome.identity() {
            self.faces_matched += 1;
            if self.present.insert(identity.clone()) {
                tracing::debug!(identity = %identity, "identity marked present");
            }
        }
    }

    pub fn record_all<'a>(&mut self, results: impl IntoIterator<Item = &'a MatchResult>) {
        for result in results {
            self.record(result);
        }
    }

    pub fn faces_seen(&self) -> usize {
        self.faces_seen
    }

    pub fn faces_matched(&self) -> usize {
        self.faces_matched
    }

    pub fn finish(self) -> PresenceSet {
        self.present
    }
}

/// One-shot aggregation over a complete set of results.
pub fn aggregate<'a>(results: impl IntoIterator<Item = &'a MatchResult>) -> PresenceSet {
    let mut aggregator = PresenceAggregator::new();
    aggregator.record_all(results);
    aggregator.finish()
}
