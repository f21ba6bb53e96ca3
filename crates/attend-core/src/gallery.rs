//! Descriptor gallery: the enrolled (identity, descriptor) pairs for one run.
//!
//! The gallery is read fresh from a [`GallerySource`] at the start of every
//! recognition run and is read-only afterwards.

use crate::types::{DescriptorError, FaceDescriptor, IdentityId};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery source unavailable: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl GalleryError {
    pub fn unavailable(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        GalleryError::Source(err.into())
    }
}

/// One persisted descriptor row as handed over by the enrollment store.
#[derive(Debug, Clone)]
pub struct StoredDescriptor {
    pub identity: IdentityId,
    /// JSON array of numbers.
    pub encoding: String,
}

/// Supplies the persisted descriptors for a recognition run.
pub trait GallerySource {
    fn load_entries(&self) -> Result<Vec<StoredDescriptor>, GalleryError>;
}

/// In-memory source, for callers that already hold their enrollment rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryGallerySource {
    entries: Vec<StoredDescriptor>,
}

impl MemoryGallerySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an already-encoded row.
    pub fn push_encoded(&mut self, identity: impl Into<IdentityId>, encoding: impl Into<String>) {
        self.entries.push(StoredDescriptor {
            identity: identity.into(),
            encoding: encoding.into(),
        });
    }

    /// Add a descriptor, encoding it the same way the store does.
    pub fn push(
        &mut self,
        identity: impl Into<IdentityId>,
        descriptor: &FaceDescriptor,
    ) -> Result<(), DescriptorError> {
        let encoding = descriptor.to_json()?;
        self.push_encoded(identity, encoding);
        Ok(())
    }
}

impl GallerySource for MemoryGallerySource {
    fn load_entries(&self) -> Result<Vec<StoredDescriptor>, GalleryError> {
        Ok(self.entries.clone())
    }
}

/// A stored descriptor that could not be decoded and was left out of the gallery.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedEntry {
    /// Position of the row in the source's load order.
    pub position: usize,
    pub identity: IdentityId,
    pub reason: String,
}

/// Result of loading a gallery: the usable entries plus anything skipped.
#[derive(Debug)]
pub struct GalleryLoad {
    pub gallery: Gallery,
    pub rejected: Vec<RejectedEntry>,
}

/// Index-aligned descriptors and identities.
///
/// All descriptors share one dimension. It is either fixed up front (the
/// extraction model's output length) or taken from the first descriptor pushed.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    descriptors: Vec<FaceDescriptor>,
    identities: Vec<IdentityId>,
    dimension: Option<usize>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty gallery that only accepts descriptors of length `dimension`.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    /// Read every persisted descriptor from `source` and decode it.
    ///
    /// `dimension` is the descriptor length the extraction model produces;
    /// rows of any other length are rejected. With `None`, the most common
    /// length among the decodable rows wins (earliest on a tie).
    ///
    /// A failing source aborts the load. Individual rows that fail to decode
    /// are skipped, logged, and returned in [`GalleryLoad::rejected`].
    pub fn load(
        source: &dyn GallerySource,
        dimension: Option<usize>,
    ) -> Result<GalleryLoad, GalleryError> {
        let entries = source.load_entries()?;
        let load = Self::from_entries(entries, dimension);

        if load.gallery.is_empty() {
            tracing::warn!(
                rejected = load.rejected.len(),
                "gallery is empty; no face can be matched in this run"
            );
        } else {
            tracing::info!(
                descriptors = load.gallery.len(),
                identities = load.gallery.identity_count(),
                dimension = ?load.gallery.dimension(),
                rejected = load.rejected.len(),
                "gallery loaded"
            );
        }

        Ok(load)
    }

    /// Decode already-fetched rows, keeping the source order.
    pub fn from_entries(entries: Vec<StoredDescriptor>, dimension: Option<usize>) -> GalleryLoad {
        let decoded: Vec<(usize, IdentityId, Result<FaceDescriptor, DescriptorError>)> = entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| {
                (position, entry.identity, FaceDescriptor::from_json(&entry.encoding))
            })
            .collect();

        let dimension = dimension.or_else(|| {
            most_common_dimension(decoded.iter().filter_map(|(_, _, d)| d.as_ref().ok()))
        });
        let mut gallery = match dimension {
            Some(dimension) => Gallery::with_dimension(dimension),
            None => Gallery::new(),
        };
        let mut rejected = Vec::new();

        for (position, identity, descriptor) in decoded {
            let pushed = descriptor.and_then(|d| gallery.push(identity.clone(), d));

            if let Err(err) = pushed {
                tracing::warn!(
                    position,
                    identity = %identity,
                    error = %err,
                    "skipping corrupt gallery descriptor"
                );
                rejected.push(RejectedEntry {
                    position,
                    identity,
                    reason: err.to_string(),
                });
            }
        }

        GalleryLoad { gallery, rejected }
    }

    /// Append a descriptor for `identity`.
    pub fn push(
        &mut self,
        identity: IdentityId,
        descriptor: FaceDescriptor,
    ) -> Result<(), DescriptorError> {
        match self.dimension {
            Some(expected) if descriptor.dimension() != expected => {
                return Err(DescriptorError::DimensionMismatch {
                    expected,
                    actual: descriptor.dimension(),
                });
            }
            Some(_) => {}
            None => self.dimension = Some(descriptor.dimension()),
        }
        self.descriptors.push(descriptor);
        self.identities.push(identity);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptor dimension, or `None` for an empty gallery with none fixed.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn descriptors(&self) -> &[FaceDescriptor] {
        &self.descriptors
    }

    pub fn identities(&self) -> &[IdentityId] {
        &self.identities
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityId, &FaceDescriptor)> {
        self.identities.iter().zip(self.descriptors.iter())
    }

    /// Number of distinct identities.
    pub fn identity_count(&self) -> usize {
        let mut ids: Vec<&IdentityId> = self.identities.iter().collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }
}

fn most_common_dimension<'a>(
    descriptors: impl Iterator<Item = &'a FaceDescriptor>,
) -> Option<usize> {
    // (dimension, count) in first-seen order.
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for descriptor in descriptors {
        let dimension = descriptor.dimension();
        match counts.iter_mut().find(|(d, _)| *d == dimension) {
            Some((_, count)) => *count += 1,
            None => counts.push((dimension, 1)),
        }
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(usize, usize)>, (d, n)| match best {
            Some((_, best_n)) if best_n >= n => best,
            _ => Some((d, n)),
        })
        .map(|(d, _)| d)
}
