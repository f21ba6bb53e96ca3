//! Enrollment-time encoding of a single still image into a descriptor.

use crate::extractor::{ExtractError, FaceExtractor};
use crate::types::FaceDescriptor;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// Enrollment images are assumed to show one student. When several faces
/// are detected, the face at this position in detection order is used.
/// Detection order is descending confidence, so this is the most confident face.
pub const ENROLLMENT_FACE_INDEX: usize = 0;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("cannot read enrollment image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Descriptor produced for one enrollment image.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub descriptor: FaceDescriptor,
    /// Total faces detected in the image.
    pub faces_detected: usize,
}

impl Enrollment {
    /// More than one face was found, so the chosen face may not be the student.
    pub fn is_ambiguous(&self) -> bool {
        self.faces_detected > 1
    }
}

/// Encode one enrollment image. `Ok(None)` means no face was found.
pub fn encode(
    extractor: &mut dyn FaceExtractor,
    image: &RgbImage,
) -> Result<Option<Enrollment>, EncodeError> {
    let mut faces = extractor.extract_rgb(image)?;
    let faces_detected = faces.len();

    if faces_detected <= ENROLLMENT_FACE_INDEX {
        tracing::warn!("no face detected in enrollment image");
        return Ok(None);
    }
    if faces_detected > 1 {
        tracing::warn!(
            faces = faces_detected,
            "enrollment image contains several faces; using the first detected"
        );
    }

    let chosen = faces.swap_remove(ENROLLMENT_FACE_INDEX);
    tracing::debug!(confidence = chosen.location.confidence, "enrollment face selected");

    Ok(Some(Enrollment {
        descriptor: chosen.descriptor,
        faces_detected,
    }))
}

/// Load an image file (any format the `image` crate decodes) and encode it.
pub fn encode_file(
    extractor: &mut dyn FaceExtractor,
    path: &Path,
) -> Result<Option<Enrollment>, EncodeError> {
    let image = image::open(path)?.to_rgb8();
    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "enrollment image loaded"
    );
    encode(extractor, &image)
}
