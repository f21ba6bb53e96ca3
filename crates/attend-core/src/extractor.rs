//! Per-frame face extraction: detect every face, then describe each one.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_EMBEDDING_DIM};
use crate::types::DetectedFace;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside a model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside a model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("frame buffer has {actual} bytes, expected {expected} for {width}x{height}x3")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("extraction backend failed: {0}")]
    Backend(String),
}

/// Byte order of the three colour channels in a packed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    /// The usual layout of frames coming out of video decoders.
    Bgr,
}

/// Borrowed view of a packed 3-channel frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameRef<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

impl FrameRef<'_> {
    /// Copy into an RGB image, swapping R and B when the frame is BGR.
    pub fn to_rgb(&self) -> Result<RgbImage, ExtractError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(ExtractError::InvalidFrame {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }

        let mut pixels = self.data.to_vec();
        if self.order == ChannelOrder::Bgr {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }

        RgbImage::from_raw(self.width, self.height, pixels).ok_or(ExtractError::InvalidFrame {
            width: self.width,
            height: self.height,
            expected,
            actual: self.data.len(),
        })
    }
}

/// Finds faces in a frame and computes one descriptor per face.
///
/// Implementors only see RGB images. [`FaceExtractor::extract`] normalizes
/// channel order before delegating, so a BGR frame can never reach the model
/// unconverted.
pub trait FaceExtractor: Send {
    /// Faces in detection order.
    fn extract_rgb(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError>;

    /// Length of the descriptors this extractor produces, when fixed by its model.
    fn descriptor_dimension(&self) -> Option<usize> {
        None
    }

    fn extract(&mut self, frame: &FrameRef<'_>) -> Result<Vec<DetectedFace>, ExtractError> {
        let image = frame.to_rgb()?;
        self.extract_rgb(&image)
    }
}

/// SCRFD detection followed by ArcFace description.
pub struct OnnxFaceExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceExtractor {
    pub fn load(detector_model: &Path, recognizer_model: &Path) -> Result<Self, ExtractError> {
        Ok(Self {
            detector: FaceDetector::load(detector_model)?,
            recognizer: FaceRecognizer::load(recognizer_model)?,
        })
    }

    /// Load both models from their standard file names in `dir`.
    pub fn from_model_dir(dir: &Path) -> Result<Self, ExtractError> {
        Self::load(&dir.join(DETECTOR_MODEL_FILE), &dir.join(RECOGNIZER_MODEL_FILE))
    }
}

impl FaceExtractor for OnnxFaceExtractor {
    fn descriptor_dimension(&self) -> Option<usize> {
        Some(ARCFACE_EMBEDDING_DIM)
    }

    fn extract_rgb(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let boxes = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());

        for location in boxes {
            if location.landmarks.is_none() {
                tracing::debug!(
                    confidence = location.confidence,
                    "skipping face without landmarks"
                );
                continue;
            }
            let descriptor = self.recognizer.extract(image, &location)?;
            faces.push(DetectedFace { location, descriptor });
        }

        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, FaceDescriptor};
    use image::Rgb;

    /// Reports the colour of the top-left pixel as a single "face" whose
    /// descriptor is the raw channel values.
    struct PixelProbe;

    impl FaceExtractor for PixelProbe {
        fn extract_rgb(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError> {
            let Rgb([r, g, b]) = *image.get_pixel(0, 0);
            let descriptor = FaceDescriptor::new(vec![r as f64, g as f64, b as f64])
                .map_err(|e| ExtractError::Backend(e.to_string()))?;
            Ok(vec![DetectedFace {
                location: BoundingBox {
                    x: 0.0, y: 0.0, width: 1.0, height: 1.0,
                    confidence: 1.0, landmarks: None,
                },
                descriptor,
            }])
        }
    }

    #[test]
    fn test_bgr_frame_reaches_extractor_as_rgb() {
        // Pure red pixel stored BGR: bytes are [B, G, R].
        let bgr = [0u8, 0, 255, 0, 0, 255];
        let frame = FrameRef { data: &bgr, width: 2, height: 1, order: ChannelOrder::Bgr };
        let faces = PixelProbe.extract(&frame).unwrap();
        assert_eq!(faces[0].descriptor.values(), &[255.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rgb_frame_is_not_swapped() {
        let rgb = [255u8, 0, 0, 255, 0, 0];
        let frame = FrameRef { data: &rgb, width: 2, height: 1, order: ChannelOrder::Rgb };
        let faces = PixelProbe.extract(&frame).unwrap();
        assert_eq!(faces[0].descriptor.values(), &[255.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bgr_and_rgb_views_of_same_scene_agree() {
        let rgb: Vec<u8> = (0..4 * 3 * 3).map(|i| (i * 7 % 256) as u8).collect();
        let bgr: Vec<u8> = rgb.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect();

        let from_rgb = FrameRef { data: &rgb, width: 4, height: 3, order: ChannelOrder::Rgb }
            .to_rgb()
            .unwrap();
        let from_bgr = FrameRef { data: &bgr, width: 4, height: 3, order: ChannelOrder::Bgr }
            .to_rgb()
            .unwrap();
        assert_eq!(from_rgb, from_bgr);
        assert_eq!(from_rgb.as_raw(), &rgb);
    }

    #[test]
    fn test_invalid_frame_length() {
        let data = [0u8; 5];
        let frame = FrameRef { data: &data, width: 2, height: 1, order: ChannelOrder::Rgb };
        assert!(matches!(
            frame.to_rgb(),
            Err(ExtractError::InvalidFrame { expected: 6, actual: 5, .. })
        ));
    }

    #[test]
    fn test_descriptor_dimension_defaults_to_unknown() {
        assert_eq!(PixelProbe.descriptor_dimension(), None);
    }

    #[test]
    fn test_onnx_extractor_missing_models() {
        let dir = std::env::temp_dir().join("attend-core-no-models");
        let err = OnnxFaceExtractor::from_model_dir(&dir).err().unwrap();
        assert!(matches!(err, ExtractError::Detector(DetectorError::ModelNotFound(_))));
    }
}
