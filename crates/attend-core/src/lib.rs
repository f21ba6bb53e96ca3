//! attend-core: face matching core for video attendance.
//!
//! SCRFD detection and ArcFace description run through ONNX Runtime; enrolled
//! descriptors are matched by Euclidean nearest neighbour and folded into the
//! set of students present in a clip.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod extractor;
pub mod gallery;
pub mod matcher;
pub mod presence;
pub mod recognizer;
pub mod types;

pub use encoder::{encode, encode_file, EncodeError, Enrollment, ENROLLMENT_FACE_INDEX};
pub use extractor::{ChannelOrder, ExtractError, FaceExtractor, FrameRef, OnnxFaceExtractor};
pub use gallery::{
    Gallery, GalleryError, GalleryLoad, GallerySource, MemoryGallerySource, RejectedEntry,
    StoredDescriptor,
};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_TOLERANCE};
pub use presence::{aggregate, PresenceAggregator, PresenceSet};
pub use recognizer::ARCFACE_EMBEDDING_DIM;
pub use types::{
    BoundingBox, DescriptorError, DetectedFace, FaceDescriptor, IdentityId, MatchOutcome,
    MatchResult,
};
