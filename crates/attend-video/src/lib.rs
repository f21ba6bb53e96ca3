//! attend-video: turns a recorded clip into a sparse sequence of frames.
//!
//! Decoding lives behind [`FrameSource`] so the sampler and everything above
//! it can run against synthetic frames in tests.

pub mod ffmpeg;
pub mod frame;
pub mod sampler;
pub mod source;
#[cfg(any(test, feature = "test-clips"))]
pub mod test_clip;

pub use ffmpeg::{FfmpegSource, VideoMetadata};
pub use frame::{Frame, FrameError};
pub use sampler::{FrameSampler, SampleError, SampledFrame, DEFAULT_FRAME_INTERVAL};
pub use source::{EmptySource, FrameSource, MemorySource};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("cannot open video {path}: {source}")]
    Open {
        path: String,
        source: ffmpeg_next::Error,
    },
    #[error("no video stream in {0}")]
    NoVideoStream(String),
    #[error("decode failed: {0}")]
    Decode(#[from] ffmpeg_next::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}
