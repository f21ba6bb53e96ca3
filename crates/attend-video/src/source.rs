//! Frame sources: anything that yields decoded frames in stream order.

use crate::frame::Frame;
use crate::VideoError;
use std::collections::VecDeque;

/// Ordered, single-pass producer of decoded frames.
///
/// `None` marks the end of the stream. An `Err` affects only the frame it
/// stands for; callers may keep reading afterwards.
pub trait FrameSource {
    fn read_frame(&mut self) -> Option<Result<Frame, VideoError>>;

    /// Advance past one frame without materializing its pixels.
    fn skip_frame(&mut self) -> Option<Result<(), VideoError>> {
        self.read_frame().map(|frame| frame.map(|_| ()))
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Option<Result<Frame, VideoError>> {
        (**self).read_frame()
    }

    fn skip_frame(&mut self) -> Option<Result<(), VideoError>> {
        (**self).skip_frame()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn read_frame(&mut self) -> Option<Result<Frame, VideoError>> {
        (**self).read_frame()
    }

    fn skip_frame(&mut self) -> Option<Result<(), VideoError>> {
        (**self).skip_frame()
    }
}

/// A stream with no frames. Stands in for a video that could not be opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySource;

impl FrameSource for EmptySource {
    fn read_frame(&mut self) -> Option<Result<Frame, VideoError>> {
        None
    }
}

/// Frames held in memory, replayed in insertion order.
#[derive(Debug, Default)]
pub struct MemorySource {
    pending: VecDeque<Result<Frame, VideoError>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            pending: frames.into_iter().map(Ok).collect(),
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.pending.push_back(Ok(frame));
    }

    /// Queue a decode failure in place of a frame.
    pub fn push_error(&mut self, error: VideoError) {
        self.pending.push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for MemorySource {
    fn read_frame(&mut self) -> Option<Result<Frame, VideoError>> {
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameError;
    use attend_core::ChannelOrder;

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0; 3], 1, 1, ChannelOrder::Rgb, index).unwrap()
    }

    #[test]
    fn test_empty_source() {
        let mut source = EmptySource;
        assert!(source.read_frame().is_none());
        assert!(source.skip_frame().is_none());
    }

    #[test]
    fn test_memory_source_replays_in_order() {
        let mut source = MemorySource::from_frames((0..3).map(frame));
        assert_eq!(source.remaining(), 3);
        assert_eq!(source.read_frame().unwrap().unwrap().index, 0);
        assert!(source.skip_frame().unwrap().is_ok());
        assert_eq!(source.read_frame().unwrap().unwrap().index, 2);
        assert!(source.read_frame().is_none());
    }

    #[test]
    fn test_errors_do_not_end_the_stream() {
        let mut source = MemorySource::new();
        source.push_error(VideoError::Frame(FrameError::InvalidLength { expected: 3, actual: 0 }));
        source.push(frame(1));
        assert!(source.read_frame().unwrap().is_err());
        assert!(source.read_frame().unwrap().is_ok());
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut boxed: Box<dyn FrameSource> = Box::new(MemorySource::from_frames([frame(0)]));
        assert!(boxed.read_frame().is_some());
        assert!(boxed.read_frame().is_none());
    }
}
