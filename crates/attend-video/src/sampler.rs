//! Fixed-interval frame sampling.

use crate::frame::Frame;
use crate::source::FrameSource;
use crate::VideoError;
use std::iter::FusedIterator;
use std::num::NonZeroUsize;

/// Process one frame out of every this many by default (about one frame per
/// second of 30 fps footage).
pub const DEFAULT_FRAME_INTERVAL: NonZeroUsize = match NonZeroUsize::new(30) {
    Some(n) => n,
    None => unreachable!(),
};

/// A frame selected by the sampler.
#[derive(Debug)]
pub struct SampledFrame {
    /// Position among sampled frames: 0, 1, 2, ...
    pub ordinal: usize,
    pub frame: Frame,
}

impl SampledFrame {
    /// Index of this frame in the underlying stream.
    pub fn source_index(&self) -> usize {
        self.frame.index
    }
}

/// A sampled position whose frame could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("frame {source_index} (sample {ordinal}): {error}")]
pub struct SampleError {
    pub ordinal: usize,
    pub source_index: usize,
    #[source]
    pub error: VideoError,
}

/// Lazily yields frames `0, k, 2k, ...` of a source, where `k` is the interval.
///
/// A stream of `n` frames produces exactly `ceil(n / k)` items. Each item is
/// either the frame or the reason that position could not be decoded.
/// Single pass: the sampler owns its source and cannot be restarted.
pub struct FrameSampler<S> {
    source: S,
    interval: NonZeroUsize,
    position: usize,
    ordinal: usize,
    exhausted: bool,
}

impl<S: FrameSource> FrameSampler<S> {
    pub fn new(source: S, interval: NonZeroUsize) -> Self {
        Self {
            source,
            interval,
            position: 0,
            ordinal: 0,
            exhausted: false,
        }
    }

    pub fn interval(&self) -> NonZeroUsize {
        self.interval
    }

    /// Number of sampled positions yielded so far.
    pub fn sampled(&self) -> usize {
        self.ordinal
    }

    /// Advance the source to the next multiple of the interval.
    fn seek_to_sample(&mut self) -> bool {
        while self.position % self.interval.get() != 0 {
            match self.source.skip_frame() {
                None => return false,
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    tracing::debug!(frame = self.position, error = %e, "failed to skip frame");
                }
            }
            self.position += 1;
        }
        true
    }
}

impl<S: FrameSource> Iterator for FrameSampler<S> {
    type Item = Result<SampledFrame, SampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if !self.seek_to_sample() {
            self.exhausted = true;
            return None;
        }

        let Some(read) = self.source.read_frame() else {
            self.exhausted = true;
            return None;
        };

        let source_index = self.position;
        let ordinal = self.ordinal;
        self.position += 1;
        self.ordinal += 1;

        Some(match read {
            Ok(frame) => Ok(SampledFrame { ordinal, frame }),
            Err(error) => Err(SampleError {
                ordinal,
                source_index,
                error,
            }),
        })
    }
}

impl<S: FrameSource> FusedIterator for FrameSampler<S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameError;
    use crate::source::{EmptySource, MemorySource};
    use attend_core::ChannelOrder;

    fn clip(n: usize) -> MemorySource {
        MemorySource::from_frames(
            (0..n).map(|i| Frame::new(vec![i as u8; 3], 1, 1, ChannelOrder::Rgb, i).unwrap()),
        )
    }

    fn every(k: usize) -> NonZeroUsize {
        NonZeroUsize::new(k).unwrap()
    }

    #[test]
    fn test_samples_multiples_of_interval() {
        let indices: Vec<usize> = FrameSampler::new(clip(95), every(30))
            .map(|s| s.unwrap().source_index())
            .collect();
        assert_eq!(indices, vec![0, 30, 60, 90]);
    }

    #[test]
    fn test_count_is_ceiling_of_length_over_interval() {
        for n in 0..40 {
            for k in 1..12 {
                let count = FrameSampler::new(clip(n), every(k)).count();
                assert_eq!(count, n.div_ceil(k), "n={n} k={k}");
            }
        }
    }

    #[test]
    fn test_interval_one_yields_everything() {
        let ordinals: Vec<usize> = FrameSampler::new(clip(4), every(1))
            .map(|s| s.unwrap().ordinal)
            .collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_short_clip_still_yields_first_frame() {
        let sampled: Vec<_> = FrameSampler::new(clip(3), DEFAULT_FRAME_INTERVAL).collect();
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled[0].as_ref().unwrap().frame.data, vec![0, 0, 0]);
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        assert_eq!(FrameSampler::new(EmptySource, every(5)).count(), 0);
    }

    #[test]
    fn test_decode_error_is_reported_in_place() {
        let mut source = MemorySource::new();
        source.push(Frame::new(vec![0; 3], 1, 1, ChannelOrder::Rgb, 0).unwrap());
        source.push(Frame::new(vec![0; 3], 1, 1, ChannelOrder::Rgb, 1).unwrap());
        source.push_error(VideoError::Frame(FrameError::InvalidLength { expected: 3, actual: 1 }));
        source.push(Frame::new(vec![0; 3], 1, 1, ChannelOrder::Rgb, 3).unwrap());
        source.push(Frame::new(vec![0; 3], 1, 1, ChannelOrder::Rgb, 4).unwrap());

        let items: Vec<_> = FrameSampler::new(source, every(2)).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert_eq!((err.ordinal, err.source_index), (1, 2));
        assert_eq!(items[2].as_ref().unwrap().source_index(), 4);
    }

    #[test]
    fn test_fused_after_end() {
        let mut sampler = FrameSampler::new(clip(1), every(3));
        assert!(sampler.next().is_some());
        assert!(sampler.next().is_none());
        assert!(sampler.next().is_none());
        assert_eq!(sampler.sampled(), 1);
    }
}
