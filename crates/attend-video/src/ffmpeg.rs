//! Video file decoding via ffmpeg-next (libavformat + libavcodec).

use crate::frame::{pack_rows, Frame};
use crate::source::FrameSource;
use crate::VideoError;
use attend_core::ChannelOrder;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, frame, media, software::scaling};
use std::path::{Path, PathBuf};

const OUTPUT_FORMAT: format::Pixel = format::Pixel::RGB24;
pub(crate) const SCALE_FLAGS: scaling::Flags = scaling::Flags::BILINEAR;
/// Consecutive demuxer errors after which the rest of the file is abandoned.
const MAX_READ_ERRORS: usize = 8;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container-reported frame count; 0 when the container does not say.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: PathBuf,
}

/// Decodes the best video stream of a file into packed RGB frames.
///
/// Skipped frames are decoded (the codec needs them as references) but never
/// colour-converted.
pub struct FfmpegSource {
    input: format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<Scaler>,
    stream_index: usize,
    metadata: VideoMetadata,
    next_index: usize,
    read_errors: usize,
    flushing: bool,
    done: bool,
}

struct Scaler {
    context: scaling::Context,
    format: format::Pixel,
    width: u32,
    height: u32,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        ffmpeg::init()?;

        let input = format::input(path).map_err(|source| VideoError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| VideoError::NoVideoStream(path.display().to_string()))?;
        let stream_index = stream.index();

        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder.codec().map(|c| c.name().to_string()).unwrap_or_default(),
            source_path: path.to_path_buf(),
        };

        tracing::info!(
            path = %path.display(),
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            frames = metadata.total_frames,
            codec = %metadata.codec,
            "opened video"
        );

        Ok(Self {
            input,
            decoder,
            scaler: None,
            stream_index,
            metadata,
            next_index: 0,
            read_errors: 0,
            flushing: false,
            done: false,
        })
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Pull the next decoded picture, feeding packets as needed.
    fn decode_next(&mut self) -> Option<frame::Video> {
        if self.done {
            return None;
        }

        loop {
            let mut decoded = frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Some(decoded);
            }
            if self.flushing {
                self.done = true;
                return None;
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    self.read_errors = 0;
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        tracing::debug!(error = %e, "dropping undecodable packet");
                    }
                }
                Err(ffmpeg::Error::Eof) => self.start_flush(),
                Err(e) => {
                    self.read_errors += 1;
                    if self.read_errors >= MAX_READ_ERRORS {
                        tracing::warn!(
                            path = %self.metadata.source_path.display(),
                            frame = self.next_index,
                            error = %e,
                            "video keeps failing to read; treating the rest as missing"
                        );
                        self.start_flush();
                    } else {
                        tracing::debug!(error = %e, "packet read failed; retrying");
                    }
                }
            }
        }
    }

    fn start_flush(&mut self) {
        let _ = self.decoder.send_eof();
        self.flushing = true;
    }

    fn convert(&mut self, decoded: &frame::Video, index: usize) -> Result<Frame, VideoError> {
        let (fmt, width, height) = (decoded.format(), decoded.width(), decoded.height());

        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| s.format != fmt || s.width != width || s.height != height);
        if stale {
            let context = scaling::Context::get(
                fmt,
                width,
                height,
                OUTPUT_FORMAT,
                width,
                height,
                SCALE_FLAGS,
            )?;
            self.scaler = Some(Scaler { context, format: fmt, width, height });
        }

        let mut rgb = frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.context.run(decoded, &mut rgb)?;
        }

        let pixels = pack_rows(rgb.data(0), rgb.stride(0), width, height)?;
        Ok(Frame::new(pixels, width, height, ChannelOrder::Rgb, index)?)
    }
}

impl FrameSource for FfmpegSource {
    fn read_frame(&mut self) -> Option<Result<Frame, VideoError>> {
        let decoded = self.decode_next()?;
        let index = self.next_index;
        self.next_index += 1;
        Some(self.convert(&decoded, index))
    }

    fn skip_frame(&mut self) -> Option<Result<(), VideoError>> {
        self.decode_next()?;
        self.next_index += 1;
        Some(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_clip::write_grey_clip;

    #[test]
    fn test_open_reports_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_grey_clip(&path, 5, 160, 120).unwrap();

        let source = FfmpegSource::open(&path).unwrap();
        let meta = source.metadata();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert!(meta.fps > 0.0);
        assert_eq!(meta.source_path, path);
    }

    #[test]
    fn test_reads_every_frame_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_grey_clip(&path, 5, 160, 120).unwrap();

        let mut source = FfmpegSource::open(&path).unwrap();
        let mut indices = Vec::new();
        while let Some(frame) = source.read_frame() {
            let frame = frame.unwrap();
            assert_eq!(frame.order, ChannelOrder::Rgb);
            assert_eq!(frame.data.len(), 160 * 120 * 3);
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_skip_keeps_frame_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_grey_clip(&path, 4, 64, 48).unwrap();

        let mut source = FfmpegSource::open(&path).unwrap();
        source.skip_frame().unwrap().unwrap();
        source.skip_frame().unwrap().unwrap();
        let third = source.read_frame().unwrap().unwrap();
        assert_eq!(third.index, 2);
        // Flat grey 80 survives the YUV round trip within codec noise.
        let mean = third.data.iter().map(|&b| b as f64).sum::<f64>() / third.data.len() as f64;
        assert!((mean - 80.0).abs() < 8.0, "mean was {mean}");
    }

    #[test]
    fn test_open_missing_file() {
        let err = FfmpegSource::open(Path::new("/nonexistent/lecture.mp4")).err().unwrap();
        assert!(matches!(err, VideoError::Open { .. }));
    }

    #[test]
    fn test_open_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"definitely not a video container").unwrap();
        assert!(FfmpegSource::open(&path).is_err());
    }

    #[test]
    fn test_truncated_file_ends_instead_of_looping() {
        let dir = tempfile::tempdir().unwrap();
        let whole = dir.path().join("whole.mp4");
        write_grey_clip(&whole, 20, 64, 48).unwrap();
        let bytes = std::fs::read(&whole).unwrap();
        let cut = dir.path().join("cut.mp4");
        std::fs::write(&cut, &bytes[..bytes.len() / 2]).unwrap();

        // Losing the tail may make the container unopenable; either way the
        // source must run dry.
        if let Ok(mut source) = FfmpegSource::open(&cut) {
            let mut frames = 0;
            while source.read_frame().is_some() {
                frames += 1;
                assert!(frames <= 20, "truncated clip produced more frames than it holds");
            }
        }
    }
}
