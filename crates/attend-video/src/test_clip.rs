//! Synthetic video clips for tests that need a real container on disk.

use crate::ffmpeg::SCALE_FLAGS;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, frame, software::scaling};
use std::path::Path;

const FPS: i32 = 25;

/// Write an MPEG-4 clip whose frame `i` is a flat grey of `(i * 40) % 256`.
pub fn write_grey_clip(
    path: &Path,
    num_frames: usize,
    width: u32,
    height: u32,
) -> Result<(), ffmpeg::Error> {
    ffmpeg::init()?;

    let mut octx = format::output(path)?;
    let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);

    let mpeg4 = ffmpeg::encoder::find(codec::Id::MPEG4).ok_or(ffmpeg::Error::EncoderNotFound)?;
    let mut ost = octx.add_stream(Some(mpeg4))?;

    let mut encoder_ctx = codec::context::Context::new_with_codec(mpeg4).encoder().video()?;
    encoder_ctx.set_width(width);
    encoder_ctx.set_height(height);
    encoder_ctx.set_format(format::Pixel::YUV420P);
    encoder_ctx.set_time_base(ffmpeg::Rational(1, FPS));
    encoder_ctx.set_frame_rate(Some(ffmpeg::Rational(FPS, 1)));
    if global_header {
        encoder_ctx.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let mut encoder = encoder_ctx.open_with(ffmpeg::Dictionary::new())?;
    ost.set_parameters(&encoder);
    octx.write_header()?;
    let ost_time_base = octx.stream(0).ok_or(ffmpeg::Error::StreamNotFound)?.time_base();

    let mut to_yuv = scaling::Context::get(
        format::Pixel::RGB24,
        width,
        height,
        format::Pixel::YUV420P,
        width,
        height,
        SCALE_FLAGS,
    )?;

    for i in 0..num_frames {
        let mut rgb = frame::Video::new(format::Pixel::RGB24, width, height);
        rgb.data_mut(0).fill(((i * 40) % 256) as u8);

        let mut yuv = frame::Video::empty();
        to_yuv.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(i as i64));
        encoder.send_frame(&yuv)?;
        write_packets(&mut encoder, &mut octx, ost_time_base)?;
    }

    encoder.send_eof()?;
    write_packets(&mut encoder, &mut octx, ost_time_base)?;
    octx.write_trailer()
}

fn write_packets(
    encoder: &mut ffmpeg::encoder::Video,
    octx: &mut format::context::Output,
    time_base: ffmpeg::Rational,
) -> Result<(), ffmpeg::Error> {
    let mut encoded = ffmpeg::Packet::empty();
    while encoder.receive_packet(&mut encoded).is_ok() {
        encoded.set_stream(0);
        encoded.rescale_ts(ffmpeg::Rational(1, FPS), time_base);
        encoded.write_interleaved(octx)?;
    }
    Ok(())
}
