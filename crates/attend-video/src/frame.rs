//! Frame type and pixel packing.

use attend_core::{ChannelOrder, FrameRef};
use std::fmt;

/// A decoded, tightly packed 3-channel video frame.
#[derive(Clone)]
pub struct Frame {
    /// `width * height * 3` bytes, row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    /// Position of this frame in the decoded stream, starting at 0.
    pub index: usize,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
        index: usize,
    ) -> Result<Self, FrameError> {
        let expected = packed_len(width, height);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            order,
            index,
        })
    }

    /// Borrowed view handed to face extraction.
    pub fn as_frame_ref(&self) -> FrameRef<'_> {
        FrameRef {
            data: &self.data,
            width: self.width,
            height: self.height,
            order: self.order,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

fn packed_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Copy a strided 3-channel plane into a packed buffer.
///
/// Decoders pad each row to an alignment boundary, so `stride` may exceed
/// `width * 3`.
pub fn pack_rows(
    plane: &[u8],
    stride: usize,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, FrameError> {
    let row_len = width as usize * 3;
    let rows = height as usize;
    if stride < row_len {
        return Err(FrameError::StrideTooSmall { stride, row_len });
    }
    let needed = if rows == 0 { 0 } else { stride * (rows - 1) + row_len };
    if plane.len() < needed {
        return Err(FrameError::InvalidLength {
            expected: needed,
            actual: plane.len(),
        });
    }

    let mut pixels = Vec::with_capacity(row_len * rows);
    for row in 0..rows {
        let start = row * stride;
        pixels.extend_from_slice(&plane[start..start + row_len]);
    }
    Ok(pixels)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("row stride {stride} is shorter than a packed row of {row_len} bytes")]
    StrideTooSmall { stride: usize, row_len: usize },
}
