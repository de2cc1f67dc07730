//! Frame model.
//!
//! [`PendingFrame`] is the opaque buffer that crosses the admission
//! boundary: produced by a capture source, handed to a skill binding for
//! exactly one evaluation, dropped unconditionally afterwards. Frames are
//! never queued; a frame that loses admission is dropped on the spot.
//!
//! Byte storage is private. Producers go through the checked constructors
//! and consumers read pixels through [`PendingFrame::pixels`], so a frame
//! can never be observed with a geometry its buffer does not back.

use std::fmt;

use crate::error::FrameError;

// ----------------------------------------------------------------------------
// PixelFormat
// ----------------------------------------------------------------------------

/// Pixel layout of a frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit blue, green, red, alpha. The only layout the built-in skills
    /// consume; file decodes are converted into it.
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra8 => 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Bgra8 => f.write_str("bgra8"),
        }
    }
}

// ----------------------------------------------------------------------------
// PendingFrame
// ----------------------------------------------------------------------------

/// A frame awaiting (or produced by) one evaluation.
pub struct PendingFrame {
    /// Private pixel data. Reachable only through `pixels()`, so the length
    /// invariant below cannot be broken from outside.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,

    /// Producer-assigned position in the capture stream. Frames derived
    /// from another frame carry the originating sequence.
    pub sequence: u64,
}

impl PendingFrame {
    /// Wrap a buffer the caller sized itself or copied from a validated
    /// frame. Crate internals only; everything else goes through the
    /// checked [`PendingFrame::from_bgra8`].
    pub(crate) fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            format: PixelFormat::Bgra8,
            sequence: 0,
        }
    }

    /// Wrap a BGRA8 buffer, checking that the byte length matches the
    /// claimed geometry.
    pub fn from_bgra8(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let format = PixelFormat::Bgra8;
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected = expected_len(width, height, format);
        if data.len() != expected {
            return Err(FrameError::GeometryMismatch {
                width,
                height,
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            sequence: 0,
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Row-major offset of the first byte of pixel (x, y).
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }
}

impl fmt::Debug for PendingFrame {
    // Geometry only; pixel bytes stay out of logs and panic messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn expected_len(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
