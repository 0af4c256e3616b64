//! Frames and display geometry.
//!
//! - `Frame`: one encoded camera image handed to the detector adapter.
//! - `Viewport`: the display surface that positions are reported in.
//!
//! Detectors work in source pixels; the UI works in viewport pixels. The
//! conversion between the two happens only through `Viewport::scale_for`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

// ----------------------------------------------------------------------------
// Frame: encoded image + dimensions
// ----------------------------------------------------------------------------

/// One captured frame, kept in its encoded form (JPEG/PNG) because that is
/// what detection services accept.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source counter.
    pub sequence: u64,
}

impl Frame {
    /// Wrap already-encoded bytes with known dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Wrap encoded bytes, reading dimensions from the image header.
    pub fn from_encoded(data: Vec<u8>, sequence: u64) -> Result<Self> {
        let (width, height) = image::ImageReader::new(Cursor::new(&data))
            .with_guessed_format()
            .context("detect frame image format")?
            .into_dimensions()
            .context("read frame dimensions")?;
        Self::new(data, width, height, sequence)
    }

    pub fn encoded(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

// ----------------------------------------------------------------------------
// Viewport: display surface for position reporting
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Multipliers from source pixels to viewport pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    pub x: f32,
    pub y: f32,
}

impl Scale {
    pub const IDENTITY: Scale = Scale { x: 1.0, y: 1.0 };
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale from a frame of `frame_width` x `frame_height` into this viewport.
    pub fn scale_for(&self, frame_width: u32, frame_height: u32) -> Scale {
        if frame_width == 0 || frame_height == 0 {
            return Scale::IDENTITY;
        }
        Scale {
            x: self.width as f32 / frame_width as f32,
            y: self.height as f32 / frame_height as f32,
        }
    }

    pub fn scale_for_frame(&self, frame: &Frame) -> Scale {
        self.scale_for(frame.width, frame.height)
    }
}
