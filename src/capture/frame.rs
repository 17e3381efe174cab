use std::time::Instant;

use bytes::Bytes;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, PrimitiveError, Result};

/// Immutable frame: pixel bytes plus geometry.
///
/// The payload is never aliased with caller memory; the boundary copies into a
/// fresh `Bytes` on the way in and out of a fresh `Vec` on the way out.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data, length always matches `meta`
    pub data: Bytes,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Time the frame entered processor-owned memory
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Interleaved R, G, B, one byte each
    Rgb888,
    /// Single 8-bit luma channel
    Gray8,
    /// NV21: full-resolution Y plane followed by interleaved V/U at half resolution
    Yuv420SemiPlanar,
}

impl PixelFormat {
    /// Exact payload size for `width x height`, `None` on overflow.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb888 => pixels.checked_mul(3),
            PixelFormat::Gray8 => Some(pixels),
            PixelFormat::Yuv420SemiPlanar => pixels.checked_mul(3).map(|n| n / 2),
        }
    }

    /// Checks geometry only; semi-planar frames need even, non-zero sides.
    pub fn check_dimensions(self, width: u32, height: u32) -> Result<usize> {
        let odd = matches!(self, PixelFormat::Yuv420SemiPlanar)
            && (width % 2 != 0 || height % 2 != 0);
        if width == 0 || height == 0 || odd {
            return Err(Error::InvalidDimensions { width, height });
        }
        self.frame_len(width, height)
            .ok_or(Error::InvalidDimensions { width, height })
    }
}

impl Frame {
    /// Wrap an owned payload after validating its size against the geometry.
    pub fn new(data: Bytes, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let expected = format.check_dimensions(width, height)?;
        if data.len() != expected {
            return Err(Error::InvalidBufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            meta: FrameMetadata {
                sequence: 0,
                width,
                height,
                format,
            },
            timestamp: Instant::now(),
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.meta.sequence = sequence;
        self
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_parts(Bytes::from(image.into_raw()), width, height, PixelFormat::Rgb888)
    }

    pub fn from_gray_image(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_parts(Bytes::from(image.into_raw()), width, height, PixelFormat::Gray8)
    }

    // Only for buffers produced by the image types themselves, whose length
    // already matches their dimensions.
    fn from_parts(data: Bytes, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            meta: FrameMetadata {
                sequence: 0,
                width,
                height,
                format,
            },
            timestamp: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Copy into an `RgbImage`; fails on any other layout.
    pub fn to_rgb_image(&self) -> Result<RgbImage, PrimitiveError> {
        if self.meta.format != PixelFormat::Rgb888 {
            return Err(PrimitiveError::UnsupportedLayout(format!(
                "expected rgb888, got {:?}",
                self.meta.format
            )));
        }
        RgbImage::from_raw(self.meta.width, self.meta.height, self.data.to_vec())
            .ok_or_else(|| PrimitiveError::Malformed("rgb payload does not match geometry".into()))
    }

    /// Copy into a `GrayImage`; fails on any other layout.
    pub fn to_gray_image(&self) -> Result<GrayImage, PrimitiveError> {
        if self.meta.format != PixelFormat::Gray8 {
            return Err(PrimitiveError::UnsupportedLayout(format!(
                "expected gray8, got {:?}",
                self.meta.format
            )));
        }
        GrayImage::from_raw(self.meta.width, self.meta.height, self.data.to_vec())
            .ok_or_else(|| PrimitiveError::Malformed("gray payload does not match geometry".into()))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("len", &self.data.len())
            .finish()
    }
}
