//! Pixel format and orientation conversion to interleaved RGB.

use std::borrow::Cow;

use image::{GrayImage, RgbImage};
use tracing::trace;

use super::frame::{Frame, PixelFormat};
use crate::error::{Error, Result};
use crate::primitives::Primitives;

/// Convert `buffer` to an `Rgb888` frame, optionally rotating 90° clockwise.
///
/// The buffer must be exactly the contiguous size of `source` at
/// `width x height`. When rotating, the returned frame is `height x width`.
pub fn convert<P>(
    primitives: &P,
    buffer: &[u8],
    width: u32,
    height: u32,
    source: PixelFormat,
    rotate: bool,
) -> Result<Frame>
where
    P: Primitives + ?Sized,
{
    let expected = source.check_dimensions(width, height)?;
    if buffer.len() != expected {
        return Err(Error::InvalidBufferSize {
            expected,
            actual: buffer.len(),
        });
    }

    let rgb = match source {
        PixelFormat::Yuv420SemiPlanar => primitives.nv21_to_rgb(buffer, width, height)?,
        PixelFormat::Rgb888 => RgbImage::from_raw(width, height, buffer.to_vec())
            .ok_or(Error::InvalidDimensions { width, height })?,
        PixelFormat::Gray8 => {
            let gray = GrayImage::from_raw(width, height, buffer.to_vec())
                .ok_or(Error::InvalidDimensions { width, height })?;
            primitives.gray_to_rgb(&gray)?
        }
    };

    let rgb = if rotate {
        primitives.rotate90_cw(&rgb)?
    } else {
        rgb
    };

    trace!(?source, width, height, rotate, "converted frame");
    Ok(Frame::from_rgb_image(rgb))
}

/// Semi-planar conversion with an explicit row stride.
///
/// A stride of `0` or `width` means contiguous rows. A wider stride is
/// repacked first; the buffer then spans `row_stride * height * 3 / 2` bytes.
pub fn convert_planar<P>(
    primitives: &P,
    buffer: &[u8],
    width: u32,
    height: u32,
    row_stride: u32,
    rotate: bool,
) -> Result<Frame>
where
    P: Primitives + ?Sized,
{
    let packed = repack_rows(buffer, width, height, row_stride)?;
    convert(
        primitives,
        &packed,
        width,
        height,
        PixelFormat::Yuv420SemiPlanar,
        rotate,
    )
}

/// Drop row padding from a strided NV21 buffer.
///
/// Borrows the input untouched when it is already contiguous.
pub fn repack_rows(buffer: &[u8], width: u32, height: u32, row_stride: u32) -> Result<Cow<'_, [u8]>> {
    if row_stride == 0 || row_stride == width {
        return Ok(Cow::Borrowed(buffer));
    }
    if row_stride < width {
        return Err(Error::InvalidStride { width, row_stride });
    }

    PixelFormat::Yuv420SemiPlanar.check_dimensions(width, height)?;
    let stride = row_stride as usize;
    // Luma rows plus half as many interleaved chroma rows.
    let rows = height as usize + height as usize / 2;
    let expected = stride
        .checked_mul(rows)
        .ok_or(Error::InvalidDimensions { width, height })?;
    if buffer.len() != expected {
        return Err(Error::InvalidBufferSize {
            expected,
            actual: buffer.len(),
        });
    }

    let w = width as usize;
    let mut packed = Vec::with_capacity(w * rows);
    for row in buffer.chunks_exact(stride) {
        packed.extend_from_slice(&row[..w]);
    }
    Ok(Cow::Owned(packed))
}
