//! CPU backend on top of `image` / `imageproc`. Only CLAHE (sibling `clahe`
//! module) and the NV21 decode below are implemented in this crate.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use image::{imageops, DynamicImage, GrayImage, RgbImage};
use imageproc::{edges, filter, morphology as morph};

use super::clahe::Clahe;
use super::{
    BilateralParams, CannyParams, MorphOp, PrimitiveResult, Primitives, StructuringElement,
    TileGrid,
};
use crate::error::PrimitiveError;

/// Default primitives backend. Stateless; cheap to clone and share.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwarePrimitives;

impl SoftwarePrimitives {
    pub const fn new() -> Self {
        Self
    }
}

impl Primitives for SoftwarePrimitives {
    type Equalizer = Clahe;

    fn rgb_to_gray(&self, rgb: &RgbImage) -> PrimitiveResult<GrayImage> {
        non_empty(rgb.width(), rgb.height())?;
        guarded("grayscale", || imageops::grayscale(rgb))
    }

    fn gray_to_rgb(&self, gray: &GrayImage) -> PrimitiveResult<RgbImage> {
        non_empty(gray.width(), gray.height())?;
        guarded("gray_to_rgb", || {
            DynamicImage::ImageLuma8(gray.clone()).into_rgb8()
        })
    }

    fn create_equalizer(&self, clip_limit: f32, grid: TileGrid) -> PrimitiveResult<Clahe> {
        Clahe::new(clip_limit, grid)
    }

    fn gaussian_blur(&self, gray: &GrayImage, sigma: f32) -> PrimitiveResult<GrayImage> {
        non_empty(gray.width(), gray.height())?;
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(PrimitiveError::Unsupported(format!(
                "blur sigma must be positive, got {sigma}"
            )));
        }
        guarded("gaussian_blur", || filter::gaussian_blur_f32(gray, sigma))
    }

    fn bilateral_filter(&self, gray: &GrayImage, params: &BilateralParams) -> PrimitiveResult<GrayImage> {
        non_empty(gray.width(), gray.height())?;
        let BilateralParams {
            diameter,
            sigma_color,
            sigma_space,
        } = *params;
        if !(sigma_color.is_finite() && sigma_color > 0.0 && sigma_space.is_finite() && sigma_space > 0.0)
        {
            return Err(PrimitiveError::Unsupported(format!(
                "bilateral sigmas must be positive, got color={sigma_color} space={sigma_space}"
            )));
        }
        // A zero diameter derives the window from the spatial sigma.
        let window = if diameter == 0 {
            2 * (sigma_space * 1.5).round() as u32 + 1
        } else {
            diameter
        };
        guarded("bilateral_filter", || {
            filter::bilateral_filter(gray, window, sigma_color, sigma_space)
        })
    }

    /// Hysteresis edge detector.
    ///
    /// `imageproc::edges::canny` smooths its input with a sigma 1.4 Gaussian
    /// before the Sobel pass, so edges come out slightly softer than a
    /// detector that takes gradients of the input directly.
    fn canny(&self, gray: &GrayImage, params: &CannyParams) -> PrimitiveResult<GrayImage> {
        non_empty(gray.width(), gray.height())?;
        if params.aperture != 3 || !params.l2_gradient {
            return Err(PrimitiveError::Unsupported(format!(
                "edge detector supports aperture 3 with L2 gradient only, got aperture {} l2={}",
                params.aperture, params.l2_gradient
            )));
        }
        if !(params.low_threshold.is_finite() && params.high_threshold.is_finite()) {
            return Err(PrimitiveError::Unsupported("edge thresholds must be finite".into()));
        }

        // Hysteresis compares with >=; a zero threshold would mark flat
        // regions as edges.
        let low = params.low_threshold.max(f32::MIN_POSITIVE);
        let high = params.high_threshold.max(low);
        guarded("canny", || edges::canny(gray, low, high))
    }

    fn morphology(
        &self,
        gray: &GrayImage,
        op: MorphOp,
        element: &StructuringElement,
    ) -> PrimitiveResult<GrayImage> {
        non_empty(gray.width(), gray.height())?;
        if element.is_empty() {
            return Err(PrimitiveError::Unsupported("empty structuring element".into()));
        }
        let mask = element.mask();
        guarded("morphology", || match op {
            MorphOp::Dilate => morph::grayscale_dilate(gray, mask),
            MorphOp::Erode => morph::grayscale_erode(gray, mask),
            MorphOp::Open => morph::grayscale_open(gray, mask),
            MorphOp::Close => morph::grayscale_close(gray, mask),
        })
    }

    fn nv21_to_rgb(&self, yuv: &[u8], width: u32, height: u32) -> PrimitiveResult<RgbImage> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(PrimitiveError::Malformed(format!(
                "semi-planar frame needs even, non-zero sides, got {width}x{height}"
            )));
        }
        let (w, h) = (width as usize, height as usize);
        let expected = w * h * 3 / 2;
        if yuv.len() != expected {
            return Err(PrimitiveError::Malformed(format!(
                "semi-planar frame {width}x{height} needs {expected} bytes, got {}",
                yuv.len()
            )));
        }
        guarded("nv21_to_rgb", || nv21_to_rgb(yuv, width, height))
    }

    fn rotate90_cw(&self, rgb: &RgbImage) -> PrimitiveResult<RgbImage> {
        non_empty(rgb.width(), rgb.height())?;
        guarded("rotate90", || imageops::rotate90(rgb))
    }
}

/// BT.601 limited-range NV21 decode. Each 2x2 luma block shares one V/U pair.
fn nv21_to_rgb(yuv: &[u8], width: u32, height: u32) -> RgbImage {
    let w = width as usize;
    let (y_plane, vu_plane) = yuv.split_at(w * height as usize);

    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let luma = y_plane[y * w + x] as f32;
        let chroma = (y / 2) * w + (x / 2) * 2;
        let v = vu_plane[chroma] as f32 - 128.0;
        let u = vu_plane[chroma + 1] as f32 - 128.0;

        let c = 1.164 * (luma - 16.0);
        let r = c + 1.596 * v;
        let g = c - 0.813 * v - 0.391 * u;
        let b = c + 2.018 * u;
        image::Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)])
    })
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn non_empty(width: u32, height: u32) -> PrimitiveResult<()> {
    if width == 0 || height == 0 {
        return Err(PrimitiveError::Malformed(format!("empty image {width}x{height}")));
    }
    Ok(())
}

/// Run a library call, turning a panic into [`PrimitiveError::Internal`].
fn guarded<T>(what: &str, f: impl FnOnce() -> T) -> PrimitiveResult<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        PrimitiveError::Internal(format!("{what} panicked: {}", panic_message(payload.as_ref())))
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
