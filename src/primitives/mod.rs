//! Image-primitives seam.
//!
//! The pipeline treats every pixel operator as a black box behind
//! [`Primitives`]. [`SoftwarePrimitives`] is the default backend, built on the
//! `image` and `imageproc` crates; tests substitute their own implementations
//! to inject faults.

pub mod clahe;
pub mod morphology;
mod software;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::PrimitiveError;

pub use morphology::{MorphOp, StructuringElement};
pub(crate) use software::panic_message;
pub use software::SoftwarePrimitives;

pub type PrimitiveResult<T> = std::result::Result<T, PrimitiveError>;

/// CLAHE tile grid (columns, rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub cols: u32,
    pub rows: u32,
}

impl TileGrid {
    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::new(8, 8)
    }
}

/// Edge-preserving filter parameters, OpenCV `bilateralFilter` semantics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    /// Neighbourhood diameter in pixels
    pub diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

/// Gradient edge detector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannyParams {
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Sobel aperture size
    pub aperture: u8,
    /// Use sqrt(gx² + gy²) instead of |gx| + |gy|
    pub l2_gradient: bool,
}

/// Reusable contrast-enhancement handle (adaptive histogram equalization).
///
/// Handles keep scratch state between frames; the owner recreates one when
/// [`is_valid`](Self::is_valid) turns false or its settings go stale.
pub trait ContrastEqualizer: Send {
    fn clip_limit(&self) -> f32;

    fn tile_grid(&self) -> TileGrid;

    fn is_valid(&self) -> bool;

    fn apply(&mut self, gray: &GrayImage) -> PrimitiveResult<GrayImage>;
}

/// Pixel operators the core depends on.
pub trait Primitives: Send + Sync {
    type Equalizer: ContrastEqualizer;

    fn rgb_to_gray(&self, rgb: &RgbImage) -> PrimitiveResult<GrayImage>;

    fn gray_to_rgb(&self, gray: &GrayImage) -> PrimitiveResult<RgbImage>;

    fn create_equalizer(&self, clip_limit: f32, grid: TileGrid) -> PrimitiveResult<Self::Equalizer>;

    fn gaussian_blur(&self, gray: &GrayImage, sigma: f32) -> PrimitiveResult<GrayImage>;

    fn bilateral_filter(&self, gray: &GrayImage, params: &BilateralParams) -> PrimitiveResult<GrayImage>;

    fn canny(&self, gray: &GrayImage, params: &CannyParams) -> PrimitiveResult<GrayImage>;

    fn morphology(
        &self,
        gray: &GrayImage,
        op: MorphOp,
        element: &StructuringElement,
    ) -> PrimitiveResult<GrayImage>;

    /// NV21 (Y plane, then interleaved V/U) to interleaved RGB.
    fn nv21_to_rgb(&self, yuv: &[u8], width: u32, height: u32) -> PrimitiveResult<RgbImage>;

    fn rotate90_cw(&self, rgb: &RgbImage) -> PrimitiveResult<RgbImage>;
}
