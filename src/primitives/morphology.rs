//! Structuring elements for the morphological refinement stage.
//!
//! The operators themselves live in `imageproc::morphology`; this module only
//! rasterises elliptical elements and keeps the resulting [`Mask`] around so
//! it is built once per pipeline rather than once per frame.

use image::{GrayImage, Luma};
use imageproc::morphology::Mask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOp {
    Dilate,
    Erode,
    /// Erode then dilate
    Open,
    /// Dilate then erode
    Close,
}

/// Structuring element anchored at its centre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    raster: GrayImage,
    mask: Mask,
}

impl StructuringElement {
    /// Ellipse inscribed in a `width x height` box, rasterised the way
    /// OpenCV's `getStructuringElement(MORPH_ELLIPSE, ..)` does.
    ///
    /// Sides are clamped to `1..=255` so the anchor fits the mask's
    /// coordinate range.
    pub fn ellipse(width: u32, height: u32) -> Self {
        let width = width.clamp(1, 255);
        let height = height.clamp(1, 255);
        let (c, r) = ((width / 2) as i32, (height / 2) as i32);
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        let mut raster = GrayImage::new(width, height);
        for i in 0..height as i32 {
            let dy = i - r;
            let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
            let j1 = (c - dx).max(0);
            let j2 = (c + dx + 1).min(width as i32);
            for j in j1..j2 {
                raster.put_pixel(j as u32, i as u32, Luma([255]));
            }
        }

        let mask = Mask::from_image(&raster, c as u8, r as u8);
        Self { raster, mask }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Number of pixels in the element.
    pub fn len(&self) -> usize {
        self.raster.pixels().filter(|p| p.0[0] != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the offset `(dx, dy)` from the anchor is part of the element.
    pub fn contains(&self, dx: i32, dy: i32) -> bool {
        let x = dx + (self.width() / 2) as i32;
        let y = dy + (self.height() / 2) as i32;
        if x < 0 || y < 0 || x >= self.width() as i32 || y >= self.height() as i32 {
            return false;
        }
        self.raster.get_pixel(x as u32, y as u32).0[0] != 0
    }
}
