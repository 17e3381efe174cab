//! Contrast-limited adaptive histogram equalization.
//!
//! Per-tile clipped histograms become lookup tables; each output pixel
//! bilinearly blends the tables of the four nearest tile centres. When the
//! image does not divide evenly into the grid it is virtually padded by
//! reflection, so every tile has the same area.

use image::GrayImage;

use super::{ContrastEqualizer, PrimitiveResult, TileGrid};
use crate::error::PrimitiveError;

const BINS: usize = 256;

/// Reusable CLAHE handle. Lookup tables are kept between frames.
pub struct Clahe {
    clip_limit: f32,
    grid: TileGrid,
    luts: Vec<[u8; BINS]>,
    valid: bool,
}

impl Clahe {
    pub fn new(clip_limit: f32, grid: TileGrid) -> PrimitiveResult<Self> {
        if !clip_limit.is_finite() || clip_limit <= 0.0 {
            return Err(PrimitiveError::Unsupported(format!(
                "clip limit must be positive, got {clip_limit}"
            )));
        }
        if grid.cols == 0 || grid.rows == 0 {
            return Err(PrimitiveError::Unsupported(format!(
                "tile grid must be at least 1x1, got {}x{}",
                grid.cols, grid.rows
            )));
        }
        Ok(Self {
            clip_limit,
            grid,
            luts: Vec::with_capacity((grid.cols * grid.rows) as usize),
            valid: true,
        })
    }

    fn build_luts(&mut self, gray: &GrayImage, tile_w: u32, tile_h: u32) {
        let (w, h) = gray.dimensions();
        let area = (tile_w * tile_h) as usize;
        let clip = ((self.clip_limit * area as f32 / BINS as f32) as usize).max(1);
        let lut_scale = (BINS - 1) as f32 / area as f32;

        self.luts.clear();
        for ty in 0..self.grid.rows {
            for tx in 0..self.grid.cols {
                let mut hist = [0usize; BINS];
                for py in ty * tile_h..(ty + 1) * tile_h {
                    let sy = reflect_101(py, h);
                    for px in tx * tile_w..(tx + 1) * tile_w {
                        let sx = reflect_101(px, w);
                        hist[gray.get_pixel(sx, sy).0[0] as usize] += 1;
                    }
                }

                clip_histogram(&mut hist, clip);

                let mut lut = [0u8; BINS];
                let mut sum = 0usize;
                for (bin, out) in hist.iter().zip(lut.iter_mut()) {
                    sum += bin;
                    *out = (sum as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
                }
                self.luts.push(lut);
            }
        }
    }

    fn interpolate(&self, gray: &GrayImage, tile_w: u32, tile_h: u32) -> GrayImage {
        let (w, h) = gray.dimensions();
        let cols = self.grid.cols as i64;
        let rows = self.grid.rows as i64;
        let mut out = GrayImage::new(w, h);

        for y in 0..h {
            let tyf = y as f32 / tile_h as f32 - 0.5;
            let ty1 = tyf.floor() as i64;
            let ya = tyf - ty1 as f32;
            let ty2 = (ty1 + 1).min(rows - 1) as usize;
            let ty1 = ty1.max(0) as usize;

            for x in 0..w {
                let txf = x as f32 / tile_w as f32 - 0.5;
                let tx1 = txf.floor() as i64;
                let xa = txf - tx1 as f32;
                let tx2 = (tx1 + 1).min(cols - 1) as usize;
                let tx1 = tx1.max(0) as usize;

                let v = gray.get_pixel(x, y).0[0] as usize;
                let lut = |r: usize, c: usize| self.luts[r * cols as usize + c][v] as f32;

                let top = lut(ty1, tx1) * (1.0 - xa) + lut(ty1, tx2) * xa;
                let bottom = lut(ty2, tx1) * (1.0 - xa) + lut(ty2, tx2) * xa;
                let value = top * (1.0 - ya) + bottom * ya;
                out.get_pixel_mut(x, y).0[0] = value.round().clamp(0.0, 255.0) as u8;
            }
        }

        out
    }
}

impl ContrastEqualizer for Clahe {
    fn clip_limit(&self) -> f32 {
        self.clip_limit
    }

    fn tile_grid(&self) -> TileGrid {
        self.grid
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn apply(&mut self, gray: &GrayImage) -> PrimitiveResult<GrayImage> {
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return Err(PrimitiveError::Malformed("empty image".into()));
        }

        // Stays false if table construction is interrupted.
        self.valid = false;
        let tile_w = w.div_ceil(self.grid.cols);
        let tile_h = h.div_ceil(self.grid.rows);
        self.build_luts(gray, tile_w, tile_h);
        let out = self.interpolate(gray, tile_w, tile_h);
        self.valid = true;

        Ok(out)
    }
}

/// Clip every bin at `clip` and spread the excess evenly, OpenCV style.
fn clip_histogram(hist: &mut [usize; BINS], clip: usize) {
    let mut clipped = 0usize;
    for bin in hist.iter_mut() {
        if *bin > clip {
            clipped += *bin - clip;
            *bin = clip;
        }
    }

    let batch = clipped / BINS;
    let mut residual = clipped - batch * BINS;
    for bin in hist.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut i = 0;
        while i < BINS && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge.
fn reflect_101(i: u32, len: u32) -> u32 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let i = i % period;
    if i < len {
        i
    } else {
        period - i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn stddev(img: &GrayImage) -> f32 {
        let n = img.len() as f32;
        let mean = img.iter().map(|&b| b as f32).sum::<f32>() / n;
        let var = img.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n;
        var.sqrt()
    }

    #[test]
    fn increases_contrast_of_flat_gradient() {
        let img = GrayImage::from_fn(32, 32, |x, y| Luma([100 + ((x + y) % 11) as u8]));
        let mut clahe = Clahe::new(2.0, TileGrid::new(4, 4)).unwrap();
        let out = clahe.apply(&img).unwrap();
        assert!(stddev(&out) > stddev(&img));
    }

    #[test]
    fn uniform_input_stays_uniform_with_uneven_tiles() {
        let img = GrayImage::from_pixel(13, 7, Luma([0]));
        let mut clahe = Clahe::new(2.0, TileGrid::new(8, 8)).unwrap();
        let out = clahe.apply(&img).unwrap();
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn tiny_image_smaller_than_grid() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let mut clahe = Clahe::new(2.0, TileGrid::default()).unwrap();
        let out = clahe.apply(&img).unwrap();
        assert_eq!(out.dimensions(), (4, 4));
        assert!(clahe.is_valid());
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(Clahe::new(0.0, TileGrid::default()).is_err());
        assert!(Clahe::new(f32::NAN, TileGrid::default()).is_err());
        assert!(Clahe::new(2.0, TileGrid::new(0, 8)).is_err());
    }

    #[test]
    fn reflection_does_not_repeat_edges() {
        assert_eq!(reflect_101(4, 4), 2);
        assert_eq!(reflect_101(5, 4), 1);
        assert_eq!(reflect_101(6, 4), 0);
        assert_eq!(reflect_101(7, 4), 1);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn clipping_preserves_total_count() {
        let mut hist = [0usize; BINS];
        hist[10] = 1000;
        hist[20] = 24;
        clip_histogram(&mut hist, 8);
        assert_eq!(hist.iter().sum::<usize>(), 1024);
    }
}
