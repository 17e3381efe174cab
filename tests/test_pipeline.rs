use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use edgelens::capture::synthetic::nv21_pattern;
use edgelens::error::{PrimitiveError, Stage};
use edgelens::pipeline::{FrameProcessor, QualityTier};
use edgelens::primitives::{
    BilateralParams, CannyParams, ContrastEqualizer, MorphOp, PrimitiveResult, Primitives,
    SoftwarePrimitives, StructuringElement, TileGrid,
};
use edgelens::{Frame, PipelineConfig, PixelFormat, TelemetryConfig};
use image::{GrayImage, Rgb, RgbImage};
use serial_test::serial;

/// Deterministic noise plus a bright rectangle.
fn scene(width: u32, height: u32, seed: u32) -> Frame {
    let mut state = seed.wrapping_mul(2654435761).max(1);
    let img = RgbImage::from_fn(width, height, |x, y| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let noise = (state % 24) as u8;
        let inside = x > width / 3 && x < 2 * width / 3 && y > height / 3 && y < 2 * height / 3;
        let base = if inside { 200 } else { 40 };
        Rgb([base + noise, base + noise / 2, base])
    });
    Frame::from_rgb_image(img)
}

#[test]
fn every_tier_returns_full_rgb_frame() -> Result<(), Box<dyn Error>> {
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    for (w, h) in [(1, 1), (3, 5), (17, 9), (64, 48)] {
        let input = scene(w, h, w * h);
        for tier in QualityTier::ALL {
            processor.set_tier(tier);
            let result = processor.process_frame(&input);
            assert!(!result.fell_back, "{w}x{h} at {tier}");
            assert_eq!(result.frame.format(), PixelFormat::Rgb888);
            assert_eq!(result.frame.len(), (w * h * 3) as usize);
            assert_eq!((result.frame.width(), result.frame.height()), (w, h));
        }
    }
    Ok(())
}

#[test]
fn edges_follow_the_rectangle() -> Result<(), Box<dyn Error>> {
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    let input = RgbImage::from_fn(96, 72, |x, y| {
        if (32..64).contains(&x) && (24..48).contains(&y) {
            Rgb([210, 210, 210])
        } else {
            Rgb([30, 30, 30])
        }
    });
    let result = processor.process_frame(&Frame::from_rgb_image(input));
    assert!(!result.fell_back);
    let edges = result.frame.to_rgb_image()?;

    let lit = edges.pixels().filter(|p| p.0[0] == 255).count();
    assert!(lit > 0);
    // Far corner of the background stays dark
    assert_eq!(edges.get_pixel(2, 2).0, [0, 0, 0]);
    Ok(())
}

#[test]
fn passthrough_is_identity() -> Result<(), Box<dyn Error>> {
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    for (w, h) in [(1, 1), (4, 4), (31, 7)] {
        let input = scene(w, h, 3);
        let result = processor.passthrough(&input);
        assert_eq!(result.frame.as_slice(), input.as_slice());
        assert!(result.timings.is_empty());
    }
    Ok(())
}

#[test]
fn edge_output_can_be_fed_back_in() -> Result<(), Box<dyn Error>> {
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    let first = processor.process_frame(&scene(48, 36, 11));
    let second = processor.process_frame(&first.frame);
    assert!(!second.fell_back);
    assert_eq!(second.frame.len(), first.frame.len());

    let gray = Frame::from_gray_image(image::imageops::grayscale(&first.frame.to_rgb_image()?));
    let third = processor.process_frame(&gray);
    assert!(!third.fell_back);
    assert_eq!(third.frame.format(), PixelFormat::Rgb888);
    Ok(())
}

#[test]
fn black_frame_has_no_edges_at_any_setting() -> Result<(), Box<dyn Error>> {
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    let black = Frame::new(Bytes::from(vec![0u8; 48]), 4, 4, PixelFormat::Rgb888)?;

    for (low, high) in [(0.0, 0.0), (10.0, 30.0), (50.0, 150.0), (100.0, 200.0)] {
        processor.configure(PipelineConfig {
            canny_low_threshold: low,
            canny_high_threshold: high,
            ..PipelineConfig::default()
        })?;
        for tier in QualityTier::ALL {
            processor.set_tier(tier);
            let result = processor.process_frame(&black);
            assert!(!result.fell_back);
            let out = result.frame.as_slice();
            assert_eq!(out.len(), 48);
            assert!(
                out.iter().all(|&b| b == out[0]),
                "edges on a flat field at {tier} ({low}, {high})"
            );
        }
    }
    Ok(())
}

#[test]
fn invalid_level_keeps_tier_and_processing_continues() -> Result<(), Box<dyn Error>> {
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    processor.set_tier(QualityTier::High);
    assert!(processor.set_quality_level(5).is_err());
    assert_eq!(processor.tier(), QualityTier::High);

    let result = processor.process_frame(&scene(16, 16, 1));
    assert!(!result.fell_back);
    assert_eq!(result.tier, QualityTier::High);
    Ok(())
}

#[test]
#[serial]
fn higher_tiers_cost_more() -> Result<(), Box<dyn Error>> {
    const RUNS: usize = 9;
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    let input = scene(320, 240, 42);

    // Warm up the contrast handle and caches.
    processor.process_frame(&input);

    let mut samples: Vec<Vec<f64>> = vec![Vec::new(); 3];
    for _ in 0..RUNS {
        for (i, tier) in QualityTier::ALL.into_iter().enumerate() {
            processor.set_tier(tier);
            let start = Instant::now();
            let result = processor.process_frame(&input);
            assert!(!result.fell_back);
            samples[i].push(start.elapsed().as_secs_f64());
        }
    }

    let medians: Vec<f64> = samples
        .iter_mut()
        .map(|s| {
            s.sort_by(f64::total_cmp);
            s[s.len() / 2]
        })
        .collect();
    let (fast, normal, high) = (medians[0], medians[1], medians[2]);
    assert!(fast <= normal * 1.10, "fast {fast} vs normal {normal}");
    assert!(normal <= high * 1.10, "normal {normal} vs high {high}");
    Ok(())
}

/// Delegates to the software backend, failing (or panicking) in one stage.
#[derive(Clone)]
struct Faulty {
    inner: SoftwarePrimitives,
    fail_bilateral: bool,
    panic_in_canny: bool,
    equalizers_created: Arc<AtomicUsize>,
}

impl Faulty {
    fn new() -> Self {
        Self {
            inner: SoftwarePrimitives,
            fail_bilateral: false,
            panic_in_canny: false,
            equalizers_created: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Contrast handle that declares itself invalid after every use.
struct OneShot {
    clip_limit: f32,
    grid: TileGrid,
    used: bool,
}

impl ContrastEqualizer for OneShot {
    fn clip_limit(&self) -> f32 {
        self.clip_limit
    }

    fn tile_grid(&self) -> TileGrid {
        self.grid
    }

    fn is_valid(&self) -> bool {
        !self.used
    }

    fn apply(&mut self, gray: &GrayImage) -> PrimitiveResult<GrayImage> {
        self.used = true;
        Ok(gray.clone())
    }
}

impl Primitives for Faulty {
    type Equalizer = OneShot;

    fn rgb_to_gray(&self, rgb: &RgbImage) -> PrimitiveResult<GrayImage> {
        self.inner.rgb_to_gray(rgb)
    }

    fn gray_to_rgb(&self, gray: &GrayImage) -> PrimitiveResult<RgbImage> {
        self.inner.gray_to_rgb(gray)
    }

    fn create_equalizer(&self, clip_limit: f32, grid: TileGrid) -> PrimitiveResult<OneShot> {
        self.equalizers_created.fetch_add(1, Ordering::SeqCst);
        Ok(OneShot {
            clip_limit,
            grid,
            used: false,
        })
    }

    fn gaussian_blur(&self, gray: &GrayImage, sigma: f32) -> PrimitiveResult<GrayImage> {
        self.inner.gaussian_blur(gray, sigma)
    }

    fn bilateral_filter(&self, gray: &GrayImage, params: &BilateralParams) -> PrimitiveResult<GrayImage> {
        if self.fail_bilateral {
            return Err(PrimitiveError::Internal("injected".into()));
        }
        self.inner.bilateral_filter(gray, params)
    }

    fn canny(&self, gray: &GrayImage, params: &CannyParams) -> PrimitiveResult<GrayImage> {
        if self.panic_in_canny {
            panic!("injected panic");
        }
        self.inner.canny(gray, params)
    }

    fn morphology(
        &self,
        gray: &GrayImage,
        op: MorphOp,
        element: &StructuringElement,
    ) -> PrimitiveResult<GrayImage> {
        self.inner.morphology(gray, op, element)
    }

    fn nv21_to_rgb(&self, yuv: &[u8], width: u32, height: u32) -> PrimitiveResult<RgbImage> {
        self.inner.nv21_to_rgb(yuv, width, height)
    }

    fn rotate90_cw(&self, rgb: &RgbImage) -> PrimitiveResult<RgbImage> {
        self.inner.rotate90_cw(rgb)
    }
}

#[test]
fn stage_fault_returns_the_input_unchanged() -> Result<(), Box<dyn Error>> {
    let primitives = Faulty {
        fail_bilateral: true,
        ..Faulty::new()
    };
    let processor = FrameProcessor::with_primitives(
        primitives,
        PipelineConfig::default(),
        &TelemetryConfig::default(),
    )?;
    let input = scene(20, 10, 5);

    let result = processor.process_frame(&input);
    assert!(result.fell_back);
    assert_eq!(result.frame.as_slice(), input.as_slice());
    assert!(result.elapsed_ms > 0.0);
    assert_eq!(processor.last_elapsed_ms(), result.elapsed_ms);
    assert_eq!(result.timings.stages().last(), Some(&Stage::Denoising));
    assert!(result.timings.get(Stage::EdgeExtraction).is_none());
    assert_eq!(processor.metrics().fallbacks, 1);
    Ok(())
}

#[test]
fn planar_input_falls_back_to_the_planar_frame() -> Result<(), Box<dyn Error>> {
    let primitives = Faulty {
        fail_bilateral: true,
        ..Faulty::new()
    };
    let processor = FrameProcessor::with_primitives(
        primitives,
        PipelineConfig::default(),
        &TelemetryConfig::default(),
    )?;
    let (w, h) = (16, 12);
    let input = Frame::new(
        Bytes::from(nv21_pattern(w, h, 7)),
        w,
        h,
        PixelFormat::Yuv420SemiPlanar,
    )?;

    let result = processor.process_frame(&input);
    assert!(result.fell_back);
    assert_eq!(result.frame.format(), PixelFormat::Yuv420SemiPlanar);
    assert_eq!((result.frame.width(), result.frame.height()), (w, h));
    assert_eq!(result.frame.as_slice(), input.as_slice());
    assert_eq!(result.timings.stages().first(), Some(&Stage::FormatConversion));
    Ok(())
}

#[test]
fn panicking_primitive_falls_back() -> Result<(), Box<dyn Error>> {
    let primitives = Faulty {
        panic_in_canny: true,
        ..Faulty::new()
    };
    let processor = FrameProcessor::with_primitives(
        primitives,
        PipelineConfig::default(),
        &TelemetryConfig::default(),
    )?;
    let input = scene(12, 12, 9);

    let result = processor.process_frame(&input);
    assert!(result.fell_back);
    assert_eq!(result.frame.as_slice(), input.as_slice());

    // The processor stays usable after the panic.
    let again = processor.process_frame(&input);
    assert!(again.fell_back);
    Ok(())
}

#[test]
fn invalid_contrast_handle_is_recreated() -> Result<(), Box<dyn Error>> {
    let primitives = Faulty::new();
    let created = Arc::clone(&primitives.equalizers_created);
    let processor = FrameProcessor::with_primitives(
        primitives,
        PipelineConfig::default(),
        &TelemetryConfig::default(),
    )?;

    for _ in 0..3 {
        assert!(!processor.process_frame(&scene(8, 8, 2)).fell_back);
    }
    assert_eq!(created.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn repeated_frames_give_identical_output() -> Result<(), Box<dyn Error>> {
    let processor = FrameProcessor::new(PipelineConfig::default())?;
    let input = scene(16, 16, 4);
    let a = processor.process_frame(&input);
    let b = processor.process_frame(&input);
    assert_eq!(a.frame.as_slice(), b.frame.as_slice());
    Ok(())
}
