//! The ordered edge-enhancement path.
//!
//! contrast normalization -> sharpening (tier-gated) -> denoising ->
//! edge extraction -> morphological refinement -> color restore.
//!
//! Every stage consumes only the previous stage's output and reports a
//! [`StageFault`] instead of a partial frame.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use image::{GrayImage, RgbImage};
use tracing::debug;

use crate::error::{PrimitiveError, Stage, StageFault};
use crate::pipeline::quality::StageSet;
use crate::primitives::{
    panic_message, CannyParams, ContrastEqualizer, MorphOp, PrimitiveResult, Primitives,
    StructuringElement,
};
use crate::PipelineConfig;

const DILATE_SIZE: u32 = 3;
const CLOSE_SIZE: u32 = 5;
const OPEN_SIZE: u32 = 3;

const SHARPEN_GAIN: f32 = 1.5;
const BLUR_WEIGHT: f32 = 0.5;

/// Wall-clock cost of each stage that ran, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    entries: Vec<(Stage, Duration)>,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.entries.push((stage, elapsed));
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, d)| *d).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, Duration)> + '_ {
        self.entries.iter().copied()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.entries.iter().map(|(s, _)| *s).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the primitives backend and the reusable contrast handle.
pub struct EnhancementPipeline<P: Primitives> {
    primitives: P,
    equalizer: Option<P::Equalizer>,
    dilate_element: StructuringElement,
    close_element: StructuringElement,
    open_element: StructuringElement,
}

impl<P: Primitives> EnhancementPipeline<P> {
    pub fn new(primitives: P) -> Self {
        Self {
            primitives,
            equalizer: None,
            dilate_element: StructuringElement::ellipse(DILATE_SIZE, DILATE_SIZE),
            close_element: StructuringElement::ellipse(CLOSE_SIZE, CLOSE_SIZE),
            open_element: StructuringElement::ellipse(OPEN_SIZE, OPEN_SIZE),
        }
    }

    pub fn primitives(&self) -> &P {
        &self.primitives
    }

    pub fn has_equalizer(&self) -> bool {
        self.equalizer.is_some()
    }

    /// Run the full stage sequence on a grayscale frame.
    pub fn run(
        &mut self,
        gray: &GrayImage,
        stages: &StageSet,
        config: &PipelineConfig,
        timings: &mut StageTimings,
    ) -> Result<RgbImage, StageFault> {
        let normalized = timed(timings, Stage::ContrastNormalization, || {
            self.normalize(gray, config)
        })?;

        let sharpened = if stages.sharpen {
            timed(timings, Stage::Sharpening, || {
                sharpen(&self.primitives, &normalized, stages.sharpen_sigma)
            })?
        } else {
            normalized
        };

        let denoised = timed(timings, Stage::Denoising, || {
            self.primitives.bilateral_filter(&sharpened, &stages.bilateral)
        })?;

        let canny = CannyParams {
            low_threshold: config.canny_low_threshold,
            high_threshold: config.canny_high_threshold,
            aperture: 3,
            l2_gradient: true,
        };
        let edges = timed(timings, Stage::EdgeExtraction, || {
            self.primitives.canny(&denoised, &canny)
        })?;

        let refined = timed(timings, Stage::MorphologicalRefinement, || {
            let dilated = self
                .primitives
                .morphology(&edges, MorphOp::Dilate, &self.dilate_element)?;
            let closed = self
                .primitives
                .morphology(&dilated, MorphOp::Close, &self.close_element)?;
            self.primitives
                .morphology(&closed, MorphOp::Open, &self.open_element)
        })?;

        timed(timings, Stage::ColorRestore, || {
            self.primitives.gray_to_rgb(&refined)
        })
    }

    fn normalize(&mut self, gray: &GrayImage, config: &PipelineConfig) -> PrimitiveResult<GrayImage> {
        let stale = match &self.equalizer {
            Some(eq) => {
                !eq.is_valid()
                    || eq.clip_limit() != config.clahe_clip_limit
                    || eq.tile_grid() != config.clahe_tile_grid
            }
            None => true,
        };
        if stale {
            let eq = self
                .primitives
                .create_equalizer(config.clahe_clip_limit, config.clahe_tile_grid)?;
            debug!(
                clip_limit = config.clahe_clip_limit,
                grid = ?config.clahe_tile_grid,
                "contrast handle created"
            );
            self.equalizer = Some(eq);
        }

        let Some(eq) = self.equalizer.as_mut() else {
            return Err(PrimitiveError::Internal("contrast handle missing".into()));
        };
        let result = eq.apply(gray);
        if result.is_err() {
            // A handle that failed mid-frame is not trusted for the next one.
            self.equalizer = None;
        }
        result
    }
}

/// Unsharp mask: `1.5 * src - 0.5 * blur(src)`, saturated to `u8`.
fn sharpen<P: Primitives>(primitives: &P, src: &GrayImage, sigma: f32) -> PrimitiveResult<GrayImage> {
    let blurred = primitives.gaussian_blur(src, sigma)?;
    if blurred.dimensions() != src.dimensions() {
        return Err(PrimitiveError::Malformed(format!(
            "blur changed geometry {:?} -> {:?}",
            src.dimensions(),
            blurred.dimensions()
        )));
    }

    let mut out = GrayImage::new(src.width(), src.height());
    for ((dst, &s), &b) in out.iter_mut().zip(src.iter()).zip(blurred.iter()) {
        let v = SHARPEN_GAIN * s as f32 - BLUR_WEIGHT * b as f32;
        *dst = v.round().clamp(0.0, 255.0) as u8;
    }
    Ok(out)
}

/// Run one stage, recording its duration. A panic inside the stage is
/// reported as an internal fault of that stage.
pub(crate) fn timed<T>(
    timings: &mut StageTimings,
    stage: Stage,
    f: impl FnOnce() -> PrimitiveResult<T>,
) -> Result<T, StageFault> {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(PrimitiveError::Internal(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        )))
    });
    let elapsed = start.elapsed();
    timings.record(stage, elapsed);
    metrics::histogram!("edgelens_stage_ms", "stage" => stage.as_str())
        .record(elapsed.as_secs_f64() * 1000.0);
    result.map_err(|source| StageFault::new(stage, source))
}
