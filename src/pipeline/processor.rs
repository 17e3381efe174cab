//! Frame processor: timing, settings snapshots and the passthrough fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use image::{GrayImage, RgbImage};
use tracing::{debug, info, instrument, warn};

use crate::capture::frame::{Frame, PixelFormat};
use crate::error::{PrimitiveError, Result, Stage, StageFault};
use crate::pipeline::latency::LatencyWindow;
use crate::pipeline::quality::{QualityController, QualityTier, StageSet};
use crate::pipeline::stages::{timed, EnhancementPipeline, StageTimings};
use crate::primitives::{Primitives, SoftwarePrimitives};
use crate::{Metrics, PipelineConfig, TelemetryConfig};

/// Output of one [`FrameProcessor::process_frame`] call.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Edge frame (`Rgb888`, input geometry), or the untouched input on fallback
    pub frame: Frame,
    pub elapsed_ms: f64,
    pub tier: QualityTier,
    pub timings: StageTimings,
    pub fell_back: bool,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    fallbacks: AtomicU64,
    passthrough: AtomicU64,
}

/// Long-lived processor state.
///
/// Settings live in a [`QualityController`] and are snapshotted at the start
/// of every call. The pipeline (and its contrast handle) sits behind a mutex
/// held for the whole call, so concurrent callers are serialized rather than
/// sharing scratch state.
pub struct FrameProcessor<P: Primitives = SoftwarePrimitives> {
    controller: QualityController,
    pipeline: Mutex<EnhancementPipeline<P>>,
    last_elapsed_ms: AtomicU64,
    latencies: Mutex<LatencyWindow>,
    counters: Counters,
}

impl FrameProcessor<SoftwarePrimitives> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_primitives(SoftwarePrimitives, config, &TelemetryConfig::default())
    }
}

impl<P: Primitives> FrameProcessor<P> {
    pub fn with_primitives(
        primitives: P,
        config: PipelineConfig,
        telemetry: &TelemetryConfig,
    ) -> Result<Self> {
        let controller = QualityController::new(config)?;
        info!(
            tier = %controller.tier(),
            latency_window = telemetry.latency_window,
            "frame processor created"
        );

        Ok(Self {
            controller,
            pipeline: Mutex::new(EnhancementPipeline::new(primitives)),
            last_elapsed_ms: AtomicU64::new(0f64.to_bits()),
            latencies: Mutex::new(LatencyWindow::new(telemetry.latency_window)),
            counters: Counters::default(),
        })
    }

    /// Run the enhancement path on `input`.
    ///
    /// Never fails: a fault in any stage yields the original input with
    /// `fell_back` set and the time spent up to the fault.
    #[instrument(level = "debug", skip_all, fields(seq = input.meta.sequence))]
    pub fn process_frame(&self, input: &Frame) -> ProcessingResult {
        let start = Instant::now();
        let config = self.controller.snapshot();
        let stages = config.quality_tier.stages();
        let mut timings = StageTimings::default();

        let outcome = {
            let mut pipeline = self.lock_pipeline();
            enhance(&mut pipeline, input, &stages, &config, &mut timings)
        };

        let (frame, fell_back) = match outcome {
            Ok(rgb) => (Frame::from_rgb_image(rgb).with_sequence(input.meta.sequence), false),
            Err(fault) => {
                warn!(
                    stage = %fault.stage,
                    error = %fault.source,
                    tier = %stages.tier,
                    "enhancement failed, passing frame through"
                );
                metrics::counter!("edgelens_fallbacks_total").increment(1);
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                (input.clone(), true)
            }
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.record(elapsed_ms, stages.tier);
        debug!(
            elapsed_ms,
            stage_ms = timings.total().as_secs_f64() * 1000.0,
            tier = %stages.tier,
            ?timings,
            fell_back,
            "frame processed"
        );

        ProcessingResult {
            frame,
            elapsed_ms,
            tier: stages.tier,
            timings,
            fell_back,
        }
    }

    /// Hand `input` back untouched. No stage runs and the last processing
    /// time is left as is.
    pub fn passthrough(&self, input: &Frame) -> ProcessingResult {
        let start = Instant::now();
        let frame = input.clone();
        self.counters.passthrough.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("edgelens_passthrough_total").increment(1);

        ProcessingResult {
            frame,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            tier: self.controller.tier(),
            timings: StageTimings::default(),
            fell_back: false,
        }
    }

    /// Milliseconds spent by the most recent processed (or fallen back) frame.
    pub fn last_elapsed_ms(&self) -> f64 {
        f64::from_bits(self.last_elapsed_ms.load(Ordering::Relaxed))
    }

    pub fn tier(&self) -> QualityTier {
        self.controller.tier()
    }

    pub fn set_tier(&self, tier: QualityTier) {
        self.controller.set_tier(tier);
    }

    /// Ordinal tier change; invalid levels are rejected and logged.
    pub fn set_quality_level(&self, level: i64) -> Result<QualityTier> {
        self.controller.set_level(level)
    }

    pub fn configure(&self, config: PipelineConfig) -> Result<()> {
        self.controller.configure(config)
    }

    pub fn resolve(&self) -> StageSet {
        self.controller.resolve()
    }

    pub fn config(&self) -> Arc<PipelineConfig> {
        self.controller.snapshot()
    }

    pub fn metrics(&self) -> Metrics {
        let window = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        Metrics {
            frames: self.counters.frames.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            passthrough: self.counters.passthrough.load(Ordering::Relaxed),
            last_latency_ms: self.last_elapsed_ms(),
            avg_latency_ms: window.mean(),
            p50_latency_ms: window.percentile(0.50),
            p99_latency_ms: window.percentile(0.99),
        }
    }

    fn record(&self, elapsed_ms: f64, tier: QualityTier) {
        self.last_elapsed_ms
            .store(elapsed_ms.to_bits(), Ordering::Relaxed);
        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        self.latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(elapsed_ms);
        metrics::histogram!("edgelens_frame_ms", "tier" => tier.as_str()).record(elapsed_ms);
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, EnhancementPipeline<P>> {
        // Stage panics are caught while the lock is held; a stale contrast
        // handle is rebuilt on the next call anyway.
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reduce `input` to one channel, then run the stage sequence.
fn enhance<P: Primitives>(
    pipeline: &mut EnhancementPipeline<P>,
    input: &Frame,
    stages: &StageSet,
    config: &PipelineConfig,
    timings: &mut StageTimings,
) -> std::result::Result<RgbImage, StageFault> {
    let (width, height) = (input.width(), input.height());
    let primitives = pipeline.primitives();

    let gray: GrayImage = match input.format() {
        PixelFormat::Gray8 => timed(timings, Stage::Grayscale, || input.to_gray_image())?,
        PixelFormat::Rgb888 => timed(timings, Stage::Grayscale, || {
            primitives.rgb_to_gray(&input.to_rgb_image()?)
        })?,
        PixelFormat::Yuv420SemiPlanar => {
            let rgb = timed(timings, Stage::FormatConversion, || {
                primitives.nv21_to_rgb(input.as_slice(), width, height)
            })?;
            timed(timings, Stage::Grayscale, || primitives.rgb_to_gray(&rgb))?
        }
    };

    let edges = pipeline.run(&gray, stages, config, timings)?;
    if edges.dimensions() != (width, height) {
        return Err(StageFault::new(
            Stage::ColorRestore,
            PrimitiveError::Malformed(format!(
                "output is {:?}, input was {width}x{height}",
                edges.dimensions()
            )),
        ));
    }
    Ok(edges)
}
