//! Host-facing operations on an explicitly owned processor handle.

use once_cell::sync::OnceCell;
use tracing::{error, info, warn};

use crate::boundary::{from_frame, to_frame};
use crate::capture::convert::convert_planar;
use crate::capture::frame::PixelFormat;
use crate::error::{Error, Result};
use crate::pipeline::{FrameProcessor, QualityTier};
use crate::primitives::{Primitives, SoftwarePrimitives};
use crate::{Metrics, PipelineConfig, Settings, TelemetryConfig};

/// Interleaved RGB output of [`Engine::convert_planar_to_rgb`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One processor instance, created and destroyed by the host.
///
/// The processor itself is built lazily by [`initialize`](Self::initialize);
/// frame calls before that fail with [`Error::UninitializedProcessor`].
pub struct Engine<P: Primitives + Clone = SoftwarePrimitives> {
    primitives: P,
    config: PipelineConfig,
    telemetry: TelemetryConfig,
    processor: OnceCell<FrameProcessor<P>>,
}

impl Engine<SoftwarePrimitives> {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_primitives(SoftwarePrimitives, settings)
    }
}

impl Default for Engine<SoftwarePrimitives> {
    fn default() -> Self {
        Self {
            primitives: SoftwarePrimitives,
            config: PipelineConfig::default(),
            telemetry: TelemetryConfig::default(),
            processor: OnceCell::new(),
        }
    }
}

impl<P: Primitives + Clone> Engine<P> {
    pub fn with_primitives(primitives: P, settings: &Settings) -> Result<Self> {
        settings.pipeline.validate()?;
        Ok(Self {
            primitives,
            config: settings.pipeline.clone(),
            telemetry: settings.telemetry.clone(),
            processor: OnceCell::new(),
        })
    }

    /// Create the processor if absent. Safe to call repeatedly.
    pub fn initialize(&self) -> bool {
        let created = self.processor.get_or_try_init(|| {
            FrameProcessor::with_primitives(
                self.primitives.clone(),
                self.config.clone(),
                &self.telemetry,
            )
        });
        match created {
            Ok(_) => true,
            Err(err) => {
                error!(%err, "processor initialization failed");
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.processor.get().is_some()
    }

    /// Process one RGB888 frame.
    ///
    /// With `apply_edge_detection == false` the input bytes come back
    /// unchanged and no stage runs. Stage faults are absorbed (the input is
    /// returned); only size and initialization errors reach the caller.
    pub fn process_frame(
        &self,
        bytes: &[u8],
        width: u32,
        height: u32,
        apply_edge_detection: bool,
    ) -> Result<Vec<u8>> {
        let processor = self.processor()?;
        let frame = to_frame(bytes, width, height, PixelFormat::Rgb888)?;
        let result = if apply_edge_detection {
            processor.process_frame(&frame)
        } else {
            processor.passthrough(&frame)
        };
        Ok(from_frame(&result.frame))
    }

    /// NV21 to interleaved RGB, optionally rotated 90° clockwise.
    ///
    /// Needs no processor; conversion faults are returned as
    /// [`Error::Primitive`] because there is nothing to fall back to.
    pub fn convert_planar_to_rgb(
        &self,
        bytes: &[u8],
        width: u32,
        height: u32,
        row_stride: u32,
        rotate: bool,
    ) -> Result<ConvertedFrame> {
        let frame = convert_planar(&self.primitives, bytes, width, height, row_stride, rotate)?;
        Ok(ConvertedFrame {
            bytes: from_frame(&frame),
            width: frame.width(),
            height: frame.height(),
        })
    }

    /// `0.0` until a processor exists and has handled a frame.
    pub fn last_processing_time_millis(&self) -> f64 {
        self.processor
            .get()
            .map_or(0.0, FrameProcessor::last_elapsed_ms)
    }

    /// Switch tier by ordinal (0 fast, 1 normal, 2 high). Anything else is
    /// rejected and the current tier stays.
    pub fn set_quality_level(&self, level: i32) -> Result<QualityTier> {
        let processor = self.processor()?;
        processor.set_quality_level(level as i64)
    }

    pub fn quality_tier(&self) -> Option<QualityTier> {
        self.processor.get().map(FrameProcessor::tier)
    }

    pub fn metrics(&self) -> Option<Metrics> {
        self.processor.get().map(FrameProcessor::metrics)
    }

    pub fn processor(&self) -> Result<&FrameProcessor<P>> {
        self.processor.get().ok_or_else(|| {
            warn!("frame call before initialize()");
            Error::UninitializedProcessor
        })
    }
}

impl<P: Primitives + Clone> Drop for Engine<P> {
    fn drop(&mut self) {
        if let Some(processor) = self.processor.get() {
            let m = processor.metrics();
            info!(
                frames = m.frames,
                fallbacks = m.fallbacks,
                avg_latency_ms = m.avg_latency_ms,
                "processor destroyed"
            );
        }
    }
}
