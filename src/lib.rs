pub mod boundary;
pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod primitives;
pub mod utils;

use std::path::{Path, PathBuf};

use config::{Environment, File};
use serde::{Deserialize, Serialize};

pub use capture::frame::{Frame, FrameMetadata, PixelFormat};
pub use error::{Error, PrimitiveError, Result, Stage, StageFault};
pub use pipeline::{FrameProcessor, ProcessingResult, QualityTier};
pub use primitives::TileGrid;

/// Environment prefix for settings overrides, e.g.
/// `EDGELENS__PIPELINE__QUALITY_TIER=high`.
pub const ENV_PREFIX: &str = "EDGELENS";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub telemetry: TelemetryConfig,
    pub demo: DemoConfig,
}

impl Settings {
    /// Defaults, then the optional TOML file at `path`, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.pipeline.validate()?;
        Ok(settings)
    }
}

/// Settings read by every frame. Swapped atomically, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quality_tier: QualityTier,
    pub canny_low_threshold: f32,
    pub canny_high_threshold: f32,
    pub clahe_clip_limit: f32,
    pub clahe_tile_grid: TileGrid,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let (low, high) = (self.canny_low_threshold, self.canny_high_threshold);
        if !(low.is_finite() && high.is_finite()) || low < 0.0 || low > high {
            return Err(Error::InvalidConfig(format!(
                "edge thresholds must satisfy 0 <= low <= high, got {low} / {high}"
            )));
        }
        if !(self.clahe_clip_limit.is_finite() && self.clahe_clip_limit > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "clahe clip limit must be positive, got {}",
                self.clahe_clip_limit
            )));
        }
        let TileGrid { cols, rows } = self.clahe_tile_grid;
        if cols == 0 || rows == 0 {
            return Err(Error::InvalidConfig(format!(
                "clahe tile grid must be at least 1x1, got {cols}x{rows}"
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_tier: QualityTier::Normal,
            canny_low_threshold: 50.0,
            canny_high_threshold: 150.0,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: TileGrid::new(8, 8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Number of recent frame latencies kept for avg/p50/p99
    pub latency_window: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            latency_window: 120,
        }
    }
}

/// Demo host settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Stop after this many frames; 0 runs until Ctrl-C
    pub frames: u64,
    pub rotate: bool,
    pub edge_detection: bool,
    pub channel_capacity: usize,
    pub worker_core: Option<usize>,
    pub snapshot_dir: Option<PathBuf>,
    /// Write every Nth processed frame; 0 disables snapshots
    pub snapshot_every: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            frames: 300,
            rotate: true,
            edge_detection: true,
            channel_capacity: 4,
            worker_core: None,
            snapshot_dir: None,
            snapshot_every: 0,
        }
    }
}

/// Processor statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub frames: u64,
    pub fallbacks: u64,
    pub passthrough: u64,
    pub last_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p99_latency_ms: f64,
}
