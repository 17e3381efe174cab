pub mod latency;
pub mod processor;
pub mod quality;
pub mod stages;

pub use latency::{FpsCounter, LatencyWindow};
pub use processor::{FrameProcessor, ProcessingResult};
pub use quality::{QualityController, QualityTier, StageSet};
pub use stages::{EnhancementPipeline, StageTimings};
