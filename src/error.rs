//! Error types shared by the converter, the pipeline and the boundary.

use std::fmt;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Caller-visible failures.
///
/// `InvalidBufferSize` and `UninitializedProcessor` always reach the caller.
/// `Primitive` faults raised inside the frame processor are absorbed there and
/// only surface from operations that have no fallback (format conversion).
#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer length mismatch: expected {expected} bytes, got {actual}")]
    InvalidBufferSize { expected: usize, actual: usize },

    #[error("unsupported frame geometry {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("row stride {row_stride} is smaller than frame width {width}")]
    InvalidStride { width: u32, row_stride: u32 },

    #[error("invalid quality level {0} (must be 0, 1 or 2)")]
    InvalidTier(i64),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Primitive(#[from] PrimitiveError),

    #[error("processor used before initialize()")]
    UninitializedProcessor,

    #[error("failed to load settings: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Failure reported by the image-primitives backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    #[error("malformed image: {0}")]
    Malformed(String),

    #[error("unsupported channel layout: {0}")]
    UnsupportedLayout(String),

    #[error("unsupported parameters: {0}")]
    Unsupported(String),

    #[error("primitive library internal error: {0}")]
    Internal(String),
}

/// Named stages of the enhancement path, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    FormatConversion,
    Grayscale,
    ContrastNormalization,
    Sharpening,
    Denoising,
    EdgeExtraction,
    MorphologicalRefinement,
    ColorRestore,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::FormatConversion => "format_conversion",
            Stage::Grayscale => "grayscale",
            Stage::ContrastNormalization => "contrast_normalization",
            Stage::Sharpening => "sharpening",
            Stage::Denoising => "denoising",
            Stage::EdgeExtraction => "edge_extraction",
            Stage::MorphologicalRefinement => "morphological_refinement",
            Stage::ColorRestore => "color_restore",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive failure tagged with the stage that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stage '{stage}' failed: {source}")]
pub struct StageFault {
    pub stage: Stage,
    #[source]
    pub source: PrimitiveError,
}

impl StageFault {
    pub fn new(stage: Stage, source: PrimitiveError) -> Self {
        Self { stage, source }
    }
}
