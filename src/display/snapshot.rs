//! PNG snapshots of processed frames

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{GrayImage, RgbImage};
use tracing::{debug, instrument};

use crate::capture::frame::{Frame, PixelFormat};
use crate::error::{Error, PrimitiveError, Result};

/// Writes every `every`-th frame it is offered into `dir`.
pub struct SnapshotWriter {
    dir: PathBuf,
    every: u32,
    offered: u64,
    written: u64,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, every: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            every: every.max(1),
            offered: 0,
            written: 0,
        })
    }

    /// Returns the written path when this frame was due.
    pub fn offer(&mut self, frame: &Frame) -> Result<Option<PathBuf>> {
        self.offered += 1;
        if (self.offered - 1) % self.every as u64 != 0 {
            return Ok(None);
        }
        let path = self
            .dir
            .join(format!("frame_{:06}.png", frame.meta.sequence));
        write_png(frame, &path)?;
        self.written += 1;
        Ok(Some(path))
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Encode an `Rgb888` or `Gray8` frame as PNG.
#[instrument(skip(frame), fields(seq = frame.meta.sequence))]
pub fn write_png(frame: &Frame, path: &Path) -> Result<()> {
    let start = Instant::now();
    let (w, h) = (frame.width(), frame.height());
    let data = frame.as_slice().to_vec();

    match frame.format() {
        PixelFormat::Rgb888 => RgbImage::from_raw(w, h, data)
            .ok_or(Error::InvalidDimensions { width: w, height: h })?
            .save(path)?,
        PixelFormat::Gray8 => GrayImage::from_raw(w, h, data)
            .ok_or(Error::InvalidDimensions { width: w, height: h })?
            .save(path)?,
        PixelFormat::Yuv420SemiPlanar => {
            return Err(Error::Primitive(PrimitiveError::UnsupportedLayout(
                "snapshots need rgb888 or gray8".into(),
            )));
        }
    }

    metrics::histogram!("edgelens_snapshot_ms").record(start.elapsed().as_secs_f64() * 1000.0);
    debug!(path = %path.display(), "snapshot written");
    Ok(())
}
