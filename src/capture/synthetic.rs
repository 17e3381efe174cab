//! Synthetic NV21 camera source for the demo host, benches and tests.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{info, instrument};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::Result;

/// Produces NV21 frames with a moving bright square over a luma ramp.
pub struct SyntheticCapture {
    width: u32,
    height: u32,
    period: Duration,
    ticker: Option<Interval>,
    sequence: u64,
}

impl SyntheticCapture {
    pub fn new(width: u32, height: u32, fps: u32) -> Result<Self> {
        PixelFormat::Yuv420SemiPlanar.check_dimensions(width, height)?;
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        info!(width, height, fps, "synthetic capture ready");

        Ok(Self {
            width,
            height,
            period,
            ticker: None,
            sequence: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Wait for the next frame slot, then produce a frame.
    ///
    /// Late ticks are skipped rather than bursted, like a real sensor.
    #[instrument(skip(self))]
    pub async fn capture_frame(&mut self) -> Frame {
        let period = self.period;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        ticker.tick().await;
        self.next_frame()
    }

    /// Produce the next frame immediately.
    pub fn next_frame(&mut self) -> Frame {
        self.sequence += 1;
        let data = nv21_pattern(self.width, self.height, self.sequence);
        Frame {
            data: Bytes::from(data),
            meta: FrameMetadata {
                sequence: self.sequence,
                width: self.width,
                height: self.height,
                format: PixelFormat::Yuv420SemiPlanar,
            },
            timestamp: Instant::now(),
        }
    }
}

/// NV21 test pattern for frame `seq`. `width` and `height` must be even.
pub fn nv21_pattern(width: u32, height: u32, seq: u64) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut data = Vec::with_capacity(w * h * 3 / 2);

    let side = (w.min(h) / 4).max(2);
    let travel = w.saturating_sub(side).max(1);
    let left = (seq as usize * 4) % travel;
    let top = h.saturating_sub(side) / 2;

    for y in 0..h {
        for x in 0..w {
            let ramp = 32 + (x * 96 / w.max(1)) as u8;
            let inside = (left..left + side).contains(&x) && (top..top + side).contains(&y);
            data.push(if inside { 220 } else { ramp });
        }
    }

    // Interleaved V, U at half resolution.
    for y in 0..h / 2 {
        for x in 0..w / 2 {
            data.push(128 + ((y * 32) / (h / 2).max(1)) as u8);
            data.push(128 - ((x * 32) / (w / 2).max(1)) as u8);
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_semi_planar_size_and_advance() {
        let mut cam = SyntheticCapture::new(16, 8, 30).unwrap();
        let a = cam.next_frame();
        let b = cam.next_frame();
        assert_eq!(a.len(), 16 * 8 * 3 / 2);
        assert_eq!(a.format(), PixelFormat::Yuv420SemiPlanar);
        assert_eq!(b.meta.sequence, a.meta.sequence + 1);
        assert!(b.timestamp >= a.timestamp);
    }

    #[test]
    fn rejects_odd_geometry() {
        assert!(SyntheticCapture::new(15, 8, 30).is_err());
    }

    #[tokio::test]
    async fn paced_capture_produces_frames() {
        let mut cam = SyntheticCapture::new(8, 8, 1000).unwrap();
        let frame = cam.capture_frame().await;
        assert_eq!(frame.meta.sequence, 1);
    }
}
