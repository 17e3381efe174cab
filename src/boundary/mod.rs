//! Copy-in / copy-out marshalling for callers outside the crate.
//!
//! Caller memory is never kept: [`to_frame`] copies into processor-owned
//! `Bytes` before any work, [`from_frame`] copies into a fresh `Vec`.

pub mod engine;
pub mod ffi;

use bytes::Bytes;

use crate::capture::frame::{Frame, PixelFormat};
use crate::error::{Error, Result};

pub use engine::{ConvertedFrame, Engine};

/// Validate `raw` against the declared geometry and copy it in.
pub fn to_frame(raw: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Frame> {
    let expected = format.check_dimensions(width, height)?;
    if raw.len() != expected {
        return Err(Error::InvalidBufferSize {
            expected,
            actual: raw.len(),
        });
    }
    Frame::new(Bytes::copy_from_slice(raw), width, height, format)
}

/// Copy a frame out into a caller-owned buffer.
pub fn from_frame(frame: &Frame) -> Vec<u8> {
    frame.as_slice().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_in_does_not_alias_caller_memory() {
        let mut raw = vec![9u8; 12];
        let frame = to_frame(&raw, 2, 2, PixelFormat::Rgb888).unwrap();
        raw.fill(0);
        assert!(frame.as_slice().iter().all(|&b| b == 9));
    }

    #[test]
    fn size_is_checked_before_copy() {
        let err = to_frame(&[0u8; 11], 2, 2, PixelFormat::Rgb888).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidBufferSize {
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn copy_out_round_trips_bytes() {
        let raw: Vec<u8> = (0..12).collect();
        let frame = to_frame(&raw, 2, 2, PixelFormat::Rgb888).unwrap();
        assert_eq!(from_frame(&frame), raw);
    }
}
