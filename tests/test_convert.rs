use std::error::Error;

use edgelens::boundary::Engine;
use edgelens::capture::synthetic::nv21_pattern;
use edgelens::capture::{convert, PixelFormat};
use edgelens::primitives::SoftwarePrimitives;
use edgelens::Error as EdgeError;

fn rgb_at(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 3] {
    let i = ((y * width + x) * 3) as usize;
    [bytes[i], bytes[i + 1], bytes[i + 2]]
}

#[test]
fn rotation_swaps_geometry_and_keeps_size() -> Result<(), Box<dyn Error>> {
    let engine = Engine::default();
    for (w, h) in [(2, 2), (8, 4), (640, 480)] {
        let buf = nv21_pattern(w, h, 3);

        let upright = engine.convert_planar_to_rgb(&buf, w, h, w, false)?;
        assert_eq!((upright.width, upright.height), (w, h));
        assert_eq!(upright.bytes.len(), (w * h * 3) as usize);

        let rotated = engine.convert_planar_to_rgb(&buf, w, h, w, true)?;
        assert_eq!((rotated.width, rotated.height), (h, w));
        assert_eq!(rotated.bytes.len(), (w * h * 3) as usize);
    }
    Ok(())
}

#[test]
fn rotated_pixels_match_upright_pixels() -> Result<(), Box<dyn Error>> {
    let engine = Engine::default();
    let (w, h) = (16, 10);
    let buf = nv21_pattern(w, h, 9);
    let upright = engine.convert_planar_to_rgb(&buf, w, h, 0, false)?;
    let rotated = engine.convert_planar_to_rgb(&buf, w, h, 0, true)?;

    // Clockwise: upright (x, y) lands at (h - 1 - y, x).
    for y in 0..h {
        for x in 0..w {
            assert_eq!(
                rgb_at(&upright.bytes, w, x, y),
                rgb_at(&rotated.bytes, h, h - 1 - y, x),
                "pixel ({x}, {y})"
            );
        }
    }
    Ok(())
}

#[test]
fn neutral_chroma_gives_gray() -> Result<(), Box<dyn Error>> {
    let (w, h) = (4, 4);
    let mut buf = vec![126u8; (w * h) as usize];
    buf.extend(std::iter::repeat(128u8).take((w * h / 2) as usize));
    let frame = convert(&SoftwarePrimitives, &buf, w, h, PixelFormat::Yuv420SemiPlanar, false)?;
    assert!(frame.as_slice().iter().all(|&b| b == 128));
    Ok(())
}

#[test]
fn padded_rows_convert_like_packed_rows() -> Result<(), Box<dyn Error>> {
    let engine = Engine::default();
    let (w, h, stride) = (6u32, 4u32, 8u32);
    let packed = nv21_pattern(w, h, 1);

    let mut padded = Vec::new();
    for row in packed.chunks_exact(w as usize) {
        padded.extend_from_slice(row);
        padded.extend_from_slice(&[0xEE; 2]);
    }
    assert_eq!(padded.len(), (stride * h * 3 / 2) as usize);

    let a = engine.convert_planar_to_rgb(&packed, w, h, w, true)?;
    let b = engine.convert_planar_to_rgb(&padded, w, h, stride, true)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn wrong_length_is_rejected() {
    let engine = Engine::default();
    let err = engine
        .convert_planar_to_rgb(&[0u8; 23], 4, 4, 4, false)
        .unwrap_err();
    assert!(matches!(
        err,
        EdgeError::InvalidBufferSize {
            expected: 24,
            actual: 23
        }
    ));
}

#[test]
fn stride_narrower_than_width_is_rejected() {
    let engine = Engine::default();
    let err = engine
        .convert_planar_to_rgb(&[0u8; 24], 4, 4, 2, false)
        .unwrap_err();
    assert!(matches!(err, EdgeError::InvalidStride { .. }));
}

#[test]
fn odd_geometry_is_rejected() {
    let engine = Engine::default();
    let err = engine
        .convert_planar_to_rgb(&[0u8; 15], 5, 2, 5, false)
        .unwrap_err();
    assert!(matches!(err, EdgeError::InvalidDimensions { .. }));
}

#[test]
fn conversion_feeds_the_processor() -> Result<(), Box<dyn Error>> {
    let engine = Engine::default();
    assert!(engine.initialize());
    let (w, h) = (32, 24);
    let rgb = engine.convert_planar_to_rgb(&nv21_pattern(w, h, 5), w, h, w, true)?;
    let out = engine.process_frame(&rgb.bytes, rgb.width, rgb.height, true)?;
    assert_eq!(out.len(), rgb.bytes.len());
    Ok(())
}
