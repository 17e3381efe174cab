//! C ABI over [`Engine`].
//!
//! Handles come from `edgelens_create` and go back to `edgelens_destroy`.
//! Output buffers are allocated here and must be released with
//! `edgelens_buffer_free`. No panic unwinds across these functions.

use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use tracing::error;

use crate::boundary::Engine;
use crate::error::Error;
use crate::primitives::panic_message;

/// Status returned by every fallible entry point.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgelensStatus {
    Ok = 0,
    InvalidBufferSize = 1,
    InvalidTier = 2,
    PrimitiveFault = 3,
    UninitializedProcessor = 4,
    InvalidArgument = 5,
    Panic = 6,
}

impl From<&Error> for EdgelensStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidBufferSize { .. } => EdgelensStatus::InvalidBufferSize,
            Error::InvalidTier(_) => EdgelensStatus::InvalidTier,
            Error::Primitive(_) => EdgelensStatus::PrimitiveFault,
            Error::UninitializedProcessor => EdgelensStatus::UninitializedProcessor,
            _ => EdgelensStatus::InvalidArgument,
        }
    }
}

fn guard(what: &str, f: impl FnOnce() -> EdgelensStatus) -> EdgelensStatus {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        error!(call = what, reason = %panic_message(payload.as_ref()), "panic at C boundary");
        EdgelensStatus::Panic
    })
}

/// Hand an owned buffer to the caller.
unsafe fn export(bytes: Vec<u8>, out_data: *mut *mut u8, out_len: *mut usize) {
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len();
    *out_len = len;
    *out_data = Box::into_raw(boxed) as *mut u8;
}

/// Borrow caller input for the duration of the call.
unsafe fn input<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        return (len == 0).then_some(&[][..]);
    }
    Some(slice::from_raw_parts(data, len))
}

/// Create an engine with default settings. Returns null on failure.
#[no_mangle]
pub extern "C" fn edgelens_create() -> *mut Engine {
    panic::catch_unwind(|| Box::into_raw(Box::new(Engine::default()))).unwrap_or(ptr::null_mut())
}

/// # Safety
/// `engine` must come from `edgelens_create` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn edgelens_destroy(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    let _ = panic::catch_unwind(AssertUnwindSafe(|| drop(Box::from_raw(engine))));
}

/// # Safety
/// `engine` must be a live handle from `edgelens_create`.
#[no_mangle]
pub unsafe extern "C" fn edgelens_initialize(engine: *const Engine) -> EdgelensStatus {
    let Some(engine) = engine.as_ref() else {
        return EdgelensStatus::InvalidArgument;
    };
    guard("initialize", || {
        if engine.initialize() {
            EdgelensStatus::Ok
        } else {
            EdgelensStatus::InvalidArgument
        }
    })
}

/// Process one RGB888 frame of `width * height * 3` bytes.
///
/// On `Ok`, `*out_data` / `*out_len` hold a new buffer of the same size.
///
/// # Safety
/// `data` must point to `len` readable bytes; `out_data` and `out_len` must
/// be writable.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn edgelens_process_frame(
    engine: *const Engine,
    data: *const u8,
    len: usize,
    width: u32,
    height: u32,
    apply_edge_detection: bool,
    out_data: *mut *mut u8,
    out_len: *mut usize,
) -> EdgelensStatus {
    let Some(engine) = engine.as_ref() else {
        return EdgelensStatus::InvalidArgument;
    };
    if out_data.is_null() || out_len.is_null() {
        return EdgelensStatus::InvalidArgument;
    }
    let Some(bytes) = input(data, len) else {
        return EdgelensStatus::InvalidArgument;
    };

    guard("process_frame", || {
        match engine.process_frame(bytes, width, height, apply_edge_detection) {
            Ok(out) => {
                export(out, out_data, out_len);
                EdgelensStatus::Ok
            }
            Err(err) => EdgelensStatus::from(&err),
        }
    })
}

/// Convert an NV21 buffer to RGB888, optionally rotating 90° clockwise.
///
/// # Safety
/// `data` must point to `len` readable bytes; every `out_*` pointer must be
/// writable.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn edgelens_convert_planar_to_rgb(
    engine: *const Engine,
    data: *const u8,
    len: usize,
    width: u32,
    height: u32,
    row_stride: u32,
    rotate: bool,
    out_data: *mut *mut u8,
    out_len: *mut usize,
    out_width: *mut u32,
    out_height: *mut u32,
) -> EdgelensStatus {
    let Some(engine) = engine.as_ref() else {
        return EdgelensStatus::InvalidArgument;
    };
    if out_data.is_null() || out_len.is_null() || out_width.is_null() || out_height.is_null() {
        return EdgelensStatus::InvalidArgument;
    }
    let Some(bytes) = input(data, len) else {
        return EdgelensStatus::InvalidArgument;
    };

    guard("convert_planar_to_rgb", || {
        match engine.convert_planar_to_rgb(bytes, width, height, row_stride, rotate) {
            Ok(converted) => {
                *out_width = converted.width;
                *out_height = converted.height;
                export(converted.bytes, out_data, out_len);
                EdgelensStatus::Ok
            }
            Err(err) => EdgelensStatus::from(&err),
        }
    })
}

/// # Safety
/// `engine` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn edgelens_last_processing_time_ms(engine: *const Engine) -> f64 {
    engine
        .as_ref()
        .map_or(0.0, Engine::last_processing_time_millis)
}

/// # Safety
/// `engine` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn edgelens_set_quality_level(engine: *const Engine, level: i32) -> EdgelensStatus {
    let Some(engine) = engine.as_ref() else {
        return EdgelensStatus::InvalidArgument;
    };
    guard("set_quality_level", || match engine.set_quality_level(level) {
        Ok(_) => EdgelensStatus::Ok,
        Err(err) => EdgelensStatus::from(&err),
    })
}

/// # Safety
/// `data` / `len` must be exactly a pair returned through an `out_data` /
/// `out_len` of this library, freed at most once.
#[no_mangle]
pub unsafe extern "C" fn edgelens_buffer_free(data: *mut u8, len: usize) {
    if data.is_null() {
        return;
    }
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(data, len)));
}
