//! FFI interface for host interop
//!
//! Provides C-compatible functions for running extraction configurations.
//! Configurations and results cross the boundary as JSON text.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use crate::config::ConfigNode;
use crate::engine::Extractor;
use crate::extractors::filter_jsonp;

/// Result struct returned to the host
/// Both pointers are owned by Rust and must be freed via free_extraction_result
#[repr(C)]
pub struct ExtractionResultFFI {
    /// JSON-serialized result (null-terminated), `null` when nothing was extracted
    pub json_ptr: *mut c_char,
    /// Error message if extraction failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Evaluate an extraction configuration against a document.
///
/// # Arguments
/// * `config_json` - JSON configuration tree (null-terminated)
/// * `body_ptr` - Pointer to the document bytes (not necessarily null-terminated)
/// * `body_len` - Length of the document in bytes
///
/// # Returns
/// ExtractionResultFFI with either json_ptr set (success) or error_ptr set (failure)
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string
/// - `body_ptr` must point to valid memory of at least `body_len` bytes
/// - Caller must free the result via `free_extraction_result`
#[no_mangle]
pub unsafe extern "C" fn extract_ffi(
    config_json: *const c_char,
    body_ptr: *const u8,
    body_len: usize,
) -> ExtractionResultFFI {
    let config_str = match c_str(config_json, "Configuration JSON") {
        Ok(s) => s,
        Err(msg) => return make_error_result(&msg),
    };

    let config = match ConfigNode::from_json_str(config_str) {
        Ok(c) => c,
        Err(e) => return make_error_result(&e.to_string()),
    };

    let body = if body_ptr.is_null() || body_len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(body_ptr, body_len)
    };

    match Extractor::default().try_extract(&config, body) {
        Ok(value) => make_json_result(value.to_string()),
        Err(e) => make_error_result(&e.to_string()),
    }
}

/// Strip a JSONP wrapper from text (convenience function)
///
/// # Safety
/// - `text` must be a valid null-terminated C string
/// - Caller must free the result via `free_extraction_result`
#[no_mangle]
pub unsafe extern "C" fn filter_jsonp_ffi(text: *const c_char) -> ExtractionResultFFI {
    match c_str(text, "Text") {
        Ok(s) => make_json_result(filter_jsonp(s).to_string()),
        Err(msg) => make_error_result(&msg),
    }
}

/// Free an ExtractionResultFFI returned by this module
///
/// # Safety
/// - `result` must have been returned by `extract_ffi` or `filter_jsonp_ffi`
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_extraction_result(result: ExtractionResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err(format!("{what} is null"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| format!("Invalid UTF-8 in {}", what.to_lowercase()))
}

fn make_json_result(json: String) -> ExtractionResultFFI {
    match CString::new(json) {
        Ok(cstr) => ExtractionResultFFI {
            json_ptr: cstr.into_raw(),
            error_ptr: ptr::null_mut(),
        },
        Err(_) => make_error_result("Result contains null bytes"),
    }
}

// Helper to create error result
fn make_error_result(msg: &str) -> ExtractionResultFFI {
    let error_cstr = CString::new(msg)
        .or_else(|_| CString::new(msg.replace('\0', "")))
        .unwrap_or_default();
    ExtractionResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}
