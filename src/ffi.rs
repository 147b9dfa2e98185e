//! FFI bindings for Sleepwatch
//!
//! This module provides C-compatible functions for scoring readings from the
//! device gateway and dashboard runtimes. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `sleepwatch_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::Utc;

use crate::config::ScoringConfig;
use crate::control::Outbox;
use crate::pipeline::{score_reading_json, SleepProcessor};
use crate::scoring::{aggregate, WeightVector};
use crate::store::MemoryStore;
use crate::types::{Measurement, ScoringInput};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Score one reading and return its outward JSON record.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `sleepwatch_free_string`.
/// - Returns NULL on error; call `sleepwatch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_score_json(json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match score_reading_json(&json_str) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Score resolved channel values with the default weights.
///
/// # Safety
/// - Safe to call with any values.
/// - Returns -1.0 if any value is not finite; call `sleepwatch_last_error`
///   for the offending channel.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_score_value(
    heart_rate: f64,
    motion: f64,
    temp: f64,
    humid: f64,
    sound: f64,
    light: f64,
) -> f64 {
    clear_last_error();

    let channels = [
        ("heartRate", heart_rate),
        ("motion", motion),
        ("temp", temp),
        ("humid", humid),
        ("sound", sound),
        ("light", light),
    ];
    if let Some((name, _)) = channels.iter().find(|(_, v)| !v.is_finite()) {
        set_last_error(&format!("Non-finite value for {name}"));
        return -1.0;
    }

    let input = ScoringInput {
        heart_rate,
        motion,
        temp,
        humid,
        sound,
        light,
    };
    aggregate(&input, &WeightVector::default())
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to an in-memory SleepProcessor
pub struct SleepProcessorHandle {
    processor: SleepProcessor<MemoryStore, Outbox>,
}

/// Create a processor backed by an in-memory store.
///
/// # Safety
/// - `config_json` may be NULL for the default configuration, otherwise it
///   must be a valid null-terminated C string.
/// - Must be freed with `sleepwatch_processor_free`.
/// - Returns NULL on error; call `sleepwatch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_processor_new(
    config_json: *const c_char,
) -> *mut SleepProcessorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        ScoringConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match ScoringConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match SleepProcessor::new(config, MemoryStore::new(), Outbox::new()) {
        Ok(processor) => Box::into_raw(Box::new(SleepProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `sleepwatch_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_processor_free(processor: *mut SleepProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Ingest a payload received on a device topic and return the stored point.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `sleepwatch_processor_new`.
/// - `topic` and `payload` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `sleepwatch_free_string`.
/// - Returns NULL on error; call `sleepwatch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_processor_ingest(
    processor: *mut SleepProcessorHandle,
    topic: *const c_char,
    payload: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let topic_str = match cstr_to_string(topic) {
        Some(s) => s,
        None => {
            set_last_error("Invalid topic string pointer");
            return ptr::null_mut();
        }
    };

    let payload_str = match cstr_to_string(payload) {
        Some(s) => s,
        None => {
            set_last_error("Invalid payload string pointer");
            return ptr::null_mut();
        }
    };

    let point = match handle
        .processor
        .ingest(&topic_str, &payload_str, Utc::now())
    {
        Ok(point) => point,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&point) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Latest record of a measurement in outward form, or the JSON literal
/// `null` when nothing has been stored.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `sleepwatch_processor_new`.
/// - `measurement` must be a valid null-terminated C string naming a topic.
/// - Returns a newly allocated string that must be freed with `sleepwatch_free_string`.
/// - Returns NULL on error; call `sleepwatch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_processor_latest(
    processor: *mut SleepProcessorHandle,
    measurement: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    let measurement = match cstr_to_string(measurement) {
        Some(s) => match Measurement::from_topic(&s) {
            Ok(m) => m,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => {
            set_last_error("Invalid measurement string pointer");
            return ptr::null_mut();
        }
    };

    match handle.processor.latest(measurement) {
        Ok(value) => {
            let json = value.map(|v| v.to_string()).unwrap_or_else(|| "null".into());
            string_to_cstr(&json)
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Sleepwatch functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Sleepwatch function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Sleepwatch function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn sleepwatch_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
