//! FFI bindings for Kirole Sync
//!
//! C-compatible entry points for the mobile app shells. Strings are
//! null-terminated UTF-8; every returned string is allocated here and must be
//! released with `kirole_free_string`. On failure a function returns NULL (or
//! a negative number) and `kirole_last_error` describes why.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use chrono::{DateTime, Utc};

use crate::checksum::crc16;
use crate::config::SyncPolicyConfig;
use crate::daypack::DayPack;
use crate::events::decode_record;
use crate::policy::SyncPolicy;
use crate::wire::{packetize_bytes, PacketAssembler, DEFAULT_COMPLETED_HISTORY};

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

/// Borrow a caller buffer; a zero length never dereferences `data`.
unsafe fn bytes_from_raw<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        return Some(&[]);
    }
    if data.is_null() {
        return None;
    }
    Some(slice::from_raw_parts(data, len))
}

// ============================================================================
// Framing
// ============================================================================

/// CRC16-CCITT-FALSE of a buffer.
///
/// # Safety
/// - `data` must point to `len` readable bytes (may be NULL when `len` is 0).
/// - Returns the checksum (0..=65535), or -1 on a NULL buffer.
#[no_mangle]
pub unsafe extern "C" fn kirole_crc16(data: *const u8, len: usize) -> i32 {
    clear_last_error();

    match bytes_from_raw(data, len) {
        Some(bytes) => crc16(bytes) as i32,
        None => {
            set_last_error("Null data pointer");
            -1
        }
    }
}

/// Split a payload into encoded packets.
///
/// # Safety
/// - `payload` must point to `len` readable bytes (may be NULL when `len` is 0).
/// - Returns a JSON array of hex-encoded packets, to be freed with `kirole_free_string`.
/// - Returns NULL on error; call `kirole_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kirole_packetize(
    message_type: u8,
    message_id: u16,
    payload: *const u8,
    len: usize,
    max_chunk_size: usize,
) -> *mut c_char {
    clear_last_error();

    let Some(payload) = bytes_from_raw(payload, len) else {
        set_last_error("Null payload pointer");
        return ptr::null_mut();
    };

    let packets = match packetize_bytes(message_type, message_id, payload, max_chunk_size) {
        Ok(packets) => packets,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let hex: Vec<String> = packets.iter().map(hex::encode).collect();
    match serde_json::to_string(&hex) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Assembler API
// ============================================================================

/// Opaque handle to a PacketAssembler
pub struct AssemblerHandle {
    assembler: PacketAssembler,
}

/// Create an assembler remembering `history` completed messages.
///
/// # Safety
/// - Returns a pointer to a newly allocated assembler.
/// - Must be freed with `kirole_assembler_free`.
#[no_mangle]
pub unsafe extern "C" fn kirole_assembler_new(history: i32) -> *mut AssemblerHandle {
    clear_last_error();

    let history = if history < 0 {
        DEFAULT_COMPLETED_HISTORY
    } else {
        history as usize
    };

    Box::into_raw(Box::new(AssemblerHandle {
        assembler: PacketAssembler::with_history(history),
    }))
}

/// Feed one received packet.
///
/// # Safety
/// - `assembler` must be a valid pointer returned by `kirole_assembler_new`.
/// - `data` must point to `len` readable bytes.
/// - Returns `{"message_type", "message_id", "payload"}` JSON (payload as hex)
///   when this packet completes a message, to be freed with `kirole_free_string`.
/// - Returns NULL when no message is ready; `kirole_last_error` is then NULL
///   unless the arguments were invalid.
#[no_mangle]
pub unsafe extern "C" fn kirole_assembler_append(
    assembler: *const AssemblerHandle,
    data: *const u8,
    len: usize,
) -> *mut c_char {
    clear_last_error();

    if assembler.is_null() {
        set_last_error("Null assembler pointer");
        return ptr::null_mut();
    }
    let handle = &*assembler;

    let Some(data) = bytes_from_raw(data, len) else {
        set_last_error("Null data pointer");
        return ptr::null_mut();
    };

    match handle.assembler.append(data) {
        Some(message) => {
            let json = serde_json::json!({
                "message_type": message.message_type,
                "message_id": message.message_id,
                "payload": hex::encode(&message.payload),
            });
            string_to_cstr(&json.to_string())
        }
        None => ptr::null_mut(),
    }
}

/// Drop every partial and remembered message.
///
/// # Safety
/// - `assembler` must be a valid pointer returned by `kirole_assembler_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn kirole_assembler_reset(assembler: *const AssemblerHandle) {
    if let Some(handle) = assembler.as_ref() {
        handle.assembler.reset();
    }
}

/// Free an assembler.
///
/// # Safety
/// - `assembler` must be a valid pointer returned by `kirole_assembler_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn kirole_assembler_free(assembler: *mut AssemblerHandle) {
    if !assembler.is_null() {
        drop(Box::from_raw(assembler));
    }
}

// ============================================================================
// Events, Day Pack, Policy
// ============================================================================

/// Decode one 7-byte event record into JSON.
///
/// # Safety
/// - `data` must point to `len` readable bytes.
/// - Returns a newly allocated string that must be freed with `kirole_free_string`.
/// - Returns NULL on error; call `kirole_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kirole_parse_event_record(data: *const u8, len: usize) -> *mut c_char {
    clear_last_error();

    let Some(data) = bytes_from_raw(data, len) else {
        set_last_error("Null data pointer");
        return ptr::null_mut();
    };

    let event = match decode_record(data) {
        Ok(event) => event,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&event) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Fingerprint a day pack given as JSON.
///
/// # Safety
/// - `day_pack_json` must be a valid null-terminated C string.
/// - Returns the lowercase hex SHA-256, to be freed with `kirole_free_string`.
/// - Returns NULL on error; call `kirole_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn kirole_day_pack_fingerprint(day_pack_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json = match cstr_to_string(day_pack_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match serde_json::from_str::<DayPack>(&json) {
        Ok(pack) => string_to_cstr(&pack.stable_fingerprint().to_hex()),
        Err(e) => {
            set_last_error(&format!("Invalid day pack JSON: {}", e));
            ptr::null_mut()
        }
    }
}

/// Evaluate the sync policy.
///
/// # Safety
/// - `now` must be a valid null-terminated RFC 3339 string; its offset picks
///   the day or night window.
/// - `last_sync` is an RFC 3339 string, or NULL if never synced.
/// - `policy_json` is a policy configuration object, or NULL for defaults.
/// - Returns 1 to sync, 0 to wait, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn kirole_should_sync(
    now: *const c_char,
    last_sync: *const c_char,
    content_changed: bool,
    force: bool,
    policy_json: *const c_char,
) -> i32 {
    clear_last_error();

    let now = match cstr_to_string(now).map(|s| DateTime::parse_from_rfc3339(&s)) {
        Some(Ok(now)) => now,
        Some(Err(e)) => {
            set_last_error(&format!("Invalid now timestamp: {}", e));
            return -1;
        }
        None => {
            set_last_error("Invalid now string pointer");
            return -1;
        }
    };

    let last_sync = if last_sync.is_null() {
        None
    } else {
        match cstr_to_string(last_sync).map(|s| DateTime::parse_from_rfc3339(&s)) {
            Some(Ok(at)) => Some(at.with_timezone(&Utc)),
            Some(Err(e)) => {
                set_last_error(&format!("Invalid last_sync timestamp: {}", e));
                return -1;
            }
            None => {
                set_last_error("Invalid last_sync string pointer");
                return -1;
            }
        }
    };

    let config = if policy_json.is_null() {
        SyncPolicyConfig::default()
    } else {
        let parsed = cstr_to_string(policy_json)
            .map(|s| serde_json::from_str::<SyncPolicyConfig>(&s));
        match parsed {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                set_last_error(&format!("Invalid policy JSON: {}", e));
                return -1;
            }
            None => {
                set_last_error("Invalid policy string pointer");
                return -1;
            }
        }
    };

    match SyncPolicy::new(config) {
        Ok(policy) => policy.should_sync(&now, last_sync, content_changed, force) as i32,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Kirole Sync functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Kirole Sync function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn kirole_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Kirole Sync call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn kirole_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn kirole_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
