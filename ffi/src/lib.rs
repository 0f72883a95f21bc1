//! C-ABI wrapper around `pollxhr-core`.
//!
//! # Overview
//! Lets a native host (game engine, embedded runtime) that only has a
//! polled web request drive `XmlHttpRequest` objects from C. The host plugs
//! its transport in through an `FfiTransportVTable`, creates requests with
//! `xhr_new`, and calls `xhr_poll` from its frame loop.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Fallible calls return an `FfiErrorCode`; configuration errors map 1:1
//!   onto `XhrError` variants. Transport failures arrive as events.
//! - Strings returned to C are owned by the caller and released with
//!   `xhr_free_string`. Strings passed in are borrowed for the call only.
//! - Listeners must not call back into the request that is firing them.

pub mod types;

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use bytes::Bytes;
use pollxhr_core::{Config, ListenerId, RequestBody, Response, ResponseType, XmlHttpRequest};

use types::*;

/// Borrow a C string argument. `None` for null, `Err` for invalid UTF-8.
fn borrow_str<'a>(s: *const c_char) -> Option<Result<&'a str, FfiErrorCode>> {
    if s.is_null() {
        return None;
    }
    Some(
        unsafe { CStr::from_ptr(s) }
            .to_str()
            .map_err(|_| FfiErrorCode::InvalidUtf8),
    )
}

/// Hand a string to C. Null if it contains an interior NUL.
fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c) => c.into_raw(),
        Err(e) => {
            log::warn!("string with interior NUL at {} not returned to C", e.nul_position());
            std::ptr::null_mut()
        }
    }
}

// ---------------------------------------------------------------------------
// Bootstrap and lifecycle
// ---------------------------------------------------------------------------

/// Register the process-wide poll interval. The first call wins; later
/// calls succeed without changing it.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_initialize(poll_interval_ms: u64) -> FfiErrorCode {
    catch_unwind(|| {
        pollxhr_core::initialize(Config { poll_interval_ms })
            .map(|_| ())
            .into()
    })
    .unwrap_or(FfiErrorCode::Panic)
}

/// Create a request whose transports come from `vtable`.
///
/// The table is copied. Returns null if `vtable` is null or if an internal
/// panic occurs. The caller must free the result with `xhr_free`.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_new(vtable: *const FfiTransportVTable) -> *mut FfiXhr {
    catch_unwind(|| {
        if vtable.is_null() {
            return std::ptr::null_mut();
        }
        let factory = FfiFactory::new(unsafe { *vtable });
        let inner = XmlHttpRequest::new(Rc::new(factory));
        log::debug!("ffi: created request {}", inner.id());
        Box::into_raw(Box::new(FfiXhr { inner }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a request created by `xhr_new`. An in-flight request is aborted and
/// its transport disposed. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_free(xhr: *mut FfiXhr) {
    if !xhr.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(xhr) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// `open(method, url)`: asynchronous, no credentials.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_open(
    xhr: *mut FfiXhr,
    method: *const c_char,
    url: *const c_char,
) -> FfiErrorCode {
    xhr_open_with(xhr, method, url, true, std::ptr::null(), std::ptr::null())
}

/// `open(method, url, async, username, password)`.
///
/// `async = false` is rejected with `SyncUnsupported`. `username` and
/// `password` may be null; they are accepted but never sent.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_open_with(
    xhr: *mut FfiXhr,
    method: *const c_char,
    url: *const c_char,
    is_async: bool,
    username: *const c_char,
    password: *const c_char,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return FfiErrorCode::NullArg;
        }
        let xhr = unsafe { &mut *xhr };
        let (Some(method), Some(url)) = (borrow_str(method), borrow_str(url)) else {
            return FfiErrorCode::NullArg;
        };
        let (method, url) = match (method, url) {
            (Ok(m), Ok(u)) => (m, u),
            (Err(code), _) | (_, Err(code)) => return code,
        };
        let username = borrow_str(username).transpose();
        let password = borrow_str(password).transpose();
        let (username, password) = match (username, password) {
            (Ok(u), Ok(p)) => (u, p),
            (Err(code), _) | (_, Err(code)) => return code,
        };
        xhr.inner.open_with(method, url, is_async, username, password).into()
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

#[unsafe(no_mangle)]
pub extern "C" fn xhr_set_request_header(
    xhr: *mut FfiXhr,
    name: *const c_char,
    value: *const c_char,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return FfiErrorCode::NullArg;
        }
        let xhr = unsafe { &mut *xhr };
        let (Some(name), Some(value)) = (borrow_str(name), borrow_str(value)) else {
            return FfiErrorCode::NullArg;
        };
        let (name, value) = match (name, value) {
            (Ok(n), Ok(v)) => (n, v),
            (Err(code), _) | (_, Err(code)) => return code,
        };
        xhr.inner.set_request_header(name, value).into()
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

#[unsafe(no_mangle)]
pub extern "C" fn xhr_override_mime_type(xhr: *mut FfiXhr, mime: *const c_char) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return FfiErrorCode::NullArg;
        }
        let xhr = unsafe { &mut *xhr };
        match borrow_str(mime) {
            None => FfiErrorCode::NullArg,
            Some(Err(code)) => code,
            Some(Ok(mime)) => xhr.inner.override_mime_type(mime).into(),
        }
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

/// Set `responseType` from its string form (`""`, `"arraybuffer"`,
/// `"blob"`, `"document"`, `"json"`, `"text"`). Null unsets it.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_set_response_type(
    xhr: *mut FfiXhr,
    response_type: *const c_char,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return FfiErrorCode::NullArg;
        }
        let xhr = unsafe { &mut *xhr };
        let requested = match borrow_str(response_type) {
            None => None,
            Some(Err(code)) => return code,
            Some(Ok(s)) => match s.parse::<ResponseType>() {
                Ok(rt) => Some(rt),
                Err(e) => return FfiErrorCode::from(&e),
            },
        };
        xhr.inner.set_response_type(requested).into()
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

/// Timeout in milliseconds, 0 for none.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_set_timeout(xhr: *mut FfiXhr, timeout_ms: u64) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return FfiErrorCode::NullArg;
        }
        unsafe { &mut *xhr }.inner.set_timeout(timeout_ms);
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Send the request. `body` may be null; it is copied before this returns.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_send(xhr: *mut FfiXhr, body: *const u8, body_len: usize) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return FfiErrorCode::NullArg;
        }
        let xhr = unsafe { &mut *xhr };
        let body = (!body.is_null()).then(|| {
            let raw = unsafe { std::slice::from_raw_parts(body, body_len) };
            RequestBody::Bytes(Bytes::copy_from_slice(raw))
        });
        xhr.inner.send(body).into()
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

/// Run one tick if the poll interval is due. Returns whether it ticked.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_poll(xhr: *mut FfiXhr) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return false;
        }
        unsafe { &mut *xhr }.inner.poll()
    }))
    .unwrap_or(false)
}

/// True while the request is still being polled.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_is_active(xhr: *const FfiXhr) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        !xhr.is_null() && unsafe { &*xhr }.inner.is_active()
    }))
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn xhr_abort(xhr: *mut FfiXhr) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return FfiErrorCode::NullArg;
        }
        unsafe { &mut *xhr }.inner.abort();
        FfiErrorCode::Ok
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// 0 UNSENT, 1 OPENED, 2 HEADERS_RECEIVED, 3 LOADING, 4 DONE.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_ready_state(xhr: *const FfiXhr) -> u8 {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return 0;
        }
        unsafe { &*xhr }.inner.ready_state().as_u8()
    }))
    .unwrap_or(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn xhr_status(xhr: *const FfiXhr) -> u16 {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return 0;
        }
        unsafe { &*xhr }.inner.status()
    }))
    .unwrap_or(0)
}

/// Raw response text, or null if there is none.
/// Free with `xhr_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_response_text(xhr: *const FfiXhr) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return std::ptr::null_mut();
        }
        unsafe { &*xhr }
            .inner
            .response_text()
            .map_or(std::ptr::null_mut(), into_c_string)
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// The decoded JSON response re-serialized, or null if the response is not
/// JSON. Free with `xhr_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_response_json(xhr: *const FfiXhr) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return std::ptr::null_mut();
        }
        match unsafe { &*xhr }.inner.response() {
            Response::Json(value) => into_c_string(value.to_string()),
            _ => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// The arraybuffer response. The pointer is borrowed from the request and
/// stays valid until it is reopened or freed. Null if the response is not
/// an arraybuffer.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_response_bytes(xhr: *const FfiXhr, len: *mut usize) -> *const u8 {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() || len.is_null() {
            return std::ptr::null();
        }
        match unsafe { &*xhr }.inner.response().as_bytes() {
            Some(bytes) => {
                unsafe { *len = bytes.len() };
                bytes.as_ptr()
            }
            None => {
                unsafe { *len = 0 };
                std::ptr::null()
            }
        }
    }))
    .unwrap_or(std::ptr::null())
}

/// Case-insensitive header lookup. Null if absent.
/// Free with `xhr_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_get_response_header(xhr: *const FfiXhr, name: *const c_char) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return std::ptr::null_mut();
        }
        let Some(Ok(name)) = borrow_str(name) else {
            return std::ptr::null_mut();
        };
        unsafe { &*xhr }
            .inner
            .get_response_header(name)
            .map_or(std::ptr::null_mut(), |v| into_c_string(v.to_string()))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Every response header as `Name: value\r\n` lines.
/// Free with `xhr_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_get_all_response_headers(xhr: *const FfiXhr) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return std::ptr::null_mut();
        }
        into_c_string(unsafe { &*xhr }.inner.get_all_response_headers())
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Register `callback` for `kind`. Returns a listener id, or 0 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_add_event_listener(
    xhr: *mut FfiXhr,
    kind: FfiEventKind,
    callback: Option<FfiEventCallback>,
    user_data: *mut c_void,
    once: bool,
) -> u64 {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(callback) = callback else {
            return 0;
        };
        if xhr.is_null() {
            return 0;
        }
        let xhr = unsafe { &mut *xhr };
        let id = xhr.inner.add_event_listener(
            kind.into(),
            move |event| {
                let event = FfiEvent::from(event);
                callback(user_data, &event);
            },
            once,
        );
        id.as_u64()
    }))
    .unwrap_or(0)
}

/// Remove a listener registered for `kind`. Returns whether it was found.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_remove_event_listener(xhr: *mut FfiXhr, kind: FfiEventKind, id: u64) -> bool {
    catch_unwind(AssertUnwindSafe(|| {
        if xhr.is_null() {
            return false;
        }
        unsafe { &mut *xhr }
            .inner
            .remove_event_listener(kind.into(), ListenerId::from_u64(id))
    }))
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn xhr_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
