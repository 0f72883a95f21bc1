//! `#[repr(C)]` types for the FFI boundary, and the adapter that turns a
//! host's function-pointer table into a core `Transport`.
//!
//! # Design
//! The host owns the native request object. It hands us a
//! `FfiTransportVTable`: an opaque `host` pointer plus one function per
//! transport operation. Each transport the host creates is another opaque
//! pointer that we pass back into those functions. Strings and buffers the
//! host returns are borrowed only for the duration of the call and are
//! copied immediately.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use bytes::Bytes;
use pollxhr_core::error::XhrError;
use pollxhr_core::{
    Event, EventKind, Method, ResponseHeaders, Transport, TransportFactory, TransportResult,
    XmlHttpRequest,
};

/// Opaque handle to an `XmlHttpRequest`. C callers receive a pointer to
/// this and pass it back into every `xhr_*` function.
pub struct FfiXhr {
    pub(crate) inner: XmlHttpRequest,
}

// ---------------------------------------------------------------------------
// Result codes
// ---------------------------------------------------------------------------

/// Status returned by every fallible `xhr_*` function.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    NullArg = 1,
    InvalidUtf8 = 2,
    InvalidUrl = 3,
    InvalidMethod = 4,
    ForbiddenMethod = 5,
    SyncUnsupported = 6,
    InvalidState = 7,
    InvalidHeader = 8,
    InvalidResponseType = 9,
    Config = 10,
    Panic = 11,
}

impl From<&XhrError> for FfiErrorCode {
    fn from(err: &XhrError) -> Self {
        match err {
            XhrError::InvalidUrl { .. } => FfiErrorCode::InvalidUrl,
            XhrError::InvalidMethod(_) => FfiErrorCode::InvalidMethod,
            XhrError::ForbiddenMethod(_) => FfiErrorCode::ForbiddenMethod,
            XhrError::SyncUnsupported => FfiErrorCode::SyncUnsupported,
            XhrError::InvalidState { .. } => FfiErrorCode::InvalidState,
            XhrError::InvalidHeader { .. } => FfiErrorCode::InvalidHeader,
            XhrError::InvalidResponseType(_) => FfiErrorCode::InvalidResponseType,
            XhrError::Config(_) => FfiErrorCode::Config,
        }
    }
}

impl From<Result<(), XhrError>> for FfiErrorCode {
    fn from(result: Result<(), XhrError>) -> Self {
        match result {
            Ok(()) => FfiErrorCode::Ok,
            Err(e) => {
                log::debug!("ffi call rejected: {e}");
                FfiErrorCode::from(&e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiEventKind {
    ReadyStateChange = 0,
    LoadStart = 1,
    Progress = 2,
    Load = 3,
    Error = 4,
    Timeout = 5,
    Abort = 6,
    LoadEnd = 7,
}

impl From<EventKind> for FfiEventKind {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::ReadyStateChange => FfiEventKind::ReadyStateChange,
            EventKind::LoadStart => FfiEventKind::LoadStart,
            EventKind::Progress => FfiEventKind::Progress,
            EventKind::Load => FfiEventKind::Load,
            EventKind::Error => FfiEventKind::Error,
            EventKind::Timeout => FfiEventKind::Timeout,
            EventKind::Abort => FfiEventKind::Abort,
            EventKind::LoadEnd => FfiEventKind::LoadEnd,
        }
    }
}

impl From<FfiEventKind> for EventKind {
    fn from(kind: FfiEventKind) -> Self {
        match kind {
            FfiEventKind::ReadyStateChange => EventKind::ReadyStateChange,
            FfiEventKind::LoadStart => EventKind::LoadStart,
            FfiEventKind::Progress => EventKind::Progress,
            FfiEventKind::Load => EventKind::Load,
            FfiEventKind::Error => EventKind::Error,
            FfiEventKind::Timeout => EventKind::Timeout,
            FfiEventKind::Abort => EventKind::Abort,
            FfiEventKind::LoadEnd => EventKind::LoadEnd,
        }
    }
}

/// Event snapshot passed to C listeners. Only valid during the callback.
///
/// `loaded` and `total` are meaningful for progress events only, where
/// `total` is 1 and `loaded` is the transport's ratio.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiEvent {
    pub kind: FfiEventKind,
    pub ready_state: u8,
    pub status: u16,
    pub length_computable: bool,
    pub loaded: f64,
    pub total: f64,
}

impl From<&Event> for FfiEvent {
    fn from(event: &Event) -> Self {
        let (length_computable, loaded, total) = event
            .progress
            .map_or((false, 0.0, 0.0), |p| (p.length_computable, p.loaded, p.total));
        FfiEvent {
            kind: event.kind.into(),
            ready_state: event.ready_state.as_u8(),
            status: event.status,
            length_computable,
            loaded,
            total,
        }
    }
}

/// C listener. `user_data` is passed back untouched.
pub type FfiEventCallback = extern "C" fn(user_data: *mut c_void, event: *const FfiEvent);

// ---------------------------------------------------------------------------
// Host transport
// ---------------------------------------------------------------------------

/// Which constructor the request asked the host to use.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiStrategy {
    /// Plain GET.
    Get = 0,
    /// Plain DELETE.
    Delete = 1,
    /// Upload `body` as the request payload. Hosts treat this as PUT until
    /// `set_method` says otherwise.
    RawBody = 2,
    /// Any other verb, named by `method`, with an optional body.
    Custom = 3,
}

/// Values hosts return from `FfiTransportVTable::result`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiTransportResult {
    InProgress = 0,
    Success = 1,
    ConnectionError = 2,
    ProtocolError = 3,
    DataProcessingError = 4,
}

/// Map the raw value a host returned. Unknown values are protocol errors.
pub(crate) fn transport_result_from_raw(raw: u32) -> TransportResult {
    match raw {
        0 => TransportResult::InProgress,
        1 => TransportResult::Success,
        2 => TransportResult::ConnectionError,
        3 => TransportResult::ProtocolError,
        4 => TransportResult::DataProcessingError,
        other => {
            log::warn!("host returned unknown transport result {other}");
            TransportResult::ProtocolError
        }
    }
}

/// Function table a native host provides. Every function pointer must be
/// set. `create` may return null, which the request reports as a
/// connection error.
///
/// Pointers the host returns from `header_at` and `body` only need to stay
/// valid until the call returns.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiTransportVTable {
    pub host: *mut c_void,
    pub create: extern "C" fn(
        host: *mut c_void,
        strategy: FfiStrategy,
        method: *const c_char,
        url: *const c_char,
        body: *const u8,
        body_len: usize,
    ) -> *mut c_void,
    pub set_method: extern "C" fn(transport: *mut c_void, method: *const c_char),
    pub set_header: extern "C" fn(transport: *mut c_void, name: *const c_char, value: *const c_char),
    pub send: extern "C" fn(transport: *mut c_void),
    pub status: extern "C" fn(transport: *const c_void) -> u16,
    pub is_done: extern "C" fn(transport: *const c_void) -> bool,
    /// One of the `FfiTransportResult` values.
    pub result: extern "C" fn(transport: *const c_void) -> u32,
    pub progress: extern "C" fn(transport: *const c_void) -> f32,
    pub header_count: extern "C" fn(transport: *const c_void) -> usize,
    pub header_at: extern "C" fn(
        transport: *const c_void,
        index: usize,
        name: *mut *const c_char,
        value: *mut *const c_char,
    ) -> bool,
    /// Response body, or null if none yet. Writes the length to `len`.
    pub body: extern "C" fn(transport: *const c_void, len: *mut usize) -> *const u8,
    pub abort: extern "C" fn(transport: *mut c_void),
    pub dispose: extern "C" fn(transport: *mut c_void),
}

fn method_cstr(method: Method) -> &'static CStr {
    match method {
        Method::Delete => c"DELETE",
        Method::Get => c"GET",
        Method::Head => c"HEAD",
        Method::Options => c"OPTIONS",
        Method::Patch => c"PATCH",
        Method::Post => c"POST",
        Method::Put => c"PUT",
    }
}

fn c_string(s: &str) -> CString {
    CString::new(s).unwrap_or_default()
}

/// `TransportFactory` backed by a host vtable.
pub(crate) struct FfiFactory {
    vtable: FfiTransportVTable,
}

impl FfiFactory {
    pub(crate) fn new(vtable: FfiTransportVTable) -> Self {
        Self { vtable }
    }

    fn create(
        &self,
        strategy: FfiStrategy,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
    ) -> Box<dyn Transport> {
        let url = c_string(url);
        let (body_ptr, body_len) = body.map_or((std::ptr::null(), 0), |b| (b.as_ptr(), b.len()));
        let handle = (self.vtable.create)(
            self.vtable.host,
            strategy,
            method_cstr(method).as_ptr(),
            url.as_ptr(),
            body_ptr,
            body_len,
        );
        if handle.is_null() {
            log::warn!("host could not create a {method} transport for {url:?}");
        }
        Box::new(FfiTransport {
            vtable: self.vtable,
            handle,
        })
    }
}

impl TransportFactory for FfiFactory {
    fn get(&self, url: &str) -> Box<dyn Transport> {
        self.create(FfiStrategy::Get, Method::Get, url, None)
    }

    fn delete(&self, url: &str) -> Box<dyn Transport> {
        self.create(FfiStrategy::Delete, Method::Delete, url, None)
    }

    fn raw_body(&self, url: &str, body: Bytes) -> Box<dyn Transport> {
        self.create(FfiStrategy::RawBody, Method::Put, url, Some(&body))
    }

    fn custom(&self, url: &str, method: Method, body: Option<Bytes>) -> Box<dyn Transport> {
        self.create(FfiStrategy::Custom, method, url, body.as_deref())
    }
}

/// One host transport. A null `handle` (creation failed, or disposed)
/// reports a connection error and ignores every command.
pub(crate) struct FfiTransport {
    vtable: FfiTransportVTable,
    handle: *mut c_void,
}

impl FfiTransport {
    fn live(&self) -> Option<*mut c_void> {
        (!self.handle.is_null()).then_some(self.handle)
    }
}

impl Transport for FfiTransport {
    fn set_method(&mut self, method: Method) {
        if let Some(handle) = self.live() {
            (self.vtable.set_method)(handle, method_cstr(method).as_ptr());
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if let Some(handle) = self.live() {
            let (name, value) = (c_string(name), c_string(value));
            (self.vtable.set_header)(handle, name.as_ptr(), value.as_ptr());
        }
    }

    fn send(&mut self) {
        if let Some(handle) = self.live() {
            (self.vtable.send)(handle);
        }
    }

    fn status(&self) -> u16 {
        self.live().map_or(0, |h| (self.vtable.status)(h))
    }

    fn is_done(&self) -> bool {
        self.live().is_some_and(|h| (self.vtable.is_done)(h))
    }

    fn result(&self) -> TransportResult {
        self.live().map_or(TransportResult::ConnectionError, |h| {
            transport_result_from_raw((self.vtable.result)(h))
        })
    }

    fn response_headers(&self) -> ResponseHeaders {
        let Some(handle) = self.live() else {
            return ResponseHeaders::default();
        };
        let count = (self.vtable.header_count)(handle);
        (0..count)
            .filter_map(|i| {
                let mut name: *const c_char = std::ptr::null();
                let mut value: *const c_char = std::ptr::null();
                if !(self.vtable.header_at)(handle, i, &mut name, &mut value)
                    || name.is_null()
                    || value.is_null()
                {
                    return None;
                }
                let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
                let value = unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned();
                Some((name, value))
            })
            .collect()
    }

    fn response_text(&self) -> Option<String> {
        self.response_bytes()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    fn response_bytes(&self) -> Option<Bytes> {
        let handle = self.live()?;
        let mut len = 0usize;
        let ptr = (self.vtable.body)(handle, &mut len);
        if ptr.is_null() {
            return None;
        }
        let body = unsafe { std::slice::from_raw_parts(ptr, len) };
        Some(Bytes::copy_from_slice(body))
    }

    fn progress(&self) -> f32 {
        self.live().map_or(0.0, |h| (self.vtable.progress)(h))
    }

    fn abort(&mut self) {
        if let Some(handle) = self.live() {
            (self.vtable.abort)(handle);
        }
    }

    fn dispose(&mut self) {
        if let Some(handle) = self.live() {
            (self.vtable.dispose)(handle);
            self.handle = std::ptr::null_mut();
        }
    }
}
