//! The host transport boundary.
//!
//! # Design
//! The host platform owns the network. Its native request object exposes no
//! callbacks: the state machine learns about progress only by reading the
//! status, completion flag, headers and progress ratio on every tick. The
//! `Transport` trait captures exactly that read-only view plus the few
//! commands the state machine issues (`set_method`, `set_header`, `send`,
//! `abort`, `dispose`). `TransportFactory` holds the host's constructors.
//!
//! `TransportHandle` wraps the boxed transport and enforces the
//! dispose-exactly-once rule. Disposing twice or touching the transport after
//! disposal is a bug in this crate, never a runtime condition, so it is
//! caught with `debug_assert!` and logged in release builds.

use bytes::Bytes;

use crate::http::Method;

/// Outcome reported by the host transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportResult {
    InProgress,
    Success,
    ConnectionError,
    ProtocolError,
    DataProcessingError,
}

impl TransportResult {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TransportResult::ConnectionError
                | TransportResult::ProtocolError
                | TransportResult::DataProcessingError
        )
    }
}

/// Response headers in the order the transport enumerates them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Case-insensitive lookup; the first matching entry wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// One `Name: value\r\n` line per header.
    pub fn to_header_block(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}: {v}\r\n"))
            .collect()
    }
}

impl FromIterator<(String, String)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A host-native asynchronous request, observed by polling.
pub trait Transport {
    /// Overwrite the method after construction.
    fn set_method(&mut self, method: Method);

    fn set_header(&mut self, name: &str, value: &str);

    /// Start the request. Called once, after headers are applied.
    fn send(&mut self);

    /// Last status code reported by the host, 0 if none yet.
    fn status(&self) -> u16;

    fn is_done(&self) -> bool;

    fn result(&self) -> TransportResult;

    fn response_headers(&self) -> ResponseHeaders;

    fn response_text(&self) -> Option<String>;

    fn response_bytes(&self) -> Option<Bytes>;

    /// Download progress ratio in `[0, 1]`.
    fn progress(&self) -> f32;

    fn abort(&mut self);

    /// Release the native object. Called exactly once per transport.
    fn dispose(&mut self);
}

/// The host's transport constructors.
pub trait TransportFactory {
    fn get(&self, url: &str) -> Box<dyn Transport>;

    fn delete(&self, url: &str) -> Box<dyn Transport>;

    /// Construct with a literal body that the host must not re-encode.
    fn raw_body(&self, url: &str, body: Bytes) -> Box<dyn Transport>;

    /// Generic constructor with an explicit method.
    fn custom(&self, url: &str, method: Method, body: Option<Bytes>) -> Box<dyn Transport>;
}

/// Exclusive owner of one transport. Disposes it exactly once.
pub struct TransportHandle {
    inner: Box<dyn Transport>,
    disposed: bool,
}

impl TransportHandle {
    pub fn new(inner: Box<dyn Transport>) -> Self {
        Self {
            inner,
            disposed: false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Access the live transport.
    ///
    /// Returns `None` after disposal. Reaching that branch means the state
    /// machine ticked a finished request, which is a bug.
    pub fn get(&self) -> Option<&dyn Transport> {
        if self.disposed {
            debug_assert!(false, "transport used after dispose");
            log::error!("transport used after dispose");
            return None;
        }
        Some(self.inner.as_ref())
    }

    pub fn get_mut(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        if self.disposed {
            debug_assert!(false, "transport used after dispose");
            log::error!("transport used after dispose");
            return None;
        }
        Some(self.inner.as_mut())
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            debug_assert!(false, "transport disposed twice");
            log::error!("transport disposed twice");
            return;
        }
        self.disposed = true;
        self.inner.dispose();
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("disposed", &self.disposed)
            .finish()
    }
}
