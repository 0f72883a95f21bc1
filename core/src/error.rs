//! Error types for the request state machine.
//!
//! # Design
//! Only configuration errors are returned to the caller. They come from calls
//! made in the wrong state or with bad input, and are reported synchronously
//! at the call site. Transport failures, timeouts and malformed response
//! bodies never become an `XhrError`: the first two surface as terminal
//! events, the last is recovered by the decoder.

use thiserror::Error;

use crate::xhr::ReadyState;

/// Errors returned synchronously by `XmlHttpRequest` operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum XhrError {
    /// The URL could not be parsed or has no host.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The method token is not a known HTTP verb.
    #[error("invalid method `{0}`")]
    InvalidMethod(String),

    /// CONNECT, TRACE and TRACK are never allowed.
    #[error("forbidden method `{0}`")]
    ForbiddenMethod(String),

    /// `open` was called with `async = false`.
    #[error("synchronous requests are not supported")]
    SyncUnsupported,

    /// The operation is not allowed in the current lifecycle state.
    #[error("`{operation}` is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ReadyState,
    },

    /// A request header name or value failed validation.
    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    /// The string is not one of the known response types.
    #[error("invalid response type `{0}`")]
    InvalidResponseType(String),

    /// Configuration could not be read.
    #[error("config error: {0}")]
    Config(String),
}

impl XhrError {
    pub(crate) fn invalid_state(operation: &'static str, state: ReadyState) -> Self {
        XhrError::InvalidState { operation, state }
    }
}
