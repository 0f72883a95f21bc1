//! An `XMLHttpRequest`-style client over a polled host transport.
//!
//! # Overview
//! Some hosts (game engines, embedded runtimes) expose an asynchronous web
//! request that has no callbacks: the caller has to keep reading a status
//! code, a completion flag, a progress ratio and the response headers. This
//! crate turns that into the familiar request object with a readyState
//! lifecycle, ordered events, timeouts, abort and content-typed decoding.
//!
//! # Design
//! - The host does the I/O. It implements `Transport` / `TransportFactory`;
//!   the core never touches the network.
//! - `XmlHttpRequest::poll` is the only thing that advances a request. Hosts
//!   call it from their frame loop, or hand requests to `EventLoop`.
//! - Everything is single-threaded. A request owns its transport, timer and
//!   listeners, and shares nothing with other requests.
//! - Handlers never get the request itself. They get an `Event` snapshot
//!   and, when registered with `*_with_request`, a `RequestView` that can
//!   read the response and ask for an abort.
//! - Configuration errors are returned as `XhrError`. Transport failures and
//!   timeouts are delivered as events.

pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod http;
pub mod scripted;
pub mod timer;
pub mod transport;
pub mod xhr;

pub use config::{initialize, Config};
pub use decode::{Response, ResponseType};
pub use error::XhrError;
pub use event::{Event, EventKind, ListenerId, ProgressInfo};
pub use event_loop::EventLoop;
pub use http::{Method, RequestBody, RequestUrl};
pub use timer::{Clock, ManualClock, SystemClock};
pub use transport::{ResponseHeaders, Transport, TransportFactory, TransportResult};
pub use xhr::{Outcome, ReadyState, RequestView, XmlHttpRequest};
