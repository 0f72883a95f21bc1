//! The request object and its lifecycle state machine.
//!
//! # Design
//! `XmlHttpRequest` owns everything about one request: the configuration set
//! before `send`, the transport handle, the poll interval, the listeners and
//! the decoded response. Nothing is shared between requests.
//!
//! After `send`, readyState moves only when a tick observes the transport.
//! The exceptions are `open` (reset) and the terminal paths (abort, timeout,
//! completion). Each tick does, in order: read the transport, check the
//! deadline, advance readyState, report progress, check for completion.
//!
//! Every terminal path goes through `conclude`, which stops the interval and
//! disposes the transport before any terminal event is delivered. A finished
//! request is never ticked again because its interval is stopped, and
//! `poll` only ticks when the interval is due.
//!
//! Handlers run while the request is mutably borrowed, so they reach it
//! through a `RequestView` instead. `RequestView::abort` only records the
//! call; `tick` and `send` honor it as soon as the current dispatch returns.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use ::http::{HeaderName, HeaderValue, StatusCode};
use uuid::Uuid;

use crate::config;
use crate::decode::{self, Response, ResponseType};
use crate::dispatch::build_transport;
use crate::error::XhrError;
use crate::event::{
    dispatch, Event, EventKind, EventTarget, Handlers, ListenerId, ProgressInfo,
    XmlHttpRequestUpload,
};
use crate::http::{Method, RequestBody, RequestUrl};
use crate::timer::{Clock, Interval, SystemClock};
use crate::transport::{ResponseHeaders, TransportFactory, TransportHandle, TransportResult};

/// Lifecycle stage of a request. Ordered, so `a < b` means `a` comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl ReadyState {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Load,
    Error,
    Timeout,
    Abort,
}

impl Outcome {
    pub fn event_kind(&self) -> EventKind {
        match self {
            Outcome::Load => EventKind::Load,
            Outcome::Error => EventKind::Error,
            Outcome::Timeout => EventKind::Timeout,
            Outcome::Abort => EventKind::Abort,
        }
    }
}

/// What a handler can see of the request that fired it.
pub struct RequestView<'a> {
    id: Uuid,
    ready_state: ReadyState,
    status: u16,
    response: &'a Response,
    response_type: Option<ResponseType>,
    headers: &'a ResponseHeaders,
    finished: bool,
    cached_text: Option<&'a String>,
    transport: Option<&'a TransportHandle>,
    abort_requested: &'a Cell<bool>,
}

impl RequestView<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// The decoded response. `Null` until the request completes.
    pub fn response(&self) -> &Response {
        self.response
    }

    pub fn response_type(&self) -> Option<ResponseType> {
        self.response_type
    }

    pub fn response_text(&self) -> Option<String> {
        current_text(self.finished, self.cached_text, self.transport)
    }

    pub fn get_response_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn get_all_response_headers(&self) -> String {
        self.headers.to_header_block()
    }

    /// Ask for the request to be aborted once this dispatch returns.
    /// Ignored once the request has finished.
    pub fn abort(&self) {
        self.abort_requested.set(true);
    }
}

fn current_text(
    finished: bool,
    cached: Option<&String>,
    transport: Option<&TransportHandle>,
) -> Option<String> {
    if finished {
        return cached.cloned();
    }
    transport
        .filter(|h| !h.is_disposed())
        .and_then(TransportHandle::get)
        .and_then(|t| t.response_text())
}

/// A view over an idle request, for exercising handlers directly.
#[cfg(test)]
pub(crate) fn with_detached_view<R>(f: impl FnOnce(&RequestView<'_>) -> R) -> R {
    let response = Response::Null;
    let headers = ResponseHeaders::default();
    let abort_requested = Cell::new(false);
    f(&RequestView {
        id: Uuid::nil(),
        ready_state: ReadyState::Unsent,
        status: 0,
        response: &response,
        response_type: None,
        headers: &headers,
        finished: false,
        cached_text: None,
        transport: None,
        abort_requested: &abort_requested,
    })
}

pub struct XmlHttpRequest {
    id: Uuid,
    factory: Rc<dyn TransportFactory>,
    clock: Rc<dyn Clock>,
    interval: Interval,
    handlers: Handlers,
    events: EventTarget,
    upload: XmlHttpRequestUpload,

    ready_state: ReadyState,
    method: Option<Method>,
    url: Option<RequestUrl>,
    request_headers: Vec<(String, String)>,
    opened_at: Option<Instant>,
    sent: bool,
    timeout_ms: u64,
    timeout_deadline: Option<Instant>,
    with_credentials: bool,
    override_mime: Option<String>,
    requested_type: Option<ResponseType>,

    transport: Option<TransportHandle>,
    status: u16,
    progress: Option<f32>,
    response_headers: ResponseHeaders,
    response_type: Option<ResponseType>,
    response: Response,
    response_text: Option<String>,
    outcome: Option<Outcome>,
    abort_requested: Cell<bool>,
}

impl XmlHttpRequest {
    /// A request that builds its transports with `factory`, polls at the
    /// registered interval and reads the system clock.
    pub fn new(factory: Rc<dyn TransportFactory>) -> Self {
        Self {
            id: Uuid::new_v4(),
            factory,
            clock: Rc::new(SystemClock),
            interval: Interval::new(config::poll_interval()),
            handlers: Handlers::default(),
            events: EventTarget::new(),
            upload: XmlHttpRequestUpload::default(),
            ready_state: ReadyState::Unsent,
            method: None,
            url: None,
            request_headers: Vec::new(),
            opened_at: None,
            sent: false,
            timeout_ms: 0,
            timeout_deadline: None,
            with_credentials: false,
            override_mime: None,
            requested_type: None,
            transport: None,
            status: 0,
            progress: None,
            response_headers: ResponseHeaders::default(),
            response_type: None,
            response: Response::Null,
            response_text: None,
            outcome: None,
            abort_requested: Cell::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the registered poll interval for this request.
    pub fn with_poll_interval(mut self, period: Duration) -> Self {
        self.interval = Interval::new(period);
        self
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// `open(method, url)` with `async = true` and no credentials.
    pub fn open(&mut self, method: &str, url: &str) -> Result<(), XhrError> {
        self.open_with(method, url, true, None, None)
    }

    /// Reset the request and record its method and URL.
    ///
    /// readyState goes back to UNSENT; it becomes OPENED once the
    /// transport reports a status. Fails while a request is in flight.
    pub fn open_with(
        &mut self,
        method: &str,
        url: &str,
        is_async: bool,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), XhrError> {
        if self.is_in_flight() {
            return Err(XhrError::invalid_state("open", self.ready_state));
        }
        let method = Method::parse(method)?;
        let url = RequestUrl::parse(url)?;
        if !is_async {
            return Err(XhrError::SyncUnsupported);
        }
        if username.is_some() || password.is_some() {
            log::debug!("request {}: credentials are not forwarded to the transport", self.id);
        }

        self.ready_state = ReadyState::Unsent;
        self.method = Some(method);
        self.url = Some(url);
        self.request_headers.clear();
        self.opened_at = Some(self.clock.now());
        self.sent = false;
        self.timeout_deadline = None;
        self.transport = None;
        self.status = 0;
        self.progress = None;
        self.response_headers = ResponseHeaders::default();
        self.response_type = None;
        self.response = Response::Null;
        self.response_text = None;
        self.outcome = None;
        self.abort_requested.set(false);
        log::debug!("request {}: open {method} {}", self.id, self.url_str());
        Ok(())
    }

    /// Set a request header. Only allowed between `open` and `send`.
    /// Setting the same name twice (case-insensitively) replaces the value.
    pub fn set_request_header(&mut self, name: &str, value: &str) -> Result<(), XhrError> {
        if self.method.is_none() || self.sent {
            return Err(XhrError::invalid_state("setRequestHeader", self.ready_state));
        }
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            return Err(XhrError::InvalidHeader {
                name: name.to_string(),
            });
        }
        match self
            .request_headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.request_headers.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Treat the response as `mime` when sniffing its type.
    pub fn override_mime_type(&mut self, mime: &str) -> Result<(), XhrError> {
        if self.ready_state >= ReadyState::Loading {
            return Err(XhrError::invalid_state("overrideMimeType", self.ready_state));
        }
        self.override_mime = Some(mime.to_string());
        Ok(())
    }

    /// Request a response type. `None` means infer it from the media type.
    pub fn set_response_type(&mut self, response_type: Option<ResponseType>) -> Result<(), XhrError> {
        if self.ready_state >= ReadyState::Loading {
            return Err(XhrError::invalid_state("responseType", self.ready_state));
        }
        self.requested_type = response_type;
        Ok(())
    }

    /// Timeout in milliseconds, 0 for none. Read when `send` is called.
    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn set_with_credentials(&mut self, with_credentials: bool) -> Result<(), XhrError> {
        if self.sent {
            return Err(XhrError::invalid_state("withCredentials", self.ready_state));
        }
        self.with_credentials = with_credentials;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Build the transport, start it and run the first tick.
    pub fn send(&mut self, body: Option<RequestBody>) -> Result<(), XhrError> {
        let (Some(method), Some(url)) = (self.method, self.url.as_ref()) else {
            return Err(XhrError::invalid_state("send", self.ready_state));
        };
        if self.sent {
            return Err(XhrError::invalid_state("send", self.ready_state));
        }

        let mut handle = build_transport(
            self.factory.as_ref(),
            method,
            &url.raw,
            body.map(RequestBody::into_bytes),
            &self.request_headers,
        );
        let now = self.clock.now();
        if self.timeout_ms > 0 {
            self.timeout_deadline = Some(now + Duration::from_millis(self.timeout_ms));
        }
        if let Some(transport) = handle.get_mut() {
            transport.send();
        }
        self.transport = Some(handle);
        self.sent = true;
        log::debug!("request {}: sent {method} {}", self.id, url.raw);

        self.emit(EventKind::LoadStart);
        if self.abort_if_requested() {
            return Ok(());
        }
        self.interval.start(now);
        self.poll();
        Ok(())
    }

    /// Cancel an in-flight request.
    ///
    /// The transport is aborted and disposed, readyState is forced to DONE,
    /// then `abort` and `loadend` fire. A request that is not in flight is
    /// left untouched.
    pub fn abort(&mut self) {
        if !self.is_in_flight() {
            return;
        }
        if let Some(transport) = self.transport.as_mut().and_then(TransportHandle::get_mut) {
            transport.abort();
        }
        self.advance(ReadyState::Done);
        self.conclude(Outcome::Abort);
    }

    /// Run one tick if the poll interval is due. Returns whether it ticked.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.now();
        if !self.interval.due(now) {
            return false;
        }
        self.tick(now);
        true
    }

    fn tick(&mut self, now: Instant) {
        let Some(transport) = self.transport.as_ref().and_then(TransportHandle::get) else {
            return;
        };
        let status = transport.status();
        let headers = transport.response_headers();
        let done = transport.is_done();
        let result = transport.result();
        let progress = transport.progress();

        self.status = status;
        if status != 0 {
            self.advance(ReadyState::Opened);
        }
        if self.abort_if_requested() {
            return;
        }

        if self.timeout_deadline.is_some_and(|deadline| now > deadline) {
            self.time_out();
            return;
        }

        if self.ready_state == ReadyState::Opened && !headers.is_empty() {
            self.response_headers = headers;
            self.advance(ReadyState::HeadersReceived);
        }
        if self.abort_if_requested() {
            return;
        }
        if self.ready_state == ReadyState::HeadersReceived && status == StatusCode::OK.as_u16() {
            self.advance(ReadyState::Loading);
        }
        if self.abort_if_requested() {
            return;
        }

        self.observe_progress(progress);
        if self.abort_if_requested() {
            return;
        }

        if done || result != TransportResult::InProgress {
            self.complete(done, result);
        }
    }

    fn time_out(&mut self) {
        if let Some(transport) = self.transport.as_mut().and_then(TransportHandle::get_mut) {
            transport.abort();
        }
        self.status = StatusCode::REQUEST_TIMEOUT.as_u16();
        log::debug!("request {}: timed out after {}ms", self.id, self.timeout_ms);
        self.advance(ReadyState::Done);
        self.conclude(Outcome::Timeout);
    }

    fn complete(&mut self, done: bool, result: TransportResult) {
        self.advance(ReadyState::Done);
        if done || result == TransportResult::DataProcessingError {
            self.decode_response();
        }
        if result == TransportResult::Success {
            self.observe_progress(1.0);
            self.conclude(Outcome::Load);
        } else {
            log::debug!("request {}: transport reported {result:?}", self.id);
            self.conclude(Outcome::Error);
        }
    }

    fn decode_response(&mut self) {
        let Some(transport) = self.transport.as_ref().and_then(TransportHandle::get) else {
            return;
        };
        self.response_headers = transport.response_headers();
        let text = transport.response_text();
        let requested = match self.requested_type {
            Some(rt) => rt,
            None => decode::sniff(
                self.override_mime.as_deref(),
                self.response_headers.get("Content-Type"),
            ),
        };
        let bytes = if requested == ResponseType::ArrayBuffer {
            transport.response_bytes()
        } else {
            None
        };

        let decoded = decode::decode(requested, text.as_deref(), bytes.as_ref());
        self.response_type = Some(decoded.response_type);
        self.response = decoded.response;
        self.response_text = text;
    }

    /// Record the outcome, release the poller and transport, then fire the
    /// terminal event followed by `loadend`.
    fn conclude(&mut self, outcome: Outcome) {
        debug_assert!(self.outcome.is_none(), "request concluded twice");
        self.outcome = Some(outcome);
        self.interval.stop();
        if let Some(handle) = self.transport.as_mut() {
            handle.dispose();
        }
        log::debug!(
            "request {}: {outcome:?} with status {} after {:?}",
            self.id,
            self.status,
            self.opened_at.map(|t| self.clock.now().saturating_duration_since(t))
        );
        self.emit(outcome.event_kind());
        self.emit(EventKind::LoadEnd);
        self.abort_requested.set(false);
    }

    /// Carry out an `abort` a handler requested during the last dispatch.
    fn abort_if_requested(&mut self) -> bool {
        if !self.abort_requested.replace(false) {
            return false;
        }
        log::debug!("request {}: abort requested by a handler", self.id);
        self.abort();
        true
    }

    fn advance(&mut self, to: ReadyState) {
        if to <= self.ready_state {
            return;
        }
        log::debug!("request {}: {:?} -> {to:?}", self.id, self.ready_state);
        self.ready_state = to;
        self.emit(EventKind::ReadyStateChange);
    }

    /// Fire `progress` when the ratio moves forward.
    fn observe_progress(&mut self, ratio: f32) {
        if ratio.is_nan() {
            return;
        }
        let ratio = ratio.clamp(0.0, 1.0);
        if self.progress.is_some_and(|last| ratio <= last) {
            return;
        }
        self.progress = Some(ratio);
        self.emit(EventKind::Progress);
    }

    fn emit(&mut self, kind: EventKind) {
        let progress = (kind == EventKind::Progress).then(|| ProgressInfo {
            length_computable: self.progress.is_some(),
            loaded: f64::from(self.progress.unwrap_or(0.0)),
            total: 1.0,
        });
        let event = Event {
            kind,
            request_id: self.id,
            ready_state: self.ready_state,
            status: self.status,
            progress,
        };
        log::trace!("request {}: {kind}", self.id);
        let view = RequestView {
            id: self.id,
            ready_state: self.ready_state,
            status: self.status,
            response: &self.response,
            response_type: self.response_type.or(self.requested_type),
            headers: &self.response_headers,
            finished: self.outcome.is_some(),
            cached_text: self.response_text.as_ref(),
            transport: self.transport.as_ref(),
            abort_requested: &self.abort_requested,
        };
        dispatch(&mut self.handlers, &mut self.events, &event, &view);
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    pub fn add_event_listener(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&Event) + 'static,
        once: bool,
    ) -> ListenerId {
        self.events.register(kind, handler, once)
    }

    /// Like `add_event_listener`, for handlers that need to read the
    /// response or abort the request.
    pub fn add_event_listener_with_request(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&Event, &RequestView<'_>) + 'static,
        once: bool,
    ) -> ListenerId {
        self.events.register_with_request(kind, handler, once)
    }

    pub fn remove_event_listener(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.events.unregister(kind, id)
    }

    /// The `on*` handler slots.
    pub fn handlers_mut(&mut self) -> &mut Handlers {
        &mut self.handlers
    }

    pub fn upload(&self) -> &XmlHttpRequestUpload {
        &self.upload
    }

    pub fn upload_mut(&mut self) -> &mut XmlHttpRequestUpload {
        &mut self.upload
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn url(&self) -> Option<&RequestUrl> {
        self.url.as_ref()
    }

    pub fn response_url(&self) -> Option<&str> {
        self.url.as_ref().map(|u| u.raw.as_str())
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The inferred type after completion, otherwise the requested one.
    pub fn response_type(&self) -> Option<ResponseType> {
        self.response_type.or(self.requested_type)
    }

    /// Raw response text: live from the transport while in flight, cached
    /// once the request has finished.
    pub fn response_text(&self) -> Option<String> {
        current_text(
            self.outcome.is_some(),
            self.response_text.as_ref(),
            self.transport.as_ref(),
        )
    }

    pub fn get_response_header(&self, name: &str) -> Option<&str> {
        self.response_headers.get(name)
    }

    pub fn get_all_response_headers(&self) -> String {
        self.response_headers.to_header_block()
    }

    pub fn timeout(&self) -> u64 {
        self.timeout_ms
    }

    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }

    pub fn override_mime(&self) -> Option<&str> {
        self.override_mime.as_deref()
    }

    /// Last progress ratio reported, if any.
    pub fn progress(&self) -> Option<f32> {
        self.progress
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// True while the poll interval is running.
    pub fn is_active(&self) -> bool {
        self.interval.is_running()
    }

    /// Time until the next tick is due, `None` when not polling.
    pub fn next_poll_in(&self) -> Option<Duration> {
        self.interval.remaining(self.clock.now())
    }

    fn is_in_flight(&self) -> bool {
        self.sent && self.outcome.is_none()
    }

    fn url_str(&self) -> &str {
        self.response_url().unwrap_or("")
    }
}

impl Drop for XmlHttpRequest {
    fn drop(&mut self) {
        if let Some(handle) = self.transport.as_mut().filter(|h| !h.is_disposed()) {
            if let Some(transport) = handle.get_mut() {
                transport.abort();
            }
            handle.dispose();
        }
    }
}

impl std::fmt::Debug for XmlHttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlHttpRequest")
            .field("id", &self.id)
            .field("ready_state", &self.ready_state)
            .field("method", &self.method)
            .field("url", &self.response_url())
            .field("status", &self.status)
            .field("outcome", &self.outcome)
            .field("transport", &self.transport)
            .finish()
    }
}
