//! In-memory transport driven by a shared script.
//!
//! A `Script` is shared between the test (or demo host) and every transport
//! the `ScriptedFactory` builds. The test writes what the "network" reports
//! (status, headers, body, progress, completion) and reads back what the
//! state machine did (construction strategy, method, headers, body bytes,
//! abort and dispose counts).

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use bytes::Bytes;

use crate::http::Method;
use crate::transport::{ResponseHeaders, Transport, TransportFactory, TransportResult};

/// Which factory constructor built the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Get,
    Delete,
    RawBody,
    Custom,
}

#[derive(Debug)]
pub struct ScriptState {
    // What the state machine did.
    pub strategy: Option<Strategy>,
    pub method: Option<Method>,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body: Option<Bytes>,
    pub constructed: u32,
    pub sent: bool,
    pub abort_count: u32,
    pub dispose_count: u32,

    // What the network reports.
    pub status: u16,
    pub response_headers: Vec<(String, String)>,
    pub response_body: Option<Bytes>,
    pub progress: f32,
    pub done: bool,
    pub result: TransportResult,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            strategy: None,
            method: None,
            url: String::new(),
            request_headers: Vec::new(),
            request_body: None,
            constructed: 0,
            sent: false,
            abort_count: 0,
            dispose_count: 0,
            status: 0,
            response_headers: Vec::new(),
            response_body: None,
            progress: 0.0,
            done: false,
            result: TransportResult::InProgress,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Script(Rc<RefCell<ScriptState>>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Ref<'_, ScriptState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, ScriptState> {
        self.0.borrow_mut()
    }

    pub fn factory(&self) -> ScriptedFactory {
        ScriptedFactory {
            script: self.clone(),
        }
    }

    pub fn set_status(&self, status: u16) {
        self.state_mut().status = status;
    }

    pub fn set_headers(&self, headers: &[(&str, &str)]) {
        self.state_mut().response_headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    pub fn set_progress(&self, progress: f32) {
        self.state_mut().progress = progress;
    }

    /// Complete successfully with the given body.
    pub fn complete(&self, body: impl Into<Bytes>) {
        let mut state = self.state_mut();
        state.response_body = Some(body.into());
        state.progress = 1.0;
        state.done = true;
        state.result = TransportResult::Success;
    }

    /// Complete successfully with the bytes the request sent.
    pub fn complete_echo(&self) {
        let body = self.state().request_body.clone().unwrap_or_default();
        self.complete(body);
    }

    /// Stop with a failure result. `done` stays false, as hosts report a
    /// failed result before flipping the completion flag.
    pub fn fail(&self, result: TransportResult) {
        debug_assert!(result.is_failure());
        self.state_mut().result = result;
    }

    /// Shorthand for status + headers + body in one step.
    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: impl Into<Bytes>) {
        self.set_status(status);
        self.set_headers(headers);
        self.complete(body);
    }
}

/// Builds `ScriptedTransport`s bound to one script.
#[derive(Debug, Clone)]
pub struct ScriptedFactory {
    script: Script,
}

impl ScriptedFactory {
    fn build(
        &self,
        strategy: Strategy,
        method: Method,
        url: &str,
        body: Option<Bytes>,
    ) -> Box<dyn Transport> {
        {
            let mut state = self.script.state_mut();
            state.strategy = Some(strategy);
            state.method = Some(method);
            state.url = url.to_string();
            state.request_headers.clear();
            state.request_body = body;
            state.constructed += 1;
            state.sent = false;
        }
        Box::new(ScriptedTransport {
            script: self.script.clone(),
        })
    }
}

impl TransportFactory for ScriptedFactory {
    fn get(&self, url: &str) -> Box<dyn Transport> {
        self.build(Strategy::Get, Method::Get, url, None)
    }

    fn delete(&self, url: &str) -> Box<dyn Transport> {
        self.build(Strategy::Delete, Method::Delete, url, None)
    }

    // Hosts implement the raw-body constructor as a PUT.
    fn raw_body(&self, url: &str, body: Bytes) -> Box<dyn Transport> {
        self.build(Strategy::RawBody, Method::Put, url, Some(body))
    }

    fn custom(&self, url: &str, method: Method, body: Option<Bytes>) -> Box<dyn Transport> {
        self.build(Strategy::Custom, method, url, body)
    }
}

#[derive(Debug)]
pub struct ScriptedTransport {
    script: Script,
}

impl Transport for ScriptedTransport {
    fn set_method(&mut self, method: Method) {
        self.script.state_mut().method = Some(method);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.script
            .state_mut()
            .request_headers
            .push((name.to_string(), value.to_string()));
    }

    fn send(&mut self) {
        self.script.state_mut().sent = true;
    }

    fn status(&self) -> u16 {
        self.script.state().status
    }

    fn is_done(&self) -> bool {
        self.script.state().done
    }

    fn result(&self) -> TransportResult {
        self.script.state().result
    }

    fn response_headers(&self) -> ResponseHeaders {
        ResponseHeaders::new(self.script.state().response_headers.clone())
    }

    fn response_text(&self) -> Option<String> {
        self.script
            .state()
            .response_body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    fn response_bytes(&self) -> Option<Bytes> {
        self.script.state().response_body.clone()
    }

    fn progress(&self) -> f32 {
        self.script.state().progress
    }

    fn abort(&mut self) {
        let mut state = self.script.state_mut();
        state.abort_count += 1;
        if state.result == TransportResult::InProgress {
            state.result = TransportResult::ConnectionError;
        }
    }

    fn dispose(&mut self) {
        self.script.state_mut().dispose_count += 1;
    }
}
