//! Single-threaded driver for many in-flight requests.
//!
//! Hosts that already have a frame loop call `XmlHttpRequest::poll` from it
//! and never need this type. `EventLoop` is for hosts without one: it keeps
//! the requests it was given and polls each in turn. Requests never see each
//! other, so one finishing or being aborted leaves the rest untouched.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::config;
use crate::xhr::XmlHttpRequest;

/// A request tracked by an `EventLoop`.
///
/// The loop holds a mutable borrow for the whole of each `poll`, so handlers
/// must not borrow the `SharedRequest` that is firing them. Use the
/// `RequestView` passed to `*_with_request` handlers instead.
pub type SharedRequest = Rc<RefCell<XmlHttpRequest>>;

#[derive(Debug)]
pub struct EventLoop {
    requests: Vec<SharedRequest>,
    idle_sleep: Duration,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Sleeps for the registered poll interval between passes.
    pub fn new() -> Self {
        Self::with_idle_sleep(config::poll_interval())
    }

    pub fn with_idle_sleep(idle_sleep: Duration) -> Self {
        Self {
            requests: Vec::new(),
            idle_sleep,
        }
    }

    /// Track a request. It may be opened and sent later; the loop lets go of
    /// it once it has finished.
    ///
    /// The returned handle must not be borrowed from the request's own
    /// handlers while the loop is polling it.
    pub fn spawn(&mut self, request: XmlHttpRequest) -> SharedRequest {
        let shared = Rc::new(RefCell::new(request));
        self.requests.push(shared.clone());
        shared
    }

    /// Track a request the caller already shares.
    pub fn track(&mut self, request: SharedRequest) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Poll every tracked request once. Returns how many ticked.
    ///
    /// Finished requests are dropped from the loop after the pass. Requests
    /// that have not been sent yet stay tracked.
    pub fn run_once(&mut self) -> usize {
        let mut ticked = 0;
        for request in &self.requests {
            if request.borrow_mut().poll() {
                ticked += 1;
            }
        }
        self.requests.retain(|r| r.borrow().outcome().is_none());
        ticked
    }

    /// True if any tracked request is still polling.
    pub fn has_active(&self) -> bool {
        self.requests.iter().any(|r| r.borrow().is_active())
    }

    /// Keep polling until no tracked request is active. Requests still
    /// waiting for `send` do not keep the loop running.
    pub fn run_until_idle(&mut self) {
        loop {
            self.run_once();
            if !self.has_active() {
                return;
            }
            std::thread::sleep(self.next_wakeup());
        }
    }

    fn next_wakeup(&self) -> Duration {
        self.requests
            .iter()
            .filter_map(|r| r.borrow().next_poll_in())
            .min()
            .unwrap_or(self.idle_sleep)
            .min(self.idle_sleep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::Script;
    use crate::timer::ManualClock;
    use crate::event::EventKind;
    use crate::xhr::{Outcome, ReadyState};

    fn request(script: &Script, clock: &ManualClock) -> XmlHttpRequest {
        let mut xhr = XmlHttpRequest::new(Rc::new(script.factory()))
            .with_clock(Rc::new(clock.clone()))
            .with_poll_interval(Duration::from_millis(10));
        xhr.open("GET", "http://example.com/").unwrap();
        xhr
    }

    #[test]
    fn requests_progress_independently() {
        let clock = ManualClock::new();
        let (a, b) = (Script::new(), Script::new());
        let mut event_loop = EventLoop::with_idle_sleep(Duration::from_millis(1));
        let first = event_loop.spawn(request(&a, &clock));
        let second = event_loop.spawn(request(&b, &clock));
        first.borrow_mut().send(None).unwrap();
        second.borrow_mut().send(None).unwrap();

        a.respond(200, &[], "a");
        clock.advance_ms(10);
        assert_eq!(event_loop.run_once(), 2);
        assert_eq!(event_loop.len(), 1);
        assert_eq!(first.borrow().outcome(), Some(Outcome::Load));
        assert_eq!(second.borrow().outcome(), None);

        b.set_status(200);
        clock.advance_ms(10);
        event_loop.run_once();
        assert_eq!(second.borrow().ready_state(), ReadyState::Opened);
    }

    #[test]
    fn aborting_one_request_leaves_others_running() {
        let clock = ManualClock::new();
        let (a, b) = (Script::new(), Script::new());
        let mut event_loop = EventLoop::with_idle_sleep(Duration::from_millis(1));
        let first = event_loop.spawn(request(&a, &clock));
        let second = event_loop.spawn(request(&b, &clock));
        first.borrow_mut().send(None).unwrap();
        second.borrow_mut().send(None).unwrap();

        first.borrow_mut().abort();
        clock.advance_ms(10);
        event_loop.run_once();

        assert_eq!(event_loop.len(), 1);
        assert!(second.borrow().is_active());
        assert_eq!(b.state().abort_count, 0);
        assert_eq!(a.state().dispose_count, 1);
    }

    #[test]
    fn run_until_idle_returns_once_everything_finished() {
        let script = Script::new();
        let mut event_loop = EventLoop::with_idle_sleep(Duration::from_millis(1));
        let xhr = XmlHttpRequest::new(Rc::new(script.factory()))
            .with_poll_interval(Duration::from_millis(1));
        let shared = event_loop.spawn(xhr);
        shared.borrow_mut().open("GET", "http://example.com/").unwrap();
        shared.borrow_mut().send(None).unwrap();
        script.respond(204, &[], "");

        event_loop.run_until_idle();
        assert!(event_loop.is_empty());
        assert_eq!(shared.borrow().status(), 204);
    }

    #[test]
    fn requests_spawned_before_send_are_polled_once_sent() {
        let clock = ManualClock::new();
        let script = Script::new();
        let mut event_loop = EventLoop::with_idle_sleep(Duration::from_millis(1));
        let shared = event_loop.spawn(request(&script, &clock));
        assert_eq!(event_loop.run_once(), 0);
        assert_eq!(event_loop.len(), 1);
        assert!(!event_loop.has_active());

        shared.borrow_mut().send(None).unwrap();
        script.respond(200, &[], "late");
        clock.advance_ms(10);
        assert_eq!(event_loop.run_once(), 1);

        assert_eq!(shared.borrow().outcome(), Some(Outcome::Load));
        assert!(event_loop.is_empty());
    }

    #[test]
    fn run_until_idle_ignores_requests_waiting_for_send() {
        let clock = ManualClock::new();
        let script = Script::new();
        let mut event_loop = EventLoop::with_idle_sleep(Duration::from_millis(1));
        event_loop.spawn(request(&script, &clock));
        event_loop.run_until_idle();
        assert_eq!(event_loop.len(), 1);
        assert_eq!(script.state().constructed, 0);
    }

    #[test]
    fn listeners_read_the_response_while_the_loop_polls() {
        let clock = ManualClock::new();
        let script = Script::new();
        let mut event_loop = EventLoop::with_idle_sleep(Duration::from_millis(1));
        let shared = event_loop.spawn(request(&script, &clock));
        let body = Rc::new(RefCell::new(None));
        let b = body.clone();
        shared.borrow_mut().add_event_listener_with_request(
            EventKind::Load,
            move |_, request| *b.borrow_mut() = request.response().as_text().map(str::to_string),
            true,
        );
        shared.borrow_mut().send(None).unwrap();

        script.respond(200, &[("Content-Type", "text/plain")], "from the loop");
        clock.advance_ms(10);
        event_loop.run_once();

        assert_eq!(body.borrow().as_deref(), Some("from the loop"));
        assert!(event_loop.is_empty());
    }
}
