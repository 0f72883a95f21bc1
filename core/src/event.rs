//! Typed lifecycle events and the listener registry.
//!
//! # Design
//! Events are keyed by `EventKind` rather than by name. The request calls
//! only `register`, `unregister` and `notify` on its `EventTarget`, and
//! never inspects the listener lists directly. The `on*` handler slots live
//! in `Handlers`. `dispatch` runs the slot first and the registry second,
//! which is the order every event is delivered in.
//!
//! Handlers receive the `Event` snapshot plus a `RequestView` of the request
//! that fired it. The view is the only way to reach the request from inside
//! a handler: the request is mutably borrowed for the whole dispatch.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::xhr::{ReadyState, RequestView};

/// The events a request can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReadyStateChange,
    LoadStart,
    Progress,
    Load,
    Error,
    Timeout,
    Abort,
    LoadEnd,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::ReadyStateChange,
        EventKind::LoadStart,
        EventKind::Progress,
        EventKind::Load,
        EventKind::Error,
        EventKind::Timeout,
        EventKind::Abort,
        EventKind::LoadEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ReadyStateChange => "readystatechange",
            EventKind::LoadStart => "loadstart",
            EventKind::Progress => "progress",
            EventKind::Load => "load",
            EventKind::Error => "error",
            EventKind::Timeout => "timeout",
            EventKind::Abort => "abort",
            EventKind::LoadEnd => "loadend",
        }
    }

    /// Load, error, timeout and abort end a request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Load | EventKind::Error | EventKind::Timeout | EventKind::Abort
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress payload. `loaded` is the transport's ratio and `total` is
/// always 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressInfo {
    pub length_computable: bool,
    pub loaded: f64,
    pub total: f64,
}

/// A snapshot of the request taken when the event fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub request_id: Uuid,
    pub ready_state: ReadyState,
    pub status: u16,
    pub progress: Option<ProgressInfo>,
}

pub type Handler = Box<dyn FnMut(&Event, &RequestView<'_>)>;

fn snapshot_only(mut handler: impl FnMut(&Event) + 'static) -> Handler {
    Box::new(move |event: &Event, _: &RequestView<'_>| handler(event))
}

/// Identifies a registered listener so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        ListenerId(id)
    }
}

struct Listener {
    id: ListenerId,
    once: bool,
    handler: Handler,
}

/// Listener registry keyed by event kind.
#[derive(Default)]
pub struct EventTarget {
    listeners: HashMap<EventKind, Vec<Listener>>,
    next_id: u64,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. A `once` listener is dropped after its first call.
    pub fn register(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&Event) + 'static,
        once: bool,
    ) -> ListenerId {
        self.insert(kind, snapshot_only(handler), once)
    }

    /// Add a listener that also reads the request through its view.
    pub fn register_with_request(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&Event, &RequestView<'_>) + 'static,
        once: bool,
    ) -> ListenerId {
        self.insert(kind, Box::new(handler), once)
    }

    fn insert(&mut self, kind: EventKind, handler: Handler, once: bool) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(kind)
            .or_default()
            .push(Listener { id, once, handler });
        id
    }

    /// Remove a listener. Returns false if it was not registered for `kind`.
    pub fn unregister(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        list.len() != before
    }

    /// Call every listener for `event.kind` in registration order.
    pub fn notify(&mut self, event: &Event, view: &RequestView<'_>) {
        if let Some(list) = self.listeners.get_mut(&event.kind) {
            for listener in list.iter_mut() {
                (listener.handler)(event, view);
            }
            list.retain(|l| !l.once);
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            let count = self.listener_count(kind);
            if count > 0 {
                map.entry(&kind.as_str(), &count);
            }
        }
        map.finish()
    }
}

/// The assignable `on*` handler slots.
#[derive(Default)]
pub struct Handlers {
    pub onreadystatechange: Option<Handler>,
    pub onloadstart: Option<Handler>,
    pub onprogress: Option<Handler>,
    pub onload: Option<Handler>,
    pub onerror: Option<Handler>,
    pub ontimeout: Option<Handler>,
    pub onabort: Option<Handler>,
    pub onloadend: Option<Handler>,
}

impl Handlers {
    pub fn slot_mut(&mut self, kind: EventKind) -> &mut Option<Handler> {
        match kind {
            EventKind::ReadyStateChange => &mut self.onreadystatechange,
            EventKind::LoadStart => &mut self.onloadstart,
            EventKind::Progress => &mut self.onprogress,
            EventKind::Load => &mut self.onload,
            EventKind::Error => &mut self.onerror,
            EventKind::Timeout => &mut self.ontimeout,
            EventKind::Abort => &mut self.onabort,
            EventKind::LoadEnd => &mut self.onloadend,
        }
    }

    /// Assign a slot, replacing any previous handler.
    pub fn set(&mut self, kind: EventKind, handler: impl FnMut(&Event) + 'static) {
        *self.slot_mut(kind) = Some(snapshot_only(handler));
    }

    /// Assign a slot whose handler reads the request through its view.
    pub fn set_with_request(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&Event, &RequestView<'_>) + 'static,
    ) {
        *self.slot_mut(kind) = Some(Box::new(handler));
    }

    pub fn clear(&mut self, kind: EventKind) {
        *self.slot_mut(kind) = None;
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assigned: Vec<&str> = EventKind::ALL
            .iter()
            .filter(|kind| match kind {
                EventKind::ReadyStateChange => self.onreadystatechange.is_some(),
                EventKind::LoadStart => self.onloadstart.is_some(),
                EventKind::Progress => self.onprogress.is_some(),
                EventKind::Load => self.onload.is_some(),
                EventKind::Error => self.onerror.is_some(),
                EventKind::Timeout => self.ontimeout.is_some(),
                EventKind::Abort => self.onabort.is_some(),
                EventKind::LoadEnd => self.onloadend.is_some(),
            })
            .map(EventKind::as_str)
            .collect();
        f.debug_struct("Handlers").field("assigned", &assigned).finish()
    }
}

/// Deliver an event: assigned slot first, then registered listeners.
pub fn dispatch(
    handlers: &mut Handlers,
    target: &mut EventTarget,
    event: &Event,
    view: &RequestView<'_>,
) {
    if let Some(handler) = handlers.slot_mut(event.kind) {
        handler(event, view);
    }
    target.notify(event, view);
}

/// Event target for the upload side of a request.
///
/// Listeners can be attached for API compatibility. The host transport
/// does not report upload progress, so nothing is ever emitted here.
#[derive(Debug, Default)]
pub struct XmlHttpRequestUpload {
    target: EventTarget,
}

impl XmlHttpRequestUpload {
    pub fn add_event_listener(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&Event) + 'static,
        once: bool,
    ) -> ListenerId {
        self.target.register(kind, handler, once)
    }

    pub fn remove_event_listener(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.target.unregister(kind, id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.target.listener_count(kind)
    }
}
