//! Synchronous, best-effort, in-process event fan-out.
//!
//! Grounded on `loom::tool_source::ToolStreamWriter`'s pattern of a type-erased
//! closure sink invoked inline during execution (no channel, no buffering). The
//! in-process event set here has exactly the six kinds the spec names; for an
//! external observer that wants a serializable wire form, `Event::to_protocol_event`
//! bridges into `stream_event::ProtocolEvent`, matching that crate's own doc note
//! that "heddle bridges ... into ProtocolEvent and calls `to_json`". Subscribers
//! are never awaited on for tool/engine progress; a panicking subscriber is
//! caught and logged rather than aborting the turn.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::message::{Image, TokenUsage};

/// One point-in-time occurrence the engine reports to observers.
#[derive(Clone, Debug, Serialize)]
pub enum Event {
    ToolCallStart { call_id: String, tool_name: String, arguments: serde_json::Value },
    ToolResult { call_id: String, text: Option<String>, images: Vec<Image>, error: Option<String> },
    ThinkingChunk { text: String },
    Response { text: String, usage: Option<TokenUsage> },
    Error { message: String },
    ApprovalRequested { call_id: String, tool_name: String },
}

impl Event {
    /// Bridges to the wire-shape protocol event. `ThinkingChunk`/`Response` map
    /// onto `MessageChunk`, the one overlapping concept; every other kind has no
    /// precise counterpart in the protocol's graph-node vocabulary and goes
    /// through `Custom` so no information is lost.
    pub fn to_protocol_event(&self) -> stream_event::ProtocolEvent {
        match self {
            Event::ThinkingChunk { text } => stream_event::ProtocolEvent::MessageChunk {
                content: text.clone(),
                id: "thinking".to_string(),
            },
            Event::Response { text, .. } => stream_event::ProtocolEvent::MessageChunk {
                content: text.clone(),
                id: "response".to_string(),
            },
            other => stream_event::ProtocolEvent::Custom {
                value: serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
            },
        }
    }
}

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Fan-out point for [`Event`]s. Cloning shares subscribers (cheap `Arc` clone),
/// matching the teacher's writer-is-a-handle convention.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. Order of registration is the order of delivery.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Arc::new(f));
    }

    /// Delivers `event` to every subscriber in turn. Best-effort: a subscriber
    /// that panics is caught and logged; it never propagates to the caller and
    /// never stops later subscribers from running.
    pub fn emit(&self, event: Event) {
        let subs = self.subscribers.lock().unwrap().clone();
        for sub in subs {
            let event_ref = &event;
            if catch_unwind(AssertUnwindSafe(|| sub(event_ref))).is_err() {
                tracing::error!("event subscriber panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_delivers_to_all_subscribers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.subscribe(move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.subscribe(move |_| o2.lock().unwrap().push(2));
        bus.emit(Event::ThinkingChunk { text: "hi".into() });
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_later_subscribers() {
        let bus = EventBus::new();
        bus.subscribe(|_| panic!("boom"));
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.subscribe(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Event::Error {
            message: "x".into(),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn response_bridges_to_message_chunk() {
        let event = Event::Response {
            text: "hello".to_string(),
            usage: None,
        };
        match event.to_protocol_event() {
            stream_event::ProtocolEvent::MessageChunk { content, id } => {
                assert_eq!(content, "hello");
                assert_eq!(id, "response");
            }
            other => panic!("expected MessageChunk, got {:?}", other),
        }
    }

    #[test]
    fn tool_call_start_bridges_to_custom() {
        let event = Event::ToolCallStart {
            call_id: "c1".to_string(),
            tool_name: "ls".to_string(),
            arguments: serde_json::json!({}),
        };
        assert!(matches!(event.to_protocol_event(), stream_event::ProtocolEvent::Custom { .. }));
    }

    #[test]
    fn cloned_bus_shares_subscribers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.subscribe(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        let clone = bus.clone();
        clone.emit(Event::ThinkingChunk { text: "x".into() });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
