//! Stream event protocol (protocol_spec): type + payload + envelope.
//!
//! This crate defines the wire shape of a single stream event and envelope injection.
//! It does not depend on heddle. heddle bridges `crate::event::Event` into `ProtocolEvent`
//! via `Event::to_protocol_event`, then callers apply `envelope::to_json` for the wire form.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::ProtocolEvent;
