//! Core types and schemas for the transport conformance agent (tca)
//!
//! This crate provides the wire-level data structures shared between the
//! agent binary and its tests: the command/response envelopes exchanged
//! with the Test Manager, the status model reported back for every
//! command, and the message schema handed to the messaging transport.
//!
//! All schema types are designed to:
//! - Tolerate missing optional fields (commands may omit `test_id`, data
//!   payloads may omit attributes)
//! - Use proper serde configuration so envelopes round-trip byte-for-byte
//! - Keep URIs opaque: a URI is an exact-match key, never interpreted

pub mod config;
pub mod envelope;
pub mod logging;
pub mod schema;
pub mod status;

pub use envelope::{CommandEnvelope, ResponseEnvelope, AGENT_TAG};
pub use schema::{Message, MessageAttributes, PayloadFormat, Priority, Uri};
pub use status::{Status, StatusCode};
