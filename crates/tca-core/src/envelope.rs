//! Wire envelopes exchanged with the Test Manager.
//!
//! The protocol is a stream of JSON objects over one long-lived TCP
//! connection (newline-agnostic — the reader must not rely on line
//! framing):
//!
//! ```json
//! // Inbound command
//! {"action":"registerListener","test_id":"42","data":{"uri":"//vehicle/1/0/8000"}}
//! // Outbound response
//! {"action":"registerListener","ue":"rust","test_id":"42","data":{"message":"","code":0,"details":[]}}
//! ```
//!
//! Every outbound message carries the fixed agent tag in `ue` so the Test
//! Manager can attribute responses when several agents share a session
//! log. `test_id` is echoed from the command that triggered the response
//! and is empty for unsolicited deliveries.

use crate::schema::Message;
use crate::status::Status;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Fixed agent tag carried in the `ue` field of every outbound envelope.
pub const AGENT_TAG: &str = "rust";

/// Action name of the one-time session handshake.
pub const INITIALIZE_ACTION: &str = "initialize";

/// A command received from the Test Manager.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandEnvelope {
    /// Command name routed by the dispatch table.
    pub action: String,
    /// Originating test identifier; may be absent or empty.
    #[serde(default)]
    pub test_id: String,
    /// Command-specific payload.
    #[serde(default)]
    pub data: Value,
}

/// A message sent to the Test Manager: a synchronous status, an
/// asynchronous delivery, or the initial handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Action this message responds to (or announces).
    pub action: String,
    /// Fixed agent tag, always [`AGENT_TAG`].
    pub ue: String,
    /// Echoed test identifier; empty for unsolicited deliveries.
    pub test_id: String,
    /// Status object or message document.
    pub data: Value,
}

impl ResponseEnvelope {
    /// Envelope carrying an arbitrary data document.
    pub fn with_data(action: &str, test_id: &str, data: Value) -> Self {
        Self {
            action: action.to_string(),
            ue: AGENT_TAG.to_string(),
            test_id: test_id.to_string(),
            data,
        }
    }

    /// Envelope carrying a status object.
    pub fn with_status(action: &str, test_id: &str, status: &Status) -> Self {
        Self::with_data(
            action,
            test_id,
            json!({
                "message": status.message,
                "code": status.code,
                "details": status.details,
            }),
        )
    }

    /// Envelope carrying a transport message document.
    pub fn with_message(action: &str, test_id: &str, message: &Message) -> Self {
        Self::with_data(
            action,
            test_id,
            serde_json::to_value(message).unwrap_or(Value::Null),
        )
    }

    /// The one-time `initialize` handshake announcing the agent SDK.
    pub fn initialize() -> Self {
        Self::with_data(INITIALIZE_ACTION, "", json!({ "SDK_name": AGENT_TAG }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
