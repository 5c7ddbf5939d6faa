//! Outbound response channel to the Test Manager.
//!
//! Synchronous command statuses and asynchronous transport callbacks all
//! funnel into one queue consumed by a single writer task, so envelopes
//! are serialized onto the socket one at a time regardless of which
//! concurrency domain produced them.

use tca_core::envelope::ResponseEnvelope;
use tca_core::schema::Message;
use tca_core::status::Status;
use tokio::sync::mpsc;
use tracing::debug;

/// Cloneable sender handle over the outbound response queue.
///
/// Clones are handed to transport callbacks; the receiving half is owned
/// by the socket writer task.
#[derive(Clone)]
pub struct ResponseCorrelator {
    tx: mpsc::UnboundedSender<ResponseEnvelope>,
}

impl ResponseCorrelator {
    /// Create the queue, returning the sender handle and the receiver the
    /// writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResponseEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a status response for `action`, echoing `test_id`.
    pub fn send_status(&self, action: &str, test_id: &str, status: &Status) {
        self.send_envelope(ResponseEnvelope::with_status(action, test_id, status));
    }

    /// Queue a message document for `action`, echoing `test_id`.
    pub fn send_message(&self, action: &str, test_id: &str, message: &Message) {
        self.send_envelope(ResponseEnvelope::with_message(action, test_id, message));
    }

    /// Queue a fully-formed envelope.
    pub fn send_envelope(&self, envelope: ResponseEnvelope) {
        if self.tx.send(envelope).is_err() {
            // Writer is gone, the session is shutting down.
            debug!("response dropped: outbound queue closed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
