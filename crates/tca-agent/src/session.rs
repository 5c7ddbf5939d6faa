//! Command dispatch against the transport.
//!
//! One [`Session`] exists per Test Manager connection. It owns the handle
//! registry and routes each inbound command to its handler; handlers run
//! to completion one at a time on the command loop, while transport
//! callbacks report back through the shared [`ResponseCorrelator`].

use crate::correlator::ResponseCorrelator;
use crate::registry::{Handle, HandleRegistry};
use crate::router::{Action, RESPONSE_ON_RECEIVE};
use crate::transport::{
    InvokeCallback, MessageSink, ServeCallback, Transport, RPC_PRIORITY, RPC_TTL,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tca_core::envelope::CommandEnvelope;
use tca_core::schema::{Message, PayloadFormat, PublishData, RpcEndpointData, UriTarget};
use tca_core::status::{Status, StatusCode};
use tracing::{debug, warn};

/// State and dispatch for one Test Manager connection.
pub struct Session {
    transport: Arc<dyn Transport>,
    registry: HandleRegistry,
    correlator: ResponseCorrelator,
}

impl Session {
    /// Build a session over `transport`, reporting through `correlator`.
    pub fn new(transport: Arc<dyn Transport>, correlator: ResponseCorrelator) -> Self {
        Self {
            transport,
            registry: HandleRegistry::new(),
            correlator,
        }
    }

    /// Read-only view of the handle registry.
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Dispatch one command envelope.
    ///
    /// Unknown actions are logged and produce no response. Every known
    /// action yields exactly one status response, tagged with the
    /// command's `test_id`.
    pub async fn process(&mut self, envelope: CommandEnvelope) {
        let Some(action) = Action::parse(&envelope.action) else {
            warn!("ignoring unknown action {:?}", envelope.action);
            return;
        };
        debug!("dispatching {action} (test_id {:?})", envelope.test_id);

        let test_id = envelope.test_id.clone();
        let outcome = match action {
            Action::SendCommand => self.handle_send(&envelope).await,
            Action::RegisterListener => self.handle_register_listener(&envelope).await,
            Action::UnregisterListener => self.handle_unregister_listener(&envelope),
            Action::RpcClient => self.handle_rpc_client(&envelope).await,
            Action::RpcServer => self.handle_rpc_server(&envelope).await,
            Action::Publisher => self.handle_publisher(&envelope).await,
            Action::Subscriber => self.handle_subscriber(&envelope).await,
        };

        if let Some(status) = outcome {
            self.correlator
                .send_status(action.as_str(), &test_id, &status);
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    /// `sendCommand`: forward a fully-formed message, status passthrough.
    async fn handle_send(&mut self, envelope: &CommandEnvelope) -> Option<Status> {
        let message: Message = match parse_data(&envelope.data) {
            Ok(message) => message,
            Err(status) => return Some(status),
        };
        Some(match self.transport.send(message).await {
            Ok(()) => Status::ok(),
            Err(error) => error.into(),
        })
    }

    /// `registerListener`: wire deliveries on a URI back to the Test
    /// Manager as unsolicited `onReceive` envelopes.
    async fn handle_register_listener(&mut self, envelope: &CommandEnvelope) -> Option<Status> {
        let target: UriTarget = match parse_data(&envelope.data) {
            Ok(target) => target,
            Err(status) => return Some(status),
        };

        let correlator = self.correlator.clone();
        let sink: MessageSink = Arc::new(move |message: Message| {
            // Deliveries are unsolicited: no test id to echo.
            correlator.send_message(RESPONSE_ON_RECEIVE, "", &message);
        });

        Some(match self.transport.register_listener(&target.uri, sink).await {
            Ok(handle) => self.registry.add(&target.uri, Handle::Listener(handle)),
            Err(error) => error.into(),
        })
    }

    /// `unregisterListener`: drop every handle registered under the URI.
    fn handle_unregister_listener(&mut self, envelope: &CommandEnvelope) -> Option<Status> {
        let target: UriTarget = match parse_data(&envelope.data) {
            Ok(target) => target,
            Err(status) => return Some(status),
        };
        Some(self.registry.remove(&target.uri))
    }

    /// `rpcClient`: invoke a method, reusing a client handle per URI.
    ///
    /// Acceptance is acknowledged with OK immediately; the invocation
    /// outcome (response, failure, or expiry) arrives later under the same
    /// `test_id`.
    async fn handle_rpc_client(&mut self, envelope: &CommandEnvelope) -> Option<Status> {
        let data: RpcEndpointData = match parse_data(&envelope.data) {
            Ok(data) => data,
            Err(status) => return Some(status),
        };
        let format = match resolve_format(data.attributes.format.as_deref()) {
            Ok(format) => format,
            Err(status) => return Some(status),
        };

        let client = match self.registry.find_rpc_client(&data.uri) {
            Some(existing) => existing,
            None => match self
                .transport
                .open_rpc_client(&data.uri, RPC_PRIORITY, RPC_TTL)
                .await
            {
                Ok(created) => {
                    self.registry
                        .add(&data.uri, Handle::RpcClient(created.clone()));
                    created
                }
                Err(error) => return Some(error.into()),
            },
        };

        let correlator = self.correlator.clone();
        let test_id = envelope.test_id.clone();
        let on_complete: InvokeCallback = Box::new(move |outcome| match outcome {
            Ok(response) => correlator.send_message(Action::RpcClient.as_str(), &test_id, &response),
            Err(status) => correlator.send_status(Action::RpcClient.as_str(), &test_id, &status),
        });

        let payload = data.payload.unwrap_or_default();
        match self
            .transport
            .invoke_method(&client, format, payload, on_complete)
            .await
        {
            Ok(pending) => {
                self.registry.track_invocation(pending);
                Some(Status::ok())
            }
            Err(error) => Some(error.into()),
        }
    }

    /// `rpcServer`: register a canned responder. At most one server may
    /// exist per exact URI.
    async fn handle_rpc_server(&mut self, envelope: &CommandEnvelope) -> Option<Status> {
        let data: RpcEndpointData = match parse_data(&envelope.data) {
            Ok(data) => data,
            Err(status) => return Some(status),
        };
        let format = match resolve_format(data.attributes.format.as_deref()) {
            Ok(format) => format,
            Err(status) => return Some(status),
        };

        if self.registry.has_rpc_server(&data.uri) {
            return Some(Status::new(
                StatusCode::AlreadyExists,
                format!("an rpc server is already registered for {}", data.uri),
            ));
        }

        let canned = data.payload;
        let respond: ServeCallback = Arc::new(move |_request: &Message| canned.clone());

        Some(match self.transport.serve(&data.uri, format, respond).await {
            Ok(handle) => self.registry.add(&data.uri, Handle::RpcServer(handle)),
            Err(error) => error.into(),
        })
    }

    /// `publisher`: one-shot publish, no state retained.
    async fn handle_publisher(&mut self, envelope: &CommandEnvelope) -> Option<Status> {
        let data: PublishData = match parse_data(&envelope.data) {
            Ok(data) => data,
            Err(status) => return Some(status),
        };
        let format = match resolve_format(data.attributes.format.as_deref()) {
            Ok(format) => format,
            Err(status) => return Some(status),
        };

        let payload = data.payload.unwrap_or_default();
        Some(
            match self
                .transport
                .publish(&data.attributes.sink, format, payload)
                .await
            {
                Ok(()) => Status::ok(),
                Err(error) => error.into(),
            },
        )
    }

    /// `subscriber`: wire publications on a URI back to the Test Manager,
    /// tagged with the subscribing command's `test_id`.
    async fn handle_subscriber(&mut self, envelope: &CommandEnvelope) -> Option<Status> {
        let target: UriTarget = match parse_data(&envelope.data) {
            Ok(target) => target,
            Err(status) => return Some(status),
        };

        let correlator = self.correlator.clone();
        let test_id = envelope.test_id.clone();
        let sink: MessageSink = Arc::new(move |message: Message| {
            correlator.send_message(Action::Subscriber.as_str(), &test_id, &message);
        });

        Some(match self.transport.subscribe(&target.uri, sink).await {
            Ok(handle) => self.registry.add(&target.uri, Handle::Subscription(handle)),
            Err(error) => error.into(),
        })
    }
}

// ── Data helpers ──────────────────────────────────────────────────────────────

/// Deserialize the command's `data` document, mapping shape errors to an
/// INVALID_FORMAT status.
fn parse_data<T: DeserializeOwned>(data: &Value) -> Result<T, Status> {
    serde_json::from_value(data.clone()).map_err(|error| {
        Status::new(
            StatusCode::InvalidFormat,
            format!("malformed command data: {error}"),
        )
    })
}

/// Resolve the optional `format` attribute. A missing field is accepted
/// as unspecified; an unrecognized name is rejected with NOT_FOUND, the
/// code the protocol fixes for this path.
fn resolve_format(field: Option<&str>) -> Result<PayloadFormat, Status> {
    PayloadFormat::from_wire(field).ok_or_else(|| {
        Status::new(
            StatusCode::NotFound,
            "Invalid payload format received in the request.",
        )
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
