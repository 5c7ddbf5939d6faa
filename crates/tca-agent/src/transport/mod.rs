//! Transport abstraction driven by the conformance agent.
//!
//! Defines the capability set the agent consumes from the underlying
//! messaging substrate: fire-and-forget send, listener registration,
//! publish/subscribe, and request/response (RPC client + server).
//! Implementations deliver callbacks from their own concurrency domain —
//! callers must only hand over closures that own their captured state.
//!
//! The agent itself never tears down transport registrations: dropping a
//! handle from the registry is a logical release, and in-flight
//! operations are left to expire on the transport side.

pub mod loopback;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tca_core::schema::{Message, PayloadFormat, Priority, Uri};
use tca_core::status::{Status, StatusCode};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Priority class attached to every RPC-client invocation.
pub const RPC_PRIORITY: Priority = Priority::Cs4;

/// Fixed time-to-live for RPC-client invocations. Expiry surfaces through
/// the completion callback as an error, like any other failure.
pub const RPC_TTL: Duration = Duration::from_secs(10);

/// Transport errors.
///
/// These are opaque to the Test Manager: handlers convert them into a
/// status and pass the message through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The substrate could not be reached or refused the operation.
    #[error("transport unavailable: {message}")]
    Unavailable { message: String },

    /// The operation referenced something the transport does not know
    /// (e.g. a stale client handle).
    #[error("transport rejected the operation: {message}")]
    Rejected { message: String },

    /// A listener/subscription/server registration failed.
    #[error("registration failed: {message}")]
    Registration { message: String },
}

impl From<TransportError> for Status {
    fn from(error: TransportError) -> Self {
        let code = match &error {
            TransportError::Unavailable { .. } => StatusCode::Unavailable,
            TransportError::Rejected { .. } | TransportError::Registration { .. } => {
                StatusCode::Internal
            }
        };
        Status::new(code, error.to_string())
    }
}

// ── Callback aliases ──────────────────────────────────────────────────────────

/// Callback receiving listener or subscription deliveries. Invoked from
/// the transport's concurrency domain, possibly many times.
pub type MessageSink = Arc<dyn Fn(Message) + Send + Sync>;

/// Completion callback of one RPC invocation. Invoked exactly once, with
/// either the response message or the failure status (timeouts included).
pub type InvokeCallback = Box<dyn FnOnce(std::result::Result<Message, Status>) + Send>;

/// Request callback of an RPC server: maps a request message to the
/// response payload, or `None` when no response should be produced.
pub type ServeCallback = Arc<dyn Fn(&Message) -> Option<String> + Send + Sync>;

// ── Handle types ──────────────────────────────────────────────────────────────

/// Token for an active listener registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// Token for an active subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

/// Token for an RPC client bound to one URI. Cheap to clone; reused for
/// repeated invocations against the same URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcClientHandle(u64);

/// Token for an active RPC server registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcServerHandle(u64);

macro_rules! impl_handle {
    ($name:ident) => {
        impl $name {
            pub(crate) fn new(id: u64) -> Self {
                Self(id)
            }

            /// Transport-assigned identifier of this handle.
            pub fn id(&self) -> u64 {
                self.0
            }
        }
    };
}

impl_handle!(ListenerHandle);
impl_handle!(SubscriptionHandle);
impl_handle!(RpcClientHandle);
impl_handle!(RpcServerHandle);

/// Bookkeeping token for one in-flight RPC invocation.
///
/// The transport flips the shared flag once the completion callback has
/// fired (success, error, or expiry); settled invocations are pruned
/// lazily by the registry.
#[derive(Debug, Clone)]
pub struct InvokeHandle {
    id: u64,
    settled: Arc<AtomicBool>,
}

impl InvokeHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Transport-assigned identifier of this invocation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` once the completion callback has fired.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub(crate) fn settle(&self) {
        self.settled.store(true, Ordering::Release);
    }
}

// ── The transport trait ───────────────────────────────────────────────────────

/// Capability interface over a URI-addressed messaging substrate.
///
/// Implementations must be thread-safe (`Send + Sync`): the command loop
/// issues operations while the transport delivers callbacks concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a fully-formed message.
    async fn send(&self, message: Message) -> Result<()>;

    /// Register `on_receive` for every message arriving at `uri`.
    async fn register_listener(&self, uri: &Uri, on_receive: MessageSink)
        -> Result<ListenerHandle>;

    /// Publish one payload to `uri`. No state is retained.
    async fn publish(&self, uri: &Uri, format: PayloadFormat, payload: String) -> Result<()>;

    /// Subscribe `on_delivery` to publications on `uri`.
    async fn subscribe(&self, uri: &Uri, on_delivery: MessageSink) -> Result<SubscriptionHandle>;

    /// Construct an RPC client bound to `uri`. Callers are expected to
    /// reuse the returned handle for subsequent invocations on that URI.
    async fn open_rpc_client(
        &self,
        uri: &Uri,
        priority: Priority,
        ttl: Duration,
    ) -> Result<RpcClientHandle>;

    /// Issue one asynchronous invocation through `client`. `on_complete`
    /// fires exactly once with the response or the failure status.
    async fn invoke_method(
        &self,
        client: &RpcClientHandle,
        format: PayloadFormat,
        payload: String,
        on_complete: InvokeCallback,
    ) -> Result<InvokeHandle>;

    /// Register an RPC server answering requests at `uri` via `respond`.
    async fn serve(
        &self,
        uri: &Uri,
        format: PayloadFormat,
        respond: ServeCallback,
    ) -> Result<RpcServerHandle>;
}

/// Construct a transport implementation by name.
///
/// Failure here is the one unrecoverable startup condition: the caller
/// terminates the process instead of degrading.
pub fn create_transport(kind: &str) -> anyhow::Result<Arc<dyn Transport>> {
    match kind {
        "loopback" => Ok(Arc::new(loopback::LoopbackTransport::new())),
        other => anyhow::bail!("unsupported transport type: {other}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
