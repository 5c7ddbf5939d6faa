//! In-process loopback transport.
//!
//! Routes every operation back into the same process: `send` is delivered
//! to listeners registered on the message's sink URI, `publish` fans out
//! to subscribers on the published URI, and `invoke_method` is answered
//! by a co-located RPC server when one is registered (and parked as a
//! pending call otherwise).
//!
//! This is the transport conformance runs are driven against. It also
//! carries instrumentation (client-creation and publish counters, failure
//! injection, manual completion of parked calls) used by the test suite.

use super::{
    InvokeCallback, InvokeHandle, ListenerHandle, MessageSink, Result, RpcClientHandle,
    RpcServerHandle, ServeCallback, SubscriptionHandle, Transport, TransportError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tca_core::schema::{Message, PayloadFormat, Priority, Uri};
use tca_core::status::{Status, StatusCode};
use tracing::debug;

/// One registered RPC server.
struct ServerEntry {
    format: PayloadFormat,
    respond: ServeCallback,
}

/// Binding of an RPC client handle to its URI.
struct ClientBinding {
    uri: Uri,
    priority: Priority,
    ttl: Duration,
}

/// An invocation parked because no server is registered on its URI.
struct ParkedCall {
    callback: InvokeCallback,
    handle: InvokeHandle,
}

/// A recorded publish operation, for test assertions.
#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub uri: Uri,
    pub format: PayloadFormat,
    pub payload: String,
}

#[derive(Default)]
struct LoopbackState {
    next_id: u64,
    listeners: HashMap<Uri, Vec<(u64, MessageSink)>>,
    subscribers: HashMap<Uri, Vec<(u64, MessageSink)>>,
    servers: HashMap<Uri, ServerEntry>,
    clients: HashMap<u64, ClientBinding>,
    parked: HashMap<u64, ParkedCall>,
    sent: Vec<Message>,
    publish_log: Vec<PublishRecord>,
    clients_created: u64,
    fail_send: bool,
    fail_register: bool,
    fail_publish: bool,
    fail_subscribe: bool,
}

impl LoopbackState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process loopback transport. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    /// Create a new, empty loopback transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopbackState> {
        self.state.lock().expect("loopback state mutex poisoned")
    }

    // ── Instrumentation & failure injection ──────────────────────────────────

    /// Number of RPC clients constructed so far.
    pub fn clients_created(&self) -> u64 {
        self.lock().clients_created
    }

    /// Recorded (uri, priority, ttl) of every live RPC client binding,
    /// in handle order.
    pub fn client_bindings(&self) -> Vec<(Uri, Priority, Duration)> {
        let state = self.lock();
        let mut ids: Vec<u64> = state.clients.keys().copied().collect();
        ids.sort_unstable();
        ids.iter()
            .map(|id| {
                let binding = &state.clients[id];
                (binding.uri.clone(), binding.priority, binding.ttl)
            })
            .collect()
    }

    /// All publish operations issued so far, in order.
    pub fn publishes(&self) -> Vec<PublishRecord> {
        self.lock().publish_log.clone()
    }

    /// Number of publish operations addressed to `uri`.
    pub fn publish_count(&self, uri: &Uri) -> usize {
        self.lock()
            .publish_log
            .iter()
            .filter(|record| &record.uri == uri)
            .count()
    }

    /// Messages accepted by `send` so far.
    pub fn sent_messages(&self) -> Vec<Message> {
        self.lock().sent.clone()
    }

    /// Identifiers of invocations currently parked without a server.
    pub fn parked_invocations(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.lock().parked.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Simulate send failures.
    pub fn set_fail_send(&self, fail: bool) {
        self.lock().fail_send = fail;
    }

    /// Simulate listener registration failures.
    pub fn set_fail_register(&self, fail: bool) {
        self.lock().fail_register = fail;
    }

    /// Simulate publish failures.
    pub fn set_fail_publish(&self, fail: bool) {
        self.lock().fail_publish = fail;
    }

    /// Simulate subscribe failures.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    /// Complete a parked invocation with the given outcome, firing its
    /// completion callback. Returns `false` when the id is unknown.
    ///
    /// Completing with an error is also how RPC expiry is simulated.
    pub fn complete_invocation(&self, id: u64, outcome: std::result::Result<Message, Status>) -> bool {
        let parked = { self.lock().parked.remove(&id) };
        let Some(call) = parked else {
            return false;
        };
        call.handle.settle();
        (call.callback)(outcome);
        true
    }

    /// Deliver a message to every listener registered on `uri`, as if it
    /// arrived from a remote peer.
    pub fn inject_delivery(&self, uri: &Uri, message: Message) {
        let sinks = {
            let state = self.lock();
            state
                .listeners
                .get(uri)
                .map(|entries| entries.iter().map(|(_, sink)| Arc::clone(sink)).collect::<Vec<_>>())
                .unwrap_or_default()
        };
        for sink in sinks {
            sink(message.clone());
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: Message) -> Result<()> {
        let sinks = {
            let mut state = self.lock();
            if state.fail_send {
                return Err(TransportError::Unavailable {
                    message: "simulated send failure".to_string(),
                });
            }
            state.sent.push(message.clone());
            message
                .attributes
                .sink
                .as_ref()
                .and_then(|sink_uri| state.listeners.get(sink_uri))
                .map(|entries| entries.iter().map(|(_, sink)| Arc::clone(sink)).collect::<Vec<_>>())
                .unwrap_or_default()
        };

        // Callbacks run outside the state lock.
        for sink in sinks {
            sink(message.clone());
        }
        Ok(())
    }

    async fn register_listener(
        &self,
        uri: &Uri,
        on_receive: MessageSink,
    ) -> Result<ListenerHandle> {
        let mut state = self.lock();
        if state.fail_register {
            return Err(TransportError::Registration {
                message: "simulated listener registration failure".to_string(),
            });
        }
        let id = state.next_id();
        state
            .listeners
            .entry(uri.clone())
            .or_default()
            .push((id, on_receive));
        debug!("loopback: listener {id} registered on {uri}");
        Ok(ListenerHandle::new(id))
    }

    async fn publish(&self, uri: &Uri, format: PayloadFormat, payload: String) -> Result<()> {
        let sinks = {
            let mut state = self.lock();
            if state.fail_publish {
                return Err(TransportError::Unavailable {
                    message: "simulated publish failure".to_string(),
                });
            }
            state.publish_log.push(PublishRecord {
                uri: uri.clone(),
                format,
                payload: payload.clone(),
            });
            state
                .subscribers
                .get(uri)
                .map(|entries| entries.iter().map(|(_, sink)| Arc::clone(sink)).collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let delivery = Message::delivery(uri, format, payload);
        for sink in sinks {
            sink(delivery.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, uri: &Uri, on_delivery: MessageSink) -> Result<SubscriptionHandle> {
        let mut state = self.lock();
        if state.fail_subscribe {
            return Err(TransportError::Registration {
                message: "simulated subscribe failure".to_string(),
            });
        }
        let id = state.next_id();
        state
            .subscribers
            .entry(uri.clone())
            .or_default()
            .push((id, on_delivery));
        debug!("loopback: subscriber {id} registered on {uri}");
        Ok(SubscriptionHandle::new(id))
    }

    async fn open_rpc_client(
        &self,
        uri: &Uri,
        priority: Priority,
        ttl: Duration,
    ) -> Result<RpcClientHandle> {
        let mut state = self.lock();
        let id = state.next_id();
        state.clients.insert(
            id,
            ClientBinding {
                uri: uri.clone(),
                priority,
                ttl,
            },
        );
        state.clients_created += 1;
        debug!("loopback: rpc client {id} bound to {uri}");
        Ok(RpcClientHandle::new(id))
    }

    async fn invoke_method(
        &self,
        client: &RpcClientHandle,
        format: PayloadFormat,
        payload: String,
        on_complete: InvokeCallback,
    ) -> Result<InvokeHandle> {
        // Resolve the server under the lock, but answer outside it.
        let (handle, answer) = {
            let mut state = self.lock();
            let Some(binding) = state.clients.get(&client.id()) else {
                return Err(TransportError::Rejected {
                    message: format!("unknown rpc client handle {}", client.id()),
                });
            };
            let target = binding.uri.clone();
            let id = state.next_id();
            let handle = InvokeHandle::new(id);

            match state.servers.get(&target) {
                Some(server) => {
                    let request = Message::delivery(&target, format, payload);
                    (handle, Some((Arc::clone(&server.respond), server.format, target, request)))
                }
                None => {
                    state.parked.insert(
                        id,
                        ParkedCall {
                            callback: on_complete,
                            handle: handle.clone(),
                        },
                    );
                    debug!("loopback: invocation {id} parked, no server on {target}");
                    return Ok(handle);
                }
            }
        };

        let (respond, server_format, target, request) =
            answer.expect("server answer resolved above");
        let outcome = match respond(&request) {
            Some(reply) => Ok(Message::delivery(&target, server_format, reply)),
            None => Err(Status::new(
                StatusCode::Internal,
                "rpc server produced no response",
            )),
        };
        handle.settle();
        on_complete(outcome);
        Ok(handle)
    }

    async fn serve(
        &self,
        uri: &Uri,
        format: PayloadFormat,
        respond: ServeCallback,
    ) -> Result<RpcServerHandle> {
        let mut state = self.lock();
        let id = state.next_id();
        // The transport itself is permissive about re-registration; the
        // at-most-one-server invariant is enforced by the handle registry.
        state.servers.insert(uri.clone(), ServerEntry { format, respond });
        debug!("loopback: rpc server {id} registered on {uri}");
        Ok(RpcServerHandle::new(id))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (MessageSink, Arc<Mutex<Vec<Message>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_store = Arc::clone(&received);
        let sink: MessageSink = Arc::new(move |message| {
            sink_store.lock().unwrap().push(message);
        });
        (sink, received)
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_subscribers() {
        let transport = LoopbackTransport::new();
        let uri = Uri::new("//vehicle/1/0/8000");
        let (sink, received) = collector();
        transport.subscribe(&uri, sink).await.unwrap();

        transport
            .publish(&uri, PayloadFormat::Text, "hello".to_string())
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload.as_deref(), Some("hello"));
        assert_eq!(transport.publish_count(&uri), 1);
    }

    #[tokio::test]
    async fn test_send_delivers_to_sink_listeners() {
        let transport = LoopbackTransport::new();
        let uri = Uri::new("//vehicle/1/0/8001");
        let (sink, received) = collector();
        transport.register_listener(&uri, sink).await.unwrap();

        let message = Message::delivery(&uri, PayloadFormat::Text, "ping");
        transport.send(message).await.unwrap();

        assert_eq!(received.lock().unwrap().len(), 1);
        assert_eq!(transport.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_answered_by_colocated_server() {
        let transport = LoopbackTransport::new();
        let uri = Uri::new("//vehicle/1/0/7000");
        let respond: ServeCallback = Arc::new(|_request| Some("CANNED".to_string()));
        transport
            .serve(&uri, PayloadFormat::Text, respond)
            .await
            .unwrap();

        let client = transport
            .open_rpc_client(&uri, RPC_PRIORITY, RPC_TTL)
            .await
            .unwrap();

        let outcome = Arc::new(Mutex::new(None));
        let outcome_store = Arc::clone(&outcome);
        let on_complete: InvokeCallback = Box::new(move |result| {
            *outcome_store.lock().unwrap() = Some(result);
        });

        let handle = transport
            .invoke_method(&client, PayloadFormat::Text, "req".to_string(), on_complete)
            .await
            .unwrap();

        assert!(handle.is_settled());
        let outcome = outcome.lock().unwrap();
        let response = outcome.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(response.payload.as_deref(), Some("CANNED"));
    }

    use super::super::{RPC_PRIORITY, RPC_TTL};

    #[tokio::test]
    async fn test_invoke_without_server_is_parked_until_completed() {
        let transport = LoopbackTransport::new();
        let uri = Uri::new("//vehicle/1/0/7001");
        let client = transport
            .open_rpc_client(&uri, RPC_PRIORITY, RPC_TTL)
            .await
            .unwrap();

        let outcome = Arc::new(Mutex::new(None));
        let outcome_store = Arc::clone(&outcome);
        let on_complete: InvokeCallback = Box::new(move |result| {
            *outcome_store.lock().unwrap() = Some(result);
        });

        let handle = transport
            .invoke_method(&client, PayloadFormat::Text, "req".to_string(), on_complete)
            .await
            .unwrap();
        assert!(!handle.is_settled());
        assert_eq!(transport.parked_invocations(), vec![handle.id()]);

        // Simulate TTL expiry.
        let expired = Status::new(StatusCode::Unavailable, "request expired");
        assert!(transport.complete_invocation(handle.id(), Err(expired)));
        assert!(handle.is_settled());
        assert!(outcome.lock().unwrap().as_ref().unwrap().is_err());

        // A second completion is a no-op.
        assert!(!transport.complete_invocation(handle.id(), Err(Status::ok())));
    }

    #[tokio::test]
    async fn test_client_creation_counter() {
        let transport = LoopbackTransport::new();
        let uri = Uri::new("//vehicle/1/0/7002");
        assert_eq!(transport.clients_created(), 0);
        let _ = transport
            .open_rpc_client(&uri, RPC_PRIORITY, RPC_TTL)
            .await
            .unwrap();
        let _ = transport
            .open_rpc_client(&uri, RPC_PRIORITY, RPC_TTL)
            .await
            .unwrap();
        assert_eq!(transport.clients_created(), 2);

        let bindings = transport.client_bindings();
        assert_eq!(bindings.len(), 2);
        for (bound_uri, priority, ttl) in bindings {
            assert_eq!(bound_uri, uri);
            assert_eq!(priority, RPC_PRIORITY);
            assert_eq!(ttl, RPC_TTL);
        }
    }

    #[tokio::test]
    async fn test_invoke_with_stale_client_is_rejected() {
        let transport = LoopbackTransport::new();
        let stale = RpcClientHandle::new(999);
        let on_complete: InvokeCallback = Box::new(|_| {});
        let result = transport
            .invoke_method(&stale, PayloadFormat::Text, String::new(), on_complete)
            .await;
        assert!(matches!(result, Err(TransportError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let transport = LoopbackTransport::new();
        let uri = Uri::new("//vehicle/1/0/7003");

        transport.set_fail_send(true);
        assert!(transport.send(Message::default()).await.is_err());

        transport.set_fail_publish(true);
        assert!(transport
            .publish(&uri, PayloadFormat::Text, String::new())
            .await
            .is_err());

        transport.set_fail_register(true);
        let (sink, _) = collector();
        assert!(transport.register_listener(&uri, sink).await.is_err());

        transport.set_fail_subscribe(true);
        let (sink, _) = collector();
        assert!(transport.subscribe(&uri, sink).await.is_err());
    }

    #[tokio::test]
    async fn test_inject_delivery_reaches_listeners_only() {
        let transport = LoopbackTransport::new();
        let uri = Uri::new("//vehicle/1/0/7004");
        let (listener_sink, listened) = collector();
        let (subscriber_sink, subscribed) = collector();
        transport.register_listener(&uri, listener_sink).await.unwrap();
        transport.subscribe(&uri, subscriber_sink).await.unwrap();

        transport.inject_delivery(&uri, Message::delivery(&uri, PayloadFormat::Text, "x"));

        assert_eq!(listened.lock().unwrap().len(), 1);
        assert!(subscribed.lock().unwrap().is_empty());
    }
}
