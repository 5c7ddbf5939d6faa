//! URI-keyed handle registry.
//!
//! Every capability the agent sets up on behalf of the Test Manager is
//! recorded here under the exact URI it was requested for. One URI may
//! accumulate several handles of different kinds; removal is by URI and
//! drops everything registered under that key at once.
//!
//! The registry also tracks in-flight RPC invocations so their bookkeeping
//! tokens stay alive until the completion callback fires. Settled tokens
//! are pruned lazily, piggybacked on removal calls.

use crate::transport::{
    InvokeHandle, ListenerHandle, RpcClientHandle, RpcServerHandle, SubscriptionHandle,
};
use std::collections::HashMap;
use tca_core::schema::Uri;
use tca_core::status::{Status, StatusCode};
use tracing::debug;

/// One registered capability handle.
#[derive(Debug, Clone)]
pub enum Handle {
    Listener(ListenerHandle),
    Subscription(SubscriptionHandle),
    RpcClient(RpcClientHandle),
    RpcServer(RpcServerHandle),
}

impl Handle {
    /// Kind discriminant of this handle.
    pub fn kind(&self) -> HandleKind {
        match self {
            Handle::Listener(_) => HandleKind::Listener,
            Handle::Subscription(_) => HandleKind::Subscription,
            Handle::RpcClient(_) => HandleKind::RpcClient,
            Handle::RpcServer(_) => HandleKind::RpcServer,
        }
    }
}

/// Discriminant of a [`Handle`], used for queries and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Listener,
    Subscription,
    RpcClient,
    RpcServer,
}

/// Registry of live handles, keyed by exact URI.
#[derive(Default)]
pub struct HandleRegistry {
    entries: HashMap<Uri, Vec<Handle>>,
    pending: Vec<InvokeHandle>,
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle under `uri`. Duplicate registrations on the same
    /// URI accumulate; the operation itself always succeeds.
    pub fn add(&mut self, uri: &Uri, handle: Handle) -> Status {
        debug!("registry: add {:?} under {uri}", handle.kind());
        self.entries.entry(uri.clone()).or_default().push(handle);
        Status::ok()
    }

    /// Remove every handle registered under `uri`.
    ///
    /// Settled in-flight invocations are pruned on every call, whether or
    /// not the key exists. Returns NOT_FOUND when nothing was registered
    /// under the key.
    pub fn remove(&mut self, uri: &Uri) -> Status {
        self.prune_settled();
        match self.entries.remove(uri) {
            Some(handles) => {
                debug!("registry: removed {} handle(s) under {uri}", handles.len());
                Status::ok()
            }
            None => Status::new(
                StatusCode::NotFound,
                format!("uri not found in the registry: {uri}"),
            ),
        }
    }

    /// Find an existing RPC client bound to `uri`, if one was recorded.
    pub fn find_rpc_client(&self, uri: &Uri) -> Option<RpcClientHandle> {
        self.entries.get(uri)?.iter().find_map(|handle| match handle {
            Handle::RpcClient(client) => Some(client.clone()),
            _ => None,
        })
    }

    /// Whether an RPC server is already registered under `uri`.
    pub fn has_rpc_server(&self, uri: &Uri) -> bool {
        self.entries
            .get(uri)
            .is_some_and(|handles| {
                handles
                    .iter()
                    .any(|handle| matches!(handle, Handle::RpcServer(_)))
            })
    }

    /// Keep an in-flight invocation's token alive until it settles.
    pub fn track_invocation(&mut self, handle: InvokeHandle) {
        self.pending.push(handle);
    }

    /// Number of tracked in-flight invocations (settled ones included,
    /// until the next prune).
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of URIs with at least one registered handle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no handles at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kinds registered under `uri`, in insertion order.
    pub fn kinds_for(&self, uri: &Uri) -> Vec<HandleKind> {
        self.entries
            .get(uri)
            .map(|handles| handles.iter().map(Handle::kind).collect())
            .unwrap_or_default()
    }

    fn prune_settled(&mut self) {
        let before = self.pending.len();
        self.pending.retain(|handle| !handle.is_settled());
        let pruned = before - self.pending.len();
        if pruned > 0 {
            debug!("registry: pruned {pruned} settled invocation(s)");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(value: &str) -> Uri {
        Uri::new(value)
    }

    #[test]
    fn test_add_then_remove_then_remove_again() {
        let mut registry = HandleRegistry::new();
        let target = uri("//vehicle/1/0/8000");

        let status = registry.add(&target, Handle::Listener(ListenerHandle::new(1)));
        assert!(status.is_ok());

        assert!(registry.remove(&target).is_ok());
        let status = registry.remove(&target);
        assert_eq!(status.code, StatusCode::NotFound);
    }

    #[test]
    fn test_remove_unknown_uri_is_not_found() {
        let mut registry = HandleRegistry::new();
        let status = registry.remove(&uri("//never/1/0/1"));
        assert_eq!(status.code, StatusCode::NotFound);
        assert!(status.message.contains("//never/1/0/1"));
    }

    #[test]
    fn test_remove_drops_all_kinds_under_key() {
        let mut registry = HandleRegistry::new();
        let target = uri("//vehicle/1/0/8000");
        registry.add(&target, Handle::Listener(ListenerHandle::new(1)));
        registry.add(&target, Handle::Subscription(SubscriptionHandle::new(2)));
        registry.add(&target, Handle::RpcClient(RpcClientHandle::new(3)));
        assert_eq!(
            registry.kinds_for(&target),
            vec![
                HandleKind::Listener,
                HandleKind::Subscription,
                HandleKind::RpcClient
            ]
        );

        assert!(registry.remove(&target).is_ok());
        assert!(registry.is_empty());
        assert!(registry.kinds_for(&target).is_empty());
    }

    #[test]
    fn test_find_rpc_client_only_matches_clients() {
        let mut registry = HandleRegistry::new();
        let target = uri("//vehicle/1/0/7000");
        registry.add(&target, Handle::Listener(ListenerHandle::new(1)));
        assert!(registry.find_rpc_client(&target).is_none());

        registry.add(&target, Handle::RpcClient(RpcClientHandle::new(9)));
        let found = registry.find_rpc_client(&target).unwrap();
        assert_eq!(found.id(), 9);

        // Another URI stays unmatched.
        assert!(registry.find_rpc_client(&uri("//vehicle/1/0/7001")).is_none());
    }

    #[test]
    fn test_has_rpc_server_is_per_exact_uri() {
        let mut registry = HandleRegistry::new();
        let target = uri("//vehicle/1/0/7000");
        assert!(!registry.has_rpc_server(&target));

        registry.add(&target, Handle::RpcServer(RpcServerHandle::new(4)));
        assert!(registry.has_rpc_server(&target));
        assert!(!registry.has_rpc_server(&uri("//vehicle/1/0/7000b")));
    }

    #[test]
    fn test_settled_invocations_pruned_on_remove() {
        let mut registry = HandleRegistry::new();
        let live = InvokeHandle::new(1);
        let settled = InvokeHandle::new(2);
        settled.settle();
        registry.track_invocation(live.clone());
        registry.track_invocation(settled);
        assert_eq!(registry.pending_len(), 2);

        // Any removal call prunes, even one that misses.
        let _ = registry.remove(&uri("//absent/1/0/1"));
        assert_eq!(registry.pending_len(), 1);

        live.settle();
        let _ = registry.remove(&uri("//absent/1/0/1"));
        assert_eq!(registry.pending_len(), 0);
    }
}
