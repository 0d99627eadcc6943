// SPDX-License-Identifier: MIT OR Apache-2.0
//! A synchronous child-id-to-transport map, kept alongside a
//! [`max_node::Supervisor`] so a [`max_dispatch::Routable::route`]
//! implementation can answer without an `async fn` in a non-async trait
//! method.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use max_dispatch::Dispatcher;
use max_transport::{InProcessTransport, Transport};

/// Maps a child id to the transport used to reach it. `Supervisor` owns
/// lifecycle and identity; this owns the synchronous routing lookup a
/// `route()` call needs.
pub struct RoutingTable<TId: Ord + Clone> {
    entries: RwLock<BTreeMap<TId, Arc<dyn Transport>>>,
}

impl<TId: Ord + Clone> Default for RoutingTable<TId> {
    fn default() -> Self {
        Self { entries: RwLock::new(BTreeMap::new()) }
    }
}

impl<TId: Ord + Clone> RoutingTable<TId> {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a child's transport under `id`, replacing any existing
    /// entry.
    pub fn insert(&self, id: TId, transport: Arc<dyn Transport>) {
        self.entries.write().expect("routing table poisoned").insert(id, transport);
    }

    /// Remove a child's transport, e.g. once it has been torn down.
    pub fn remove(&self, id: &TId) {
        self.entries.write().expect("routing table poisoned").remove(id);
    }

    /// Look up a child's transport.
    #[must_use]
    pub fn get(&self, id: &TId) -> Option<Arc<dyn Transport>> {
        self.entries.read().expect("routing table poisoned").get(id).cloned()
    }
}

/// Wrap a routable child (an `Arc<dyn InstallationClient>` or
/// `Arc<dyn WorkspaceClient>`) in an [`InProcessTransport`] that tunnels
/// every call through a fresh [`Dispatcher`] over that same child. This is
/// the one routing path every deployment strategy shares: a subprocess or
/// remote child's concrete client type is a proxy that already tunnels
/// `handle_local` through its own transport, so wrapping it here behaves
/// identically to wrapping an in-process client directly.
pub fn shim_transport<R>(client: Arc<R>) -> Arc<dyn Transport>
where
    R: max_dispatch::Routable + 'static,
{
    Arc::new(InProcessTransport::new(move |request| {
        let dispatcher = Dispatcher::new(Arc::clone(&client));
        async move { dispatcher.dispatch(request).await }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use max_error::MaxError;
    use max_id::ScopeRouting;
    use max_protocol::RpcRequest;

    struct Echo;

    #[async_trait]
    impl max_dispatch::Routable for Echo {
        fn route(&self, _scope: &ScopeRouting) -> max_dispatch::RouteDecision {
            max_dispatch::RouteDecision::Local
        }

        async fn handle_local(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError> {
            Ok(serde_json::json!({"method": request.method}))
        }
    }

    #[tokio::test]
    async fn shim_transport_round_trips_through_dispatcher() {
        let transport = shim_transport(Arc::new(Echo));
        let response = transport.call(RpcRequest::new("r1", "", "ping", vec![])).await.unwrap();
        assert!(response.ok);
        assert_eq!(response.result.unwrap()["method"], "ping");
    }

    #[test]
    fn table_insert_get_remove() {
        let table: RoutingTable<String> = RoutingTable::new();
        assert!(table.get(&"a".to_string()).is_none());

        let transport = shim_transport(Arc::new(Echo));
        table.insert("a".to_string(), transport);
        assert!(table.get(&"a".to_string()).is_some());

        table.remove(&"a".to_string());
        assert!(table.get(&"a".to_string()).is_none());
    }
}
