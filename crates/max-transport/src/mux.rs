// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request/response multiplexing shared by every [`crate::Transport`]
//! implementation: responses may arrive in any order, matched back to
//! their caller by the request `id`.

use std::collections::HashMap;
use std::sync::Mutex;

use max_protocol::RpcResponse;
use tokio::sync::oneshot;

use crate::TransportError;

/// Tracks one [`crate::Transport`]'s in-flight requests by id.
#[derive(Default)]
pub struct Multiplexer {
    pending: Mutex<HashMap<String, oneshot::Sender<RpcResponse>>>,
}

impl Multiplexer {
    /// A fresh multiplexer with no outstanding requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the response for `id`, returning the receiver
    /// half that resolves when [`Self::resolve`] is called with that id.
    pub fn register(&self, id: String) -> oneshot::Receiver<RpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().expect("mux lock poisoned").insert(id, tx);
        rx
    }

    /// Deliver a response to its waiting caller. A response for an id with
    /// no registered waiter (already resolved, or never registered) is
    /// dropped.
    pub fn resolve(&self, id: &str, response: RpcResponse) {
        if let Some(tx) = self.pending.lock().expect("mux lock poisoned").remove(id) {
            let _ = tx.send(response);
        }
    }

    /// Drain every outstanding request with [`TransportError::Closed`].
    /// Called when the underlying pipe is closed, so no caller is left
    /// waiting forever.
    pub fn drain_closed(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().expect("mux lock poisoned"));
        for (_, tx) in pending {
            drop(tx);
        }
    }

    /// Number of requests currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().expect("mux lock poisoned").len()
    }
}

/// Convert a dropped-sender receive failure into the closed-transport
/// error every `Transport::call` implementation surfaces uniformly.
pub fn recv_closed() -> TransportError {
    TransportError::Closed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_to_registered_waiter() {
        let mux = Multiplexer::new();
        let rx = mux.register("req-1".into());
        mux.resolve("req-1", RpcResponse::ok("req-1", serde_json::json!(null)));
        let resp = rx.await.unwrap();
        assert!(resp.ok);
    }

    #[tokio::test]
    async fn drain_closed_drops_pending_senders_causing_recv_error() {
        let mux = Multiplexer::new();
        let rx = mux.register("req-1".into());
        mux.drain_closed();
        assert!(rx.await.is_err());
    }

    #[test]
    fn outstanding_tracks_registered_count() {
        let mux = Multiplexer::new();
        assert_eq!(mux.outstanding(), 0);
        let _rx = mux.register("req-1".into());
        assert_eq!(mux.outstanding(), 1);
        mux.resolve("req-1", RpcResponse::ok("req-1", serde_json::json!(null)));
        assert_eq!(mux.outstanding(), 0);
    }
}
