// SPDX-License-Identifier: MIT OR Apache-2.0
//! A transport that dispatches directly to an in-process handler, with no
//! real pipe — used to wire a child node into its parent's process without
//! a subprocess or socket.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use max_protocol::{RpcRequest, RpcResponse};
use tokio::sync::mpsc;

use crate::mux::{Multiplexer, recv_closed};
use crate::{Transport, TransportError};

type DispatchFn = Arc<dyn Fn(RpcRequest) -> Pin<Box<dyn Future<Output = RpcResponse> + Send>> + Send + Sync>;

/// Carries requests to an in-process dispatcher and demultiplexes its
/// responses by request id, exactly as a real pipe would, so the same
/// [`Transport`] contract — out-of-order responses resolve independently,
/// `close()` drains outstanding requests — holds without a real process
/// boundary.
pub struct InProcessTransport {
    outbound: mpsc::Sender<RpcRequest>,
    mux: Arc<Multiplexer>,
    closed: Arc<AtomicBool>,
}

impl InProcessTransport {
    /// Build a transport that hands every request to `dispatch`, running
    /// each call concurrently so responses may complete in any order.
    pub fn new<F, Fut>(dispatch: F) -> Self
    where
        F: Fn(RpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResponse> + Send + 'static,
    {
        let dispatch: DispatchFn = Arc::new(move |req| Box::pin(dispatch(req)));
        let (outbound, mut inbound) = mpsc::channel::<RpcRequest>(256);
        let mux = Arc::new(Multiplexer::new());

        let driver_mux = Arc::clone(&mux);
        tokio::spawn(async move {
            while let Some(request) = inbound.recv().await {
                let id = request.id.clone();
                let dispatch = Arc::clone(&dispatch);
                let mux = Arc::clone(&driver_mux);
                tokio::spawn(async move {
                    let response = dispatch(request).await;
                    mux.resolve(&id, response);
                });
            }
            driver_mux.drain_closed();
        });

        Self { outbound, mux, closed: Arc::new(AtomicBool::new(false)) }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let id = request.id.clone();
        let receiver = self.mux.register(id);
        self.outbound.send(request).await.map_err(|_| TransportError::Closed)?;
        receiver.await.map_err(|_| recv_closed())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.mux.drain_closed();
    }
}
