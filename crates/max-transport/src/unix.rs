// SPDX-License-Identifier: MIT OR Apache-2.0
//! A transport over a Unix domain socket, framing [`RpcRequest`]/
//! [`RpcResponse`] as JSONL exactly as the subprocess contract requires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use max_protocol::{JsonlCodec, RpcRequest, RpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::mux::{Multiplexer, recv_closed};
use crate::{Transport, TransportError};

/// Carries requests to a peer over a [`UnixStream`] and demultiplexes its
/// JSONL response stream by request id.
pub struct UnixSocketTransport {
    writer: Mutex<OwnedWriteHalf>,
    mux: Arc<Multiplexer>,
    closed: Arc<AtomicBool>,
}

impl UnixSocketTransport {
    /// Wrap an already-connected socket. Spawns a background task that
    /// reads response lines until EOF, at which point outstanding requests
    /// are drained with [`TransportError::Closed`].
    pub fn new(stream: UnixStream) -> Self {
        let (read_half, writer) = stream.into_split();
        let mux = Arc::new(Multiplexer::new());
        spawn_reader(read_half, Arc::clone(&mux));
        Self { writer: Mutex::new(writer), mux, closed: Arc::new(AtomicBool::new(false)) }
    }

    /// Connect to a listening daemon at `path` per the subprocess
    /// contract's socket path.
    pub async fn connect(path: impl AsRef<std::path::Path>) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::new(stream))
    }
}

fn spawn_reader(read_half: OwnedReadHalf, mux: Arc<Multiplexer>) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match JsonlCodec::decode::<RpcResponse>(trimmed) {
                        Ok(response) => mux.resolve(&response.id.clone(), response),
                        Err(error) => tracing::warn!(%error, "dropping malformed response line"),
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "unix transport read failed, closing");
                    break;
                }
            }
        }
        mux.drain_closed();
    });
}

#[async_trait]
impl Transport for UnixSocketTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let id = request.id.clone();
        let receiver = self.mux.register(id);

        let line = JsonlCodec::encode(&request)?;
        {
            let mut writer = self.writer.lock().await;
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }

        receiver.await.map_err(|_| recv_closed())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        self.mux.drain_closed();
    }
}
