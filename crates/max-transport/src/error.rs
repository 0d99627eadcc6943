// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for transport I/O and multiplexing failures.

use thiserror::Error;

/// Errors a [`crate::Transport`] implementation can surface. These are
/// transport-level failures (the pipe broke, a response never arrived);
/// an error *returned by the remote method itself* instead travels as an
/// `RpcResponse { ok: false, error: Some(..) }` and is never a
/// `TransportError`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was closed, locally or by the peer, with this request
    /// still outstanding.
    #[error("transport closed with request outstanding")]
    Closed,

    /// The wire message could not be framed or parsed.
    #[error("protocol error: {0}")]
    Codec(#[from] max_protocol::ProtocolError),

    /// Underlying I/O error on the pipe.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
