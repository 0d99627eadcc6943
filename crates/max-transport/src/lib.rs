// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-transport
//!
//! A bidirectional, multiplexed pipe to one federation node. A
//! [`Transport`] carries [`RpcRequest`]/[`RpcResponse`] pairs without
//! interpreting their `target`, `method`, `args`, or `scope` — that
//! interpretation belongs to a dispatcher, not the pipe.

pub mod error;
pub mod inprocess;
pub mod mux;
pub mod unix;

use async_trait::async_trait;
use max_protocol::{RpcRequest, RpcResponse};

pub use error::TransportError;
pub use inprocess::InProcessTransport;
pub use unix::UnixSocketTransport;

/// A single bidirectional pipe to one node.
///
/// Implementations multiplex concurrent calls by `RpcRequest.id`: responses
/// may arrive in any order and each resolves only the caller awaiting that
/// id. A `Transport` MUST NOT interpret `target`, `method`, `args`, or
/// `scope` — it transports opaque request/response values.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and await its matching response.
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, TransportError>;

    /// Close the transport. Any request still outstanding resolves with
    /// [`TransportError::Closed`] rather than hanging forever.
    async fn close(&self);
}
