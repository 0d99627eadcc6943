// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-dispatch
//!
//! The server-side [`Dispatcher`] and client-side [`Proxy`] that sit on
//! either end of a [`max_transport::Transport`]. Neither one knows how the
//! bytes move; they agree only on the [`max_protocol::RpcRequest`]/
//! [`max_protocol::RpcResponse`] shapes.

use std::sync::Arc;

use async_trait::async_trait;
use max_error::MaxError;
use max_id::ScopeRouting;
use max_protocol::{RpcRequest, RpcResponse};
use max_transport::Transport;

/// How a [`Dispatcher`] should handle one request, decided by the node it
/// wraps before any local method is invoked.
pub enum RouteDecision {
    /// Handle the request at this node via [`Routable::handle_local`].
    Local,
    /// Forward the request, with `scope` already stripped of this level's
    /// field, to a child reachable through `transport`.
    Forward {
        /// The routing envelope to attach to the forwarded request.
        scope: ScopeRouting,
        /// The child's transport.
        transport: Arc<dyn Transport>,
    },
    /// `scope` named a child at this level that does not exist.
    ChildNotFound {
        /// The id that named the missing child, for the `NotFound` error.
        id: String,
    },
}

/// Implemented by a node (installation, workspace, or global) to let a
/// [`Dispatcher`] route and answer requests without the dispatcher knowing
/// anything about the node's own methods or child topology.
#[async_trait]
pub trait Routable: Send + Sync {
    /// Decide whether `scope` names one of this node's children.
    ///
    /// Called only when the request carries a non-empty `scope`; a request
    /// with no scope always resolves to [`RouteDecision::Local`] without
    /// consulting this method.
    fn route(&self, scope: &ScopeRouting) -> RouteDecision;

    /// Handle a request targeted at this node directly: `target == ""` for
    /// the root surface, `target == "engine"` for the node's `Engine`.
    async fn handle_local(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError>;
}

#[async_trait]
impl<T: Routable + ?Sized> Routable for Arc<T> {
    fn route(&self, scope: &ScopeRouting) -> RouteDecision {
        (**self).route(scope)
    }

    async fn handle_local(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError> {
        (**self).handle_local(request).await
    }
}

/// Server-side entry point: routes an incoming [`RpcRequest`] to a child or
/// answers it locally, and never re-wraps a child's error.
pub struct Dispatcher<R: Routable> {
    routable: Arc<R>,
}

impl<R: Routable> Dispatcher<R> {
    /// Wrap a routable node.
    pub fn new(routable: Arc<R>) -> Self {
        Self { routable }
    }

    /// Route and answer one request, producing the response to send back
    /// over whatever transport received it.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let decision = match &request.scope {
            Some(scope) if scope.workspace_id.is_some() || scope.installation_id.is_some() => {
                self.routable.route(scope)
            }
            _ => RouteDecision::Local,
        };

        match decision {
            RouteDecision::Local => match self.routable.handle_local(&request).await {
                Ok(result) => RpcResponse::ok(request.id, result),
                Err(error) => RpcResponse::err(request.id, error.to_dto()),
            },
            RouteDecision::Forward { scope, transport } => {
                let forwarded = RpcRequest { scope: Some(scope), ..request.clone() };
                match transport.call(forwarded).await {
                    Ok(response) => response,
                    Err(error) => {
                        let max_error = MaxError::new("transport.closed", error.to_string());
                        RpcResponse::err(request.id, max_error.to_dto())
                    }
                }
            }
            RouteDecision::ChildNotFound { id } => {
                let error = MaxError::not_found("dispatch.child_not_found", "child", id);
                RpcResponse::err(request.id, error.to_dto())
            }
        }
    }
}

/// Client-side mirror of a [`Dispatcher`]: builds an [`RpcRequest`], sends
/// it through a [`Transport`], and reconstitutes a [`MaxError`] on failure
/// so the caller cannot tell a proxied call from a direct one.
pub struct Proxy {
    transport: Arc<dyn Transport>,
    target: String,
    scope: Option<ScopeRouting>,
}

impl Proxy {
    /// Build a proxy addressed to `target` on the node at the other end of
    /// `transport`, with no scope (the receiving node itself).
    pub fn new(transport: Arc<dyn Transport>, target: impl Into<String>) -> Self {
        Self { transport, target: target.into(), scope: None }
    }

    /// Attach a routing envelope so calls descend to a child of the node at
    /// the other end of the transport.
    #[must_use]
    pub fn with_scope(mut self, scope: ScopeRouting) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Invoke `method` with `args`, returning the method's result or the
    /// reconstituted [`MaxError`] it failed with.
    pub async fn call(&self, method: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value, MaxError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut request = RpcRequest::new(id, self.target.clone(), method, args);
        if let Some(scope) = self.scope.clone() {
            request = request.with_scope(scope);
        }

        let response = self
            .transport
            .call(request)
            .await
            .map_err(|error| MaxError::new("transport.closed", error.to_string()))?;

        if response.ok {
            Ok(response.result.unwrap_or(serde_json::Value::Null))
        } else {
            let dto = response.error.ok_or_else(|| MaxError::new("dispatch.malformed_response", "ok=false response carried no error"))?;
            Err(MaxError::reconstitute(dto))
        }
    }
}
