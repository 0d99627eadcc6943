// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-protocol
//!
//! Wire format between a dispatcher and a proxy: JSON objects, one per
//! line, over whatever [`Transport`] carries them. `Transport` itself
//! lives in `max-transport`; this crate only defines the message shapes
//! and the codec that frames them.

pub mod codec;

use max_error::MaxErrorDto;
use max_id::ScopeRouting;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A call from a proxy to a dispatcher.
///
/// `target` names the surface to invoke (`""` for a node's root surface,
/// `"engine"` for its `Engine`); `method`/`args` name the call itself.
/// `scope` carries the routing envelope a dispatcher strips one level at a
/// time as the request descends toward its destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Correlates this request with its [`RpcResponse`]. Unique per
    /// in-flight call on one transport.
    pub id: String,
    /// The surface to invoke.
    pub target: String,
    /// Method name on that surface.
    pub method: String,
    /// Positional arguments, splatted onto the method.
    pub args: Vec<serde_json::Value>,
    /// Routing envelope, present when the call targets a scope below the
    /// receiving node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeRouting>,
}

impl RpcRequest {
    /// Build a request with no scope (addressed to the receiving node
    /// itself).
    pub fn new(id: impl Into<String>, target: impl Into<String>, method: impl Into<String>, args: Vec<serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            method: method.into(),
            args,
            scope: None,
        }
    }

    /// Attach a routing envelope to an existing request.
    #[must_use]
    pub fn with_scope(mut self, scope: ScopeRouting) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// A dispatcher's reply to one [`RpcRequest`].
///
/// Exactly one of `result`/`error` is present, matching `ok`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    /// Echoes the request's `id`.
    pub id: String,
    /// `true` iff the call succeeded.
    pub ok: bool,
    /// The method's return value, present iff `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error the call failed with, present iff not `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MaxErrorDto>,
}

impl RpcResponse {
    /// Build a successful response.
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self { id: id.into(), ok: true, result: Some(result), error: None }
    }

    /// Build a failed response carrying the wire form of a `MaxError`.
    pub fn err(id: impl Into<String>, error: MaxErrorDto) -> Self {
        Self { id: id.into(), ok: false, result: None, error: Some(error) }
    }
}

/// Errors arising from JSONL encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization or deserialization failure.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stateless codec for framing [`RpcRequest`]/[`RpcResponse`] as
/// newline-delimited JSON.
#[derive(Debug, Clone, Copy)]
pub struct JsonlCodec;

impl JsonlCodec {
    /// Serialize any JSONL message to a newline-terminated JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if `msg` cannot be serialized.
    pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
        let mut s = serde_json::to_string(msg)?;
        s.push('\n');
        Ok(s)
    }

    /// Deserialize a single JSON line into a message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if the line is not valid JSON or
    /// does not match `T`'s shape.
    pub fn decode<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Return a lazy iterator reading JSONL lines from `reader`, skipping
    /// blank lines.
    pub fn decode_stream<T: for<'de> Deserialize<'de>>(
        reader: impl std::io::BufRead,
    ) -> impl Iterator<Item = Result<T, ProtocolError>> {
        use std::io::BufRead as _;
        reader.lines().filter_map(|line_result| match line_result {
            Err(e) => Some(Err(ProtocolError::Io(e))),
            Ok(line) => {
                if line.trim().is_empty() {
                    None
                } else {
                    Some(Self::decode(line.trim()))
                }
            }
        })
    }

    /// Write a single message as a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on serialization or I/O failure.
    pub fn encode_to_writer<T: Serialize>(writer: &mut impl std::io::Write, msg: &T) -> Result<(), ProtocolError> {
        let line = Self::encode(msg)?;
        writer.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_without_scope() {
        let req = RpcRequest::new("req-1", "", "schema", vec![]);
        let line = JsonlCodec::encode(&req).unwrap();
        assert!(line.ends_with('\n'));
        let json: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert!(json.get("scope").is_none());
        let back: RpcRequest = JsonlCodec::decode(line.trim()).unwrap();
        assert_eq!(back.id, "req-1");
        assert_eq!(back.method, "schema");
    }

    #[test]
    fn request_with_scope_serializes_camel_case() {
        use max_id::{InstallationId, WorkspaceId};
        let req = RpcRequest::new("req-2", "engine", "query", vec![]).with_scope(ScopeRouting {
            workspace_id: Some(WorkspaceId::new("ws-1")),
            installation_id: Some(InstallationId::new("inst-1")),
        });
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["scope"]["workspaceId"], "ws-1");
        assert_eq!(json["scope"]["installationId"], "inst-1");
    }

    #[test]
    fn response_ok_omits_error_field() {
        let resp = RpcResponse::ok("req-1", serde_json::json!({"name": "inst-1"}));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["ok"], true);
    }

    #[test]
    fn response_err_omits_result_field() {
        let dto = max_error::MaxError::not_found("installation.not_found", "installation", "inst-2").to_dto();
        let resp = RpcResponse::err("req-3", dto);
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["ok"], false);
    }

    #[test]
    fn decode_stream_skips_blank_lines() {
        let input = "{\"id\":\"a\",\"target\":\"\",\"method\":\"m\",\"args\":[]}\n\n{\"id\":\"b\",\"target\":\"\",\"method\":\"m\",\"args\":[]}\n";
        let reader = std::io::BufReader::new(input.as_bytes());
        let reqs: Vec<RpcRequest> = JsonlCodec::decode_stream(reader).collect::<Result<_, _>>().unwrap();
        assert_eq!(reqs.len(), 2);
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = JsonlCodec::decode::<RpcRequest>("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }
}
