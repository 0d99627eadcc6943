// SPDX-License-Identifier: MIT OR Apache-2.0
//! A deployer for nodes that already exist somewhere else reachable over
//! the same JSONL-over-socket protocol the subprocess contract uses.
//! Remote nodes are provisioned outside this process, so this deployer
//! only ever connects to one; it never creates or tears one down.

use async_trait::async_trait;
use max_error::MaxError;
use max_id::DeployerKind;
use max_node::UnlabelledHandle;
use max_transport::UnixSocketTransport;
use serde::{Deserialize, Serialize};

use crate::Deployer;

/// Where to reach an already-running remote node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Socket address the remote node's daemon is listening on.
    pub address: String,
}

type Factory<R> = Box<dyn Fn(UnixSocketTransport) -> R + Send + Sync>;

/// Connects to a node provisioned elsewhere. `create` is rejected:
/// there is nothing for this deployer to provision. `teardown` is a
/// no-op: this deployer never owned the remote node's lifecycle.
pub struct RemoteDeployer<R> {
    kind: DeployerKind,
    make_client: Factory<R>,
}

impl<R> RemoteDeployer<R> {
    /// Build a deployer that wraps every connected transport with
    /// `make_client`.
    pub fn new(kind: DeployerKind, make_client: impl Fn(UnixSocketTransport) -> R + Send + Sync + 'static) -> Self {
        Self { kind, make_client: Box::new(make_client) }
    }

    fn parse_config(config: &serde_json::Value) -> Result<RemoteConfig, MaxError> {
        serde_json::from_value(config.clone()).map_err(|e| MaxError::bad_input("deploy.invalid_config", e.to_string()))
    }
}

#[async_trait]
impl<R: Send + Sync> Deployer<R> for RemoteDeployer<R> {
    fn kind(&self) -> DeployerKind {
        self.kind.clone()
    }

    async fn create(&self, _config: &serde_json::Value, _spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError> {
        Err(MaxError::new("deploy.not_implemented", "remote nodes are provisioned externally, not created by this deployer")
            .with_facet(max_error::Facet::NotImplemented))
    }

    async fn connect(&self, config: &serde_json::Value, _spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError> {
        let config = Self::parse_config(config)?;
        let transport = UnixSocketTransport::connect(&config.address)
            .await
            .map_err(|e| MaxError::wrap(e).with_context("connecting to remote node"))?;
        Ok(UnlabelledHandle::new(self.kind.clone(), (self.make_client)(transport)))
    }

    async fn teardown(&self, _config: &serde_json::Value, _spec: &serde_json::Value) -> Result<(), MaxError> {
        Ok(())
    }
}
