// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-deploy
//!
//! Deployment strategies: stateless factories that turn a `(config, spec)`
//! pair into a running node's [`UnlabelledHandle`]. A deployer assigns no
//! identity and remembers nothing about a node across calls beyond what it
//! needs to locate a process it itself spawned within this run.

pub mod inprocess;
pub mod registry;
pub mod remote;
pub mod subprocess;

use async_trait::async_trait;
use max_error::MaxError;
use max_id::DeployerKind;
use max_node::UnlabelledHandle;

pub use inprocess::InProcessDeployer;
pub use registry::DeployerRegistry;
pub use remote::{RemoteConfig, RemoteDeployer};
pub use subprocess::{SubprocessConfig, SubprocessDeployer};

/// A stateless factory bound to one [`DeployerKind`]. `config` carries
/// whatever this strategy needs to locate or spawn a node (a command
/// line, a socket path, a remote address); `spec` is the installation
/// spec handed to the node itself.
#[async_trait]
pub trait Deployer<R>: Send + Sync {
    /// The strategy this deployer implements.
    fn kind(&self) -> DeployerKind;

    /// Bring a brand-new node into existence.
    async fn create(&self, config: &serde_json::Value, spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError>;

    /// Attach to a node that already exists, reconstructing a handle from
    /// persisted `config`/`spec` alone (used by startup reconciliation).
    /// Strategies with nothing to reconnect to may reject this with
    /// [`max_error::Facet::NotImplemented`].
    async fn connect(&self, config: &serde_json::Value, spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError>;

    /// Release whatever resources this strategy owns for the node
    /// described by `config`/`spec`. Best-effort: failures are reported,
    /// not propagated as a reason to stop a larger teardown sequence.
    async fn teardown(&self, config: &serde_json::Value, spec: &serde_json::Value) -> Result<(), MaxError>;
}
