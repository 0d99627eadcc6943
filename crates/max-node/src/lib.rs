// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-node
//!
//! Node handles, identity assignment, and health aggregation shared by
//! every level of the federation hierarchy (installation, workspace,
//! global). A node's transport — in-process, subprocess, or remote — is
//! invisible here; `Supervisor` only ever sees the typed client surface.

pub mod health;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use max_error::MaxError;
use max_id::DeployerKind;
use max_lifecycle::Lifecycle;
use tokio::sync::RwLock;

pub use health::HealthStatus;

/// The contract every supervised node exposes at its root surface:
/// `start`/`stop` from [`Lifecycle`], plus a point-in-time health check.
#[async_trait]
pub trait Supervised: Lifecycle {
    /// Report this node's current health.
    async fn health(&self) -> HealthStatus;
}

#[async_trait]
impl<T: Supervised + ?Sized> Supervised for Arc<T> {
    async fn health(&self) -> HealthStatus {
        (**self).health().await
    }
}

/// Generates locally-unique opaque ids for newly registered nodes.
/// Implementations typically wrap a UUID.
pub trait IdGenerator<TId>: Send + Sync {
    /// Produce a fresh id, distinct from any previously generated by this
    /// generator.
    fn generate(&self) -> TId;
}

/// The default [`IdGenerator`]: a v4 UUID string wrapped into `TId` via a
/// caller-supplied constructor (e.g. `InstallationId::new`).
pub struct UuidIdGenerator<TId> {
    make: Box<dyn Fn(String) -> TId + Send + Sync>,
}

impl<TId> UuidIdGenerator<TId> {
    /// Build a generator that wraps each freshly generated UUID with
    /// `make`.
    pub fn new(make: impl Fn(String) -> TId + Send + Sync + 'static) -> Self {
        Self { make: Box::new(make) }
    }
}

impl<TId: Send + Sync> IdGenerator<TId> for UuidIdGenerator<TId> {
    fn generate(&self) -> TId {
        (self.make)(uuid::Uuid::new_v4().to_string())
    }
}

/// A handle returned by a [`Deployer`](crate::Deployer) before identity is
/// assigned: the typed client plus the deployer kind that produced it.
pub struct UnlabelledHandle<R> {
    /// The deployer strategy that produced this node.
    pub deployer_kind: DeployerKind,
    /// The typed client surface. Whether this is a direct object or a
    /// transparent proxy is invisible to callers.
    pub client: R,
}

impl<R> UnlabelledHandle<R> {
    /// Wrap a client with the deployer kind that produced it.
    pub fn new(deployer_kind: DeployerKind, client: R) -> Self {
        Self { deployer_kind, client }
    }
}

/// A registered node: the typed client surface, stamped with the identity
/// its [`Supervisor`] assigned. `NodeHandle` derefs to the client, so
/// holders call its methods directly without unwrapping.
pub struct NodeHandle<R, TId> {
    /// The id this supervisor assigned (or adopted) for this node.
    pub id: TId,
    /// The deployer strategy that produced this node.
    pub deployer_kind: DeployerKind,
    /// The typed client surface.
    pub client: R,
}

impl<R, TId> std::ops::Deref for NodeHandle<R, TId> {
    type Target = R;
    fn deref(&self) -> &R {
        &self.client
    }
}

/// The sole owner of identity within one level of the hierarchy. Assigns
/// or adopts ids, stores the resulting handles, and aggregates child
/// health.
pub struct Supervisor<R, TId> {
    generator: Box<dyn IdGenerator<TId> + Send + Sync>,
    nodes: RwLock<BTreeMap<TId, Arc<NodeHandle<R, TId>>>>,
}

impl<R, TId> Supervisor<R, TId>
where
    TId: Clone + Ord + Send + Sync + 'static,
    R: Send + Sync,
{
    /// Build a supervisor backed by the given id generator.
    pub fn new(generator: impl IdGenerator<TId> + Send + Sync + 'static) -> Self {
        Self { generator: Box::new(generator), nodes: RwLock::new(BTreeMap::new()) }
    }

    /// Assign an id to `unlabelled` (or adopt `explicit_id`, used for
    /// startup reconciliation with a persisted registry) and register the
    /// resulting handle.
    pub async fn register(&self, unlabelled: UnlabelledHandle<R>, explicit_id: Option<TId>) -> Arc<NodeHandle<R, TId>> {
        let id = explicit_id.unwrap_or_else(|| self.generator.generate());
        let handle = Arc::new(NodeHandle { id: id.clone(), deployer_kind: unlabelled.deployer_kind, client: unlabelled.client });
        self.nodes.write().await.insert(id, Arc::clone(&handle));
        handle
    }

    /// Remove a node by id, returning its handle if it was registered.
    pub async fn unregister(&self, id: &TId) -> Option<Arc<NodeHandle<R, TId>>> {
        self.nodes.write().await.remove(id)
    }

    /// Look up a registered node by id.
    pub async fn get(&self, id: &TId) -> Option<Arc<NodeHandle<R, TId>>> {
        self.nodes.read().await.get(id).cloned()
    }

    /// List every currently registered node.
    pub async fn list(&self) -> Vec<Arc<NodeHandle<R, TId>>> {
        self.nodes.read().await.values().cloned().collect()
    }
}

impl<R, TId> Supervisor<R, TId>
where
    TId: Clone + Ord + Send + Sync + 'static,
    R: Supervised + Send + Sync,
{
    /// Aggregate health across every registered node: healthy iff all
    /// children are healthy, otherwise the strongest negative status of
    /// any child.
    pub async fn health(&self) -> HealthStatus {
        let handles: Vec<_> = self.nodes.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(handles.len());
        for handle in &handles {
            statuses.push(handle.client.health().await);
        }
        HealthStatus::aggregate(statuses)
    }
}

#[async_trait]
impl<R, TId> Lifecycle for Supervisor<R, TId>
where
    TId: Clone + Ord + Send + Sync + 'static,
    R: Lifecycle + Send + Sync,
{
    /// Start every currently registered node.
    async fn start(&self) -> Result<(), MaxError> {
        let handles: Vec<_> = self.nodes.read().await.values().cloned().collect();
        for handle in &handles {
            handle.client.start().await?;
        }
        Ok(())
    }

    /// Stop every currently registered node. Best-effort: a failure on one
    /// node does not stop the rest from being asked to stop.
    async fn stop(&self) -> Result<(), MaxError> {
        let handles: Vec<_> = self.nodes.read().await.values().cloned().collect();
        let mut first_err = None;
        for handle in &handles {
            if let Err(e) = handle.client.stop().await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
