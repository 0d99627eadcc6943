// SPDX-License-Identifier: MIT OR Apache-2.0
//! An installation: one connector bound to one data store, exposing a
//! schema, an engine, and a sync surface.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use max_dispatch::{Dispatcher, Proxy, RouteDecision, Routable};
use max_engine::{Engine, Entity, Filter, PageRequest, Schema};
use max_error::{Facet, MaxError};
use max_id::{ConnectorType, InstallationId, ScopeRouting};
use max_lifecycle::Lifecycle;
use max_node::{HealthStatus, Supervised};
use max_protocol::RpcRequest;
use max_sync::{EventBus, SyncEvent, SyncExecutor, SyncHandle, SyncPlan};
use serde::{Deserialize, Serialize};

use crate::connector::ConnectorContext;

/// What `describe()` reports about an installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationDescription {
    /// Connector this installation runs.
    pub connector: ConnectorType,
    /// Display name.
    pub name: String,
    /// The entity schema this installation enforces.
    pub schema: Schema,
}

/// Called with each [`SyncEvent`] as a sync run progresses.
pub type SyncObserver = Arc<dyn Fn(SyncEvent) + Send + Sync>;

/// The contract every installation exposes, whether the node behind it is
/// in-process, a subprocess, or remote.
#[async_trait]
pub trait InstallationClient: Supervised + Routable {
    /// Summarize this installation: connector, name, schema.
    async fn describe(&self) -> Result<InstallationDescription, MaxError>;

    /// The entity schema this installation enforces.
    async fn schema(&self) -> Result<Schema, MaxError>;

    /// Create an entity through this installation's engine.
    async fn create_entity(&self, entity_type: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError>;

    /// Fetch an entity through this installation's engine.
    async fn get_entity(&self, entity_type: &str, id: &str) -> Result<Entity, MaxError>;

    /// Update an entity through this installation's engine.
    async fn update_entity(&self, entity_type: &str, id: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError>;

    /// Delete an entity through this installation's engine.
    async fn delete_entity(&self, entity_type: &str, id: &str) -> Result<(), MaxError>;

    /// Query entities through this installation's engine.
    async fn query_entities(&self, entity_type: &str, filters: &[Filter], page: PageRequest) -> Result<max_engine::Page<Entity>, MaxError>;

    /// Start (or resume progress on) a sync run, seeding the root entity
    /// on first call. `observer`, if given, is invoked with every
    /// [`SyncEvent`] the run publishes.
    async fn sync(&self, observer: Option<SyncObserver>) -> Result<Arc<SyncHandle>, MaxError>;

    /// Record the id a supervisor assigned this installation, so `sync()`
    /// can derive a deterministic sync id from it. Called once, right
    /// after registration, before the installation becomes routable.
    /// A proxied installation has no use for its own id (sync must run on
    /// the process that owns the installation) and keeps the no-op default.
    fn set_installation_id(&self, id: InstallationId) {
        let _ = id;
    }
}

#[async_trait]
impl<T: InstallationClient + ?Sized> InstallationClient for Arc<T> {
    async fn describe(&self) -> Result<InstallationDescription, MaxError> {
        (**self).describe().await
    }
    async fn schema(&self) -> Result<Schema, MaxError> {
        (**self).schema().await
    }
    async fn create_entity(&self, entity_type: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError> {
        (**self).create_entity(entity_type, fields).await
    }
    async fn get_entity(&self, entity_type: &str, id: &str) -> Result<Entity, MaxError> {
        (**self).get_entity(entity_type, id).await
    }
    async fn update_entity(&self, entity_type: &str, id: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError> {
        (**self).update_entity(entity_type, id, fields).await
    }
    async fn delete_entity(&self, entity_type: &str, id: &str) -> Result<(), MaxError> {
        (**self).delete_entity(entity_type, id).await
    }
    async fn query_entities(&self, entity_type: &str, filters: &[Filter], page: PageRequest) -> Result<max_engine::Page<Entity>, MaxError> {
        (**self).query_entities(entity_type, filters, page).await
    }
    async fn sync(&self, observer: Option<SyncObserver>) -> Result<Arc<SyncHandle>, MaxError> {
        (**self).sync(observer).await
    }
    fn set_installation_id(&self, id: InstallationId) {
        (**self).set_installation_id(id);
    }
}

/// The in-process implementation: wires a schema, a seeder, an engine,
/// and a sync executor from a connector's static descriptor.
pub struct InstallationMax {
    connector: ConnectorType,
    name: String,
    schema: Schema,
    engine: Arc<dyn Engine>,
    seeder: Arc<dyn crate::connector::Seeder>,
    ctx: Arc<ConnectorContext>,
    sync_plan: SyncPlan,
    executor: SyncExecutor,
    bus: Arc<EventBus>,
    seeded: AtomicBool,
    id: OnceLock<InstallationId>,
}

impl InstallationMax {
    /// Build an installation from its wired-up parts. Construction does
    /// no I/O; `Lifecycle::start` brings up the credential refresh
    /// schedulers.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        connector: ConnectorType,
        name: String,
        schema: Schema,
        engine: Arc<dyn Engine>,
        seeder: Arc<dyn crate::connector::Seeder>,
        ctx: Arc<ConnectorContext>,
        sync_plan: SyncPlan,
        executor: SyncExecutor,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            connector,
            name,
            schema,
            engine,
            seeder,
            ctx,
            sync_plan,
            executor,
            bus,
            seeded: AtomicBool::new(false),
            id: OnceLock::new(),
        }
    }

    async fn seed_if_needed(&self) -> Result<(), MaxError> {
        if self.seeded.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(root_entity_type) = self.schema.root_entity_type() else {
            return Ok(());
        };
        let fields = self.seeder.seed(&self.ctx).await?;
        self.engine.create(root_entity_type, fields).await?;
        Ok(())
    }

    /// `"sync-{installationId}"` once a supervisor has assigned this
    /// installation an id, falling back to a random id for an installation
    /// that is driving a sync before (or without ever) being registered.
    fn sync_id(&self) -> String {
        match self.id.get() {
            Some(id) => format!("sync-{id}"),
            None => format!("sync-{}", uuid::Uuid::new_v4()),
        }
    }
}

#[async_trait]
impl Lifecycle for InstallationMax {
    async fn start(&self) -> Result<(), MaxError> {
        self.ctx.credentials.start_refresh_schedulers();
        Ok(())
    }

    async fn stop(&self) -> Result<(), MaxError> {
        self.ctx.credentials.stop().await;
        Ok(())
    }
}

#[async_trait]
impl Supervised for InstallationMax {
    async fn health(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

#[async_trait]
impl InstallationClient for InstallationMax {
    async fn describe(&self) -> Result<InstallationDescription, MaxError> {
        Ok(InstallationDescription {
            connector: self.connector.clone(),
            name: self.name.clone(),
            schema: self.schema.clone(),
        })
    }

    async fn schema(&self) -> Result<Schema, MaxError> {
        Ok(self.schema.clone())
    }

    async fn create_entity(&self, entity_type: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError> {
        self.engine.create(entity_type, fields).await
    }

    async fn get_entity(&self, entity_type: &str, id: &str) -> Result<Entity, MaxError> {
        self.engine.get(entity_type, id).await
    }

    async fn update_entity(&self, entity_type: &str, id: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError> {
        self.engine.update(entity_type, id, fields).await
    }

    async fn delete_entity(&self, entity_type: &str, id: &str) -> Result<(), MaxError> {
        self.engine.delete(entity_type, id).await
    }

    async fn query_entities(&self, entity_type: &str, filters: &[Filter], page: PageRequest) -> Result<max_engine::Page<Entity>, MaxError> {
        self.engine.query(entity_type, filters, page).await
    }

    async fn sync(&self, observer: Option<SyncObserver>) -> Result<Arc<SyncHandle>, MaxError> {
        self.seed_if_needed().await?;

        let sync_id = self.sync_id();
        if let Some(observer) = observer {
            let mut subscription = self.bus.subscribe();
            tokio::spawn(async move {
                while let Some(event) = subscription.recv().await {
                    observer(event);
                }
            });
        }

        let handle = Arc::new(self.executor.run(sync_id, self.sync_plan.clone()).await?);
        Ok(handle)
    }

    fn set_installation_id(&self, id: InstallationId) {
        let _ = self.id.set(id);
    }
}

#[async_trait]
impl Routable for InstallationMax {
    fn route(&self, _scope: &ScopeRouting) -> RouteDecision {
        RouteDecision::Local
    }

    async fn handle_local(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError> {
        match request.target.as_str() {
            "" => match request.method.as_str() {
                "describe" => serde_json::to_value(self.describe().await?).map_err(json_err),
                "schema" => serde_json::to_value(self.schema().await?).map_err(json_err),
                "sync" => {
                    let handle = self.sync(None).await?;
                    serde_json::to_value(serde_json::json!({"id": handle.sync_id()})).map_err(json_err)
                }
                other => Err(unknown_method("", other)),
            },
            "engine" => self.handle_engine(request).await,
            other => Err(MaxError::not_found("dispatch.unknown_target", "target", other)),
        }
    }
}

impl InstallationMax {
    async fn handle_engine(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError> {
        let args = &request.args;
        match request.method.as_str() {
            "create" => {
                let entity_type = arg_str(args, 0)?;
                let fields = arg_object(args, 1)?;
                serde_json::to_value(self.create_entity(&entity_type, fields).await?).map_err(json_err)
            }
            "get" => {
                let entity_type = arg_str(args, 0)?;
                let id = arg_str(args, 1)?;
                serde_json::to_value(self.get_entity(&entity_type, &id).await?).map_err(json_err)
            }
            "update" => {
                let entity_type = arg_str(args, 0)?;
                let id = arg_str(args, 1)?;
                let fields = arg_object(args, 2)?;
                serde_json::to_value(self.update_entity(&entity_type, &id, fields).await?).map_err(json_err)
            }
            "delete" => {
                let entity_type = arg_str(args, 0)?;
                let id = arg_str(args, 1)?;
                self.delete_entity(&entity_type, &id).await?;
                Ok(serde_json::Value::Null)
            }
            "query" => {
                let entity_type = arg_str(args, 0)?;
                let filters: Vec<Filter> = args.get(1).and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or_default();
                let page: PageRequest = args.get(2).and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or_default();
                serde_json::to_value(self.query_entities(&entity_type, &filters, page).await?).map_err(json_err)
            }
            other => Err(unknown_method("engine", other)),
        }
    }
}

fn arg_str(args: &[serde_json::Value], idx: usize) -> Result<String, MaxError> {
    args.get(idx)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| MaxError::bad_input("dispatch.missing_arg", format!("argument {idx} must be a string")))
}

fn arg_object(args: &[serde_json::Value], idx: usize) -> Result<serde_json::Map<String, serde_json::Value>, MaxError> {
    args.get(idx)
        .and_then(|v| v.as_object())
        .cloned()
        .ok_or_else(|| MaxError::bad_input("dispatch.missing_arg", format!("argument {idx} must be an object")))
}

fn unknown_method(target: &str, method: &str) -> MaxError {
    MaxError::bad_input("dispatch.unknown_method", format!("no method \"{method}\" on target \"{target}\""))
}

fn json_err(error: serde_json::Error) -> MaxError {
    MaxError::new("dispatch.serialization_failed", error.to_string()).with_facet(Facet::InvariantViolated)
}

/// A remote-facing [`InstallationClient`] that tunnels every call through
/// a [`Proxy`] over whatever transport reaches the real installation
/// (subprocess or remote). `handle_local` tunnels the request straight
/// through the same transport, so wrapping a proxy in the routing shim
/// behaves identically to wrapping an in-process client.
pub struct InstallationProxy {
    root: Proxy,
    engine: Proxy,
    transport: Arc<dyn max_transport::Transport>,
}

impl InstallationProxy {
    /// Build a proxy over `transport`, addressed at the installation's
    /// root (`target == ""`) and engine (`target == "engine"`) surfaces.
    #[must_use]
    pub fn new(transport: Arc<dyn max_transport::Transport>) -> Self {
        Self {
            root: Proxy::new(Arc::clone(&transport), ""),
            engine: Proxy::new(Arc::clone(&transport), "engine"),
            transport,
        }
    }
}

#[async_trait]
impl Lifecycle for InstallationProxy {
    async fn start(&self) -> Result<(), MaxError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), MaxError> {
        self.transport.close().await;
        Ok(())
    }
}

#[async_trait]
impl Supervised for InstallationProxy {
    async fn health(&self) -> HealthStatus {
        HealthStatus::Unknown
    }
}

#[async_trait]
impl InstallationClient for InstallationProxy {
    async fn describe(&self) -> Result<InstallationDescription, MaxError> {
        let result = self.root.call("describe", vec![]).await?;
        serde_json::from_value(result).map_err(json_err)
    }

    async fn schema(&self) -> Result<Schema, MaxError> {
        let result = self.root.call("schema", vec![]).await?;
        serde_json::from_value(result).map_err(json_err)
    }

    async fn create_entity(&self, entity_type: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError> {
        let result = self.engine.call("create", vec![serde_json::json!(entity_type), serde_json::Value::Object(fields)]).await?;
        serde_json::from_value(result).map_err(json_err)
    }

    async fn get_entity(&self, entity_type: &str, id: &str) -> Result<Entity, MaxError> {
        let result = self.engine.call("get", vec![serde_json::json!(entity_type), serde_json::json!(id)]).await?;
        serde_json::from_value(result).map_err(json_err)
    }

    async fn update_entity(&self, entity_type: &str, id: &str, fields: serde_json::Map<String, serde_json::Value>) -> Result<Entity, MaxError> {
        let result = self
            .engine
            .call("update", vec![serde_json::json!(entity_type), serde_json::json!(id), serde_json::Value::Object(fields)])
            .await?;
        serde_json::from_value(result).map_err(json_err)
    }

    async fn delete_entity(&self, entity_type: &str, id: &str) -> Result<(), MaxError> {
        self.engine.call("delete", vec![serde_json::json!(entity_type), serde_json::json!(id)]).await?;
        Ok(())
    }

    async fn query_entities(&self, entity_type: &str, filters: &[Filter], page: PageRequest) -> Result<max_engine::Page<Entity>, MaxError> {
        let result = self
            .engine
            .call("query", vec![serde_json::json!(entity_type), serde_json::json!(filters), serde_json::json!(page)])
            .await?;
        serde_json::from_value(result).map_err(json_err)
    }

    async fn sync(&self, _observer: Option<SyncObserver>) -> Result<Arc<SyncHandle>, MaxError> {
        // A proxied sync cannot hand back a live SyncHandle (it owns
        // channels that do not cross a transport boundary); the caller
        // polls progress through `describe`/engine queries instead.
        Err(MaxError::new(
            "installation.sync_not_proxyable",
            "sync() must be called on the process that owns the installation",
        )
        .with_facet(Facet::NotImplemented))
    }
}

#[async_trait]
impl Routable for InstallationProxy {
    fn route(&self, _scope: &ScopeRouting) -> RouteDecision {
        RouteDecision::Local
    }

    async fn handle_local(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError> {
        let proxy = match request.target.as_str() {
            "" => &self.root,
            "engine" => &self.engine,
            other => return Err(MaxError::not_found("dispatch.unknown_target", "target", other)),
        };
        proxy.call(&request.method, request.args.clone()).await
    }
}
