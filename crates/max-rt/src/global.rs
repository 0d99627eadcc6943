// SPDX-License-Identifier: MIT OR Apache-2.0
//! The root of the hierarchy: a named group of workspaces, each an
//! in-process [`WorkspaceMax`] with its own installations underneath it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use max_deploy::DeployerRegistry;
use max_dispatch::{Dispatcher, RouteDecision, Routable};
use max_error::MaxError;
use max_id::{ConnectorType, ScopeRouting, WorkspaceId};
use max_lifecycle::Lifecycle;
use max_node::{HealthStatus, Supervised, Supervisor, UnlabelledHandle, UuidIdGenerator};
use max_protocol::RpcRequest;
use max_registry::{InstallationRegistry, WorkspaceRecord, WorkspaceRegistry};
use serde::{Deserialize, Serialize};

use crate::connector::Connector;
use crate::installation::InstallationClient;
use crate::routing::{shim_transport, RoutingTable};
use crate::workspace::{WorkspaceClient, WorkspaceMax};

/// Arguments to [`GlobalClient::create_workspace`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    /// Display name.
    pub name: String,
    /// Opaque config carried in the persisted record for symmetry with
    /// installation records; unused by the in-process workspace builder.
    #[serde(default)]
    pub config: serde_json::Value,
    /// The workspace's own project spec.
    #[serde(default)]
    pub spec: serde_json::Value,
}

/// Summary entry returned by [`GlobalClient::list_workspaces`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    /// Identity assigned by the global supervisor.
    pub id: WorkspaceId,
    /// Display name.
    pub name: String,
}

/// The contract exposed at the root of the hierarchy.
#[async_trait]
pub trait GlobalClient: Supervised + Routable {
    /// Look up a registered workspace by id.
    async fn workspace(&self, id: &WorkspaceId) -> Option<Arc<dyn WorkspaceClient>>;

    /// Summarize every registered workspace.
    async fn list_workspaces(&self) -> Vec<WorkspaceSummary>;

    /// Build, register, and persist a new workspace.
    async fn create_workspace(&self, request: CreateWorkspaceRequest) -> Result<WorkspaceId, MaxError>;

    /// Stop, unregister, and unpersist a workspace. Workspaces are always
    /// built in-process, so there is no deployer teardown step.
    async fn remove_workspace(&self, id: &WorkspaceId) -> Result<(), MaxError>;
}

#[async_trait]
impl<T: GlobalClient + ?Sized> GlobalClient for Arc<T> {
    async fn workspace(&self, id: &WorkspaceId) -> Option<Arc<dyn WorkspaceClient>> {
        (**self).workspace(id).await
    }
    async fn list_workspaces(&self) -> Vec<WorkspaceSummary> {
        (**self).list_workspaces().await
    }
    async fn create_workspace(&self, request: CreateWorkspaceRequest) -> Result<WorkspaceId, MaxError> {
        (**self).create_workspace(request).await
    }
    async fn remove_workspace(&self, id: &WorkspaceId) -> Result<(), MaxError> {
        (**self).remove_workspace(id).await
    }
}

/// The root orchestrator: owns every workspace's identity, routing, and
/// persisted registry entry. Every workspace it builds is in-process; the
/// deployment indirection [`max_deploy::Deployer`] provides exists one
/// level down, for installations, not here.
pub struct GlobalMax {
    root: PathBuf,
    connectors: BTreeMap<ConnectorType, Arc<Connector>>,
    deployers: Arc<DeployerRegistry<Arc<dyn InstallationClient>>>,
    supervisor: Supervisor<Arc<dyn WorkspaceClient>, WorkspaceId>,
    routing: RoutingTable<WorkspaceId>,
    registry: WorkspaceRegistry,
}

impl GlobalMax {
    /// Build a global orchestrator rooted at `root` (each workspace's own
    /// installation registry lives under `root/<slug>/installations`),
    /// sharing one connector catalog and deployer registry across every
    /// workspace it builds.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        connectors: BTreeMap<ConnectorType, Arc<Connector>>,
        deployers: Arc<DeployerRegistry<Arc<dyn InstallationClient>>>,
        registry: WorkspaceRegistry,
    ) -> Self {
        let root = root.into();
        Self {
            root,
            connectors,
            deployers,
            supervisor: Supervisor::new(UuidIdGenerator::new(WorkspaceId::new)),
            routing: RoutingTable::new(),
            registry,
        }
    }

    fn build_workspace(&self, name: String, slug: &str) -> WorkspaceMax {
        let installations_root = self.root.join(slug).join("installations");
        WorkspaceMax::new(
            name,
            self.connectors.clone(),
            Arc::clone(&self.deployers),
            InstallationRegistry::new(installations_root),
        )
    }

    async fn register_and_route(
        &self,
        unlabelled: UnlabelledHandle<Arc<dyn WorkspaceClient>>,
        explicit_id: Option<WorkspaceId>,
    ) -> WorkspaceId {
        let handle = self.supervisor.register(unlabelled, explicit_id).await;
        self.routing.insert(handle.id.clone(), shim_transport(Arc::clone(&handle.client)));
        handle.id.clone()
    }
}

#[async_trait]
impl Lifecycle for GlobalMax {
    async fn start(&self) -> Result<(), MaxError> {
        for (slug, record) in self.registry.list().await? {
            let workspace: Arc<dyn WorkspaceClient> = Arc::new(self.build_workspace(record.name.clone(), &slug));
            let unlabelled = UnlabelledHandle::new(max_id::DeployerKind::new("in-process"), workspace);
            self.register_and_route(unlabelled, Some(record.id.clone())).await;
        }
        self.supervisor.start().await
    }

    async fn stop(&self) -> Result<(), MaxError> {
        self.supervisor.stop().await
    }
}

#[async_trait]
impl Supervised for GlobalMax {
    async fn health(&self) -> HealthStatus {
        self.supervisor.health().await
    }
}

#[async_trait]
impl GlobalClient for GlobalMax {
    async fn workspace(&self, id: &WorkspaceId) -> Option<Arc<dyn WorkspaceClient>> {
        self.supervisor.get(id).await.map(|handle| Arc::clone(&handle.client))
    }

    async fn list_workspaces(&self) -> Vec<WorkspaceSummary> {
        self.supervisor
            .list()
            .await
            .into_iter()
            .map(|handle| WorkspaceSummary { id: handle.id.clone(), name: handle.client.name().to_string() })
            .collect()
    }

    async fn create_workspace(&self, request: CreateWorkspaceRequest) -> Result<WorkspaceId, MaxError> {
        let slug = max_registry::slugify(&request.name);
        let workspace: Arc<dyn WorkspaceClient> = Arc::new(self.build_workspace(request.name.clone(), &slug));
        let unlabelled = UnlabelledHandle::new(max_id::DeployerKind::new("in-process"), workspace);

        let id = self.register_and_route(unlabelled, None).await;

        let record = WorkspaceRecord {
            id: id.clone(),
            name: request.name,
            connected_at: Utc::now(),
            config: request.config,
            spec: request.spec,
        };
        self.registry.save(&slug, &record).await?;

        if let Some(handle) = self.supervisor.get(&id).await {
            handle.client.start().await?;
        }
        Ok(id)
    }

    async fn remove_workspace(&self, id: &WorkspaceId) -> Result<(), MaxError> {
        if let Some(handle) = self.supervisor.get(id).await {
            let _ = handle.client.stop().await;
        }
        self.supervisor.unregister(id).await;
        self.routing.remove(id);

        for (slug, record) in self.registry.list().await? {
            if &record.id == id {
                self.registry.remove(&slug).await?;
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Routable for GlobalMax {
    fn route(&self, scope: &ScopeRouting) -> RouteDecision {
        let Some(workspace_id) = &scope.workspace_id else {
            return RouteDecision::Local;
        };
        match self.routing.get(workspace_id) {
            Some(transport) => RouteDecision::Forward { scope: scope.clone().strip_workspace(), transport },
            None => RouteDecision::ChildNotFound { id: workspace_id.as_str().to_string() },
        }
    }

    async fn handle_local(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError> {
        match request.target.as_str() {
            "" => match request.method.as_str() {
                "listWorkspaces" => serde_json::to_value(self.list_workspaces().await).map_err(dispatch_json_err),
                other => Err(MaxError::bad_input("dispatch.unknown_method", format!("no method \"{other}\" on target \"\""))),
            },
            other => Err(MaxError::not_found("dispatch.unknown_target", "target", other)),
        }
    }
}

fn dispatch_json_err(error: serde_json::Error) -> MaxError {
    MaxError::new("dispatch.serialization_failed", error.to_string()).with_facet(max_error::Facet::InvariantViolated)
}
