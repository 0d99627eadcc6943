// SPDX-License-Identifier: MIT OR Apache-2.0
//! A workspace: a named group of installations, each reached through
//! whichever deployment strategy created it.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use chrono::Utc;
use max_credential::{CredentialProvider, InMemoryCredentialStore};
use max_deploy::{Deployer, DeployerRegistry};
use max_dispatch::{Dispatcher, RouteDecision, Routable};
use max_engine::{Engine, InMemoryEngine, Schema};
use max_error::MaxError;
use max_id::{ConnectorType, DeployerKind, InstallationId, ScopeRouting};
use max_lifecycle::Lifecycle;
use max_node::{HealthStatus, Supervised, Supervisor, UnlabelledHandle, UuidIdGenerator};
use max_protocol::RpcRequest;
use max_registry::{InstallationRecord, InstallationRegistry};
use max_sync::{EventBus, SyncExecutor};
use max_task_store::InMemoryTaskStore;
use serde::{Deserialize, Serialize};

use crate::connector::{Connector, ConnectorContext, Onboarding};
use crate::installation::{InstallationClient, InstallationMax, InstallationProxy};
use crate::routing::{shim_transport, RoutingTable};
use crate::runner::ConnectorTaskRunner;

/// The installation spec handed to `createInstallation`/`connectInstallation`:
/// which connector to run and the config its `initialise` expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    /// Connector this installation runs.
    pub connector: ConnectorType,
    /// Display name.
    pub name: String,
    /// The config `Connector::initialise` receives.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Arguments to [`WorkspaceClient::create_installation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstallationRequest {
    /// Deployment strategy to create the installation with.
    pub via: DeployerKind,
    /// Deployer-specific config (a command line, a socket path, a remote
    /// address) sufficient to `connect` again after a restart.
    pub config: serde_json::Value,
    /// The installation spec, passed through to the deployed node.
    pub spec: InstallationSpec,
}

/// A locator sufficient to reconnect to an already-running installation,
/// as returned by listing a deployer's own out-of-band discovery (or
/// copied from a previous `createInstallation` response).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationLocator {
    /// Deployment strategy the installation is reachable through.
    pub via: DeployerKind,
    /// Deployer-specific config to `connect` with.
    pub config: serde_json::Value,
    /// The installation spec the node was created with.
    pub spec: InstallationSpec,
}

/// Summary entry returned by [`WorkspaceClient::list_installations`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSummary {
    /// Identity assigned by the installation supervisor.
    pub id: InstallationId,
    /// Connector this installation runs.
    pub connector: ConnectorType,
    /// Display name.
    pub name: String,
}

/// The contract every workspace exposes, whether the node behind it is
/// in-process, a subprocess, or remote.
#[async_trait]
pub trait WorkspaceClient: Supervised + Routable {
    /// This workspace's display name.
    fn name(&self) -> &str;

    /// Summarize every installation registered in this workspace.
    async fn list_installations(&self) -> Result<Vec<InstallationSummary>, MaxError>;

    /// A direct, synchronous handle to one registered installation, if it
    /// exists. Does not touch the registry or perform any I/O.
    fn installation(&self, id: &InstallationId) -> Option<Arc<dyn InstallationClient>>;

    /// Deploy and register a brand-new installation, returning its
    /// assigned id.
    async fn create_installation(&self, request: CreateInstallationRequest) -> Result<InstallationId, MaxError>;

    /// Attach to an installation that already exists (e.g. a subprocess
    /// started out of band), registering it under a freshly assigned id.
    async fn connect_installation(&self, locator: InstallationLocator) -> Result<InstallationId, MaxError>;

    /// Stop, unregister, unpersist, and tear down an installation.
    async fn remove_installation(&self, id: &InstallationId) -> Result<(), MaxError>;

    /// Names of every connector this workspace can create installations
    /// for.
    fn list_connectors(&self) -> Vec<ConnectorType>;

    /// The entity schema a named connector's installations enforce.
    fn connector_schema(&self, name: &ConnectorType) -> Result<Schema, MaxError>;

    /// The onboarding flow a caller walks before creating an installation
    /// of a named connector.
    fn connector_onboarding(&self, name: &ConnectorType) -> Result<Onboarding, MaxError>;
}

#[async_trait]
impl<T: WorkspaceClient + ?Sized> WorkspaceClient for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    async fn list_installations(&self) -> Result<Vec<InstallationSummary>, MaxError> {
        (**self).list_installations().await
    }
    fn installation(&self, id: &InstallationId) -> Option<Arc<dyn InstallationClient>> {
        (**self).installation(id)
    }
    async fn create_installation(&self, request: CreateInstallationRequest) -> Result<InstallationId, MaxError> {
        (**self).create_installation(request).await
    }
    async fn connect_installation(&self, locator: InstallationLocator) -> Result<InstallationId, MaxError> {
        (**self).connect_installation(locator).await
    }
    async fn remove_installation(&self, id: &InstallationId) -> Result<(), MaxError> {
        (**self).remove_installation(id).await
    }
    fn list_connectors(&self) -> Vec<ConnectorType> {
        (**self).list_connectors()
    }
    fn connector_schema(&self, name: &ConnectorType) -> Result<Schema, MaxError> {
        (**self).connector_schema(name)
    }
    fn connector_onboarding(&self, name: &ConnectorType) -> Result<Onboarding, MaxError> {
        (**self).connector_onboarding(name)
    }
}

fn not_found_connector(name: &ConnectorType) -> MaxError {
    MaxError::not_found("workspace.unknown_connector", "connector", name.as_str())
}

/// The in-process implementation: owns the installation supervisor, the
/// routing table its dispatcher consults, the persisted installation
/// registry, and the deployer strategies this workspace can create
/// installations through.
pub struct WorkspaceMax {
    name: String,
    connectors: BTreeMap<ConnectorType, Arc<Connector>>,
    supervisor: Supervisor<Arc<dyn InstallationClient>, InstallationId>,
    routing: RoutingTable<InstallationId>,
    /// Mirrors `supervisor`'s membership for the synchronous `installation`
    /// accessor, which cannot take the supervisor's `tokio::sync::RwLock`.
    clients: StdRwLock<BTreeMap<InstallationId, Arc<dyn InstallationClient>>>,
    deployers: Arc<DeployerRegistry<Arc<dyn InstallationClient>>>,
    registry: InstallationRegistry,
}

impl WorkspaceMax {
    /// Build a workspace over the given connector catalog and deployer
    /// registry, persisting installation metadata under `registry`.
    ///
    /// The caller is expected to have registered an `"in-process"`
    /// [`max_deploy::InProcessDeployer`] built by [`in_process_factory`]
    /// into `deployers`, alongside whatever subprocess/remote strategies
    /// this binary supports.
    #[must_use]
    pub fn new(
        name: String,
        connectors: BTreeMap<ConnectorType, Arc<Connector>>,
        deployers: Arc<DeployerRegistry<Arc<dyn InstallationClient>>>,
        registry: InstallationRegistry,
    ) -> Self {
        Self {
            name,
            connectors,
            supervisor: Supervisor::new(UuidIdGenerator::new(InstallationId::new)),
            routing: RoutingTable::new(),
            clients: StdRwLock::new(BTreeMap::new()),
            deployers,
            registry,
        }
    }

    /// This workspace's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn register_and_route(
        &self,
        unlabelled: UnlabelledHandle<Arc<dyn InstallationClient>>,
        explicit_id: Option<InstallationId>,
    ) -> InstallationId {
        let handle = self.supervisor.register(unlabelled, explicit_id).await;
        handle.client.set_installation_id(handle.id.clone());
        self.routing.insert(handle.id.clone(), shim_transport(Arc::clone(&handle.client)));
        self.clients.write().expect("installation map poisoned").insert(handle.id.clone(), Arc::clone(&handle.client));
        handle.id.clone()
    }

    async fn unregister_and_unroute(&self, id: &InstallationId) {
        self.supervisor.unregister(id).await;
        self.routing.remove(id);
        self.clients.write().expect("installation map poisoned").remove(id);
    }
}

/// Builds the factory [`max_deploy::InProcessDeployer`] wraps: constructs
/// a fresh [`InstallationMax`] from a connector's static descriptor, a
/// process-local in-memory credential store, and the installation's own
/// config. Runs synchronously and does no I/O, so in-process installations
/// cannot carry credentials that must survive a restart — that is the
/// trade-off of running in this process rather than a subprocess, which
/// bootstraps its own file-backed store asynchronously before it starts
/// accepting requests.
#[must_use]
pub fn in_process_factory(
    connectors: BTreeMap<ConnectorType, Arc<Connector>>,
) -> impl Fn(&serde_json::Value, &serde_json::Value) -> Result<Arc<dyn InstallationClient>, MaxError> + Send + Sync + 'static {
    move |config, spec| {
        let spec: InstallationSpec = serde_json::from_value(spec.clone())
            .map_err(|e| MaxError::bad_input("workspace.invalid_installation_spec", e.to_string()))?;
        let connector = connectors.get(&spec.connector).cloned().ok_or_else(|| not_found_connector(&spec.connector))?;
        if !connector.is_well_formed() {
            return Err(MaxError::new(
                "workspace.connector_not_well_formed",
                format!("connector \"{}\" has no root entity type", spec.connector.as_str()),
            )
            .with_facet(max_error::Facet::InvariantViolated));
        }

        let installation_config = if config.is_null() { spec.config.clone() } else { config.clone() };
        let credentials =
            CredentialProvider::new(Arc::new(InMemoryCredentialStore::new()), connector.credentials.clone());
        let state = (connector.initialise)(installation_config, Arc::clone(&credentials))?;
        let ctx = Arc::new(ConnectorContext { credentials, state });

        let engine: Arc<dyn Engine> = Arc::new(InMemoryEngine::new(connector.schema.clone()));
        let bus = Arc::new(EventBus::new());
        let runner = Arc::new(ConnectorTaskRunner::new(connector.resolvers.clone(), Arc::clone(&engine), Arc::clone(&ctx)));
        let executor = SyncExecutor::new(Arc::new(InMemoryTaskStore::new()), runner, Arc::clone(&bus));

        let installation = Arc::new(InstallationMax::new(
            spec.connector.clone(),
            spec.name.clone(),
            connector.schema.clone(),
            engine,
            Arc::clone(&connector.seeder),
            ctx,
            connector.sync_plan.clone(),
            executor,
            bus,
        ));
        Ok(installation as Arc<dyn InstallationClient>)
    }
}

/// Wraps a freshly connected subprocess/remote transport as an
/// [`InstallationProxy`], the factory every non-in-process deployer shares
/// regardless of connector — a proxy tunnels through whichever transport
/// it is given, with no connector-specific knowledge of its own.
#[must_use]
pub fn proxy_factory(transport: max_transport::UnixSocketTransport) -> Arc<dyn InstallationClient> {
    Arc::new(InstallationProxy::new(Arc::new(transport))) as Arc<dyn InstallationClient>
}

#[async_trait]
impl Lifecycle for WorkspaceMax {
    async fn start(&self) -> Result<(), MaxError> {
        for (connector, slug) in self.registry.list().await? {
            let record = self.registry.load(&connector, &slug).await?;
            let deployer = self.deployers.resolve(&record.deployer_kind)?;
            let handle = match deployer.connect(&record.config, &record.spec).await {
                Ok(handle) => handle,
                Err(error) if error.has(max_error::Facet::NotImplemented) => {
                    deployer.create(&record.config, &record.spec).await?
                }
                Err(error) => return Err(error),
            };
            self.register_and_route(handle, Some(record.id.clone())).await;
        }
        self.supervisor.start().await
    }

    async fn stop(&self) -> Result<(), MaxError> {
        self.supervisor.stop().await
    }
}

#[async_trait]
impl Supervised for WorkspaceMax {
    async fn health(&self) -> HealthStatus {
        self.supervisor.health().await
    }
}

#[async_trait]
impl WorkspaceClient for WorkspaceMax {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_installations(&self) -> Result<Vec<InstallationSummary>, MaxError> {
        let mut summaries = Vec::new();
        for handle in self.supervisor.list().await {
            let description = handle.client.describe().await?;
            summaries.push(InstallationSummary { id: handle.id.clone(), connector: description.connector, name: description.name });
        }
        Ok(summaries)
    }

    fn installation(&self, id: &InstallationId) -> Option<Arc<dyn InstallationClient>> {
        self.clients.read().expect("installation map poisoned").get(id).cloned()
    }

    async fn create_installation(&self, request: CreateInstallationRequest) -> Result<InstallationId, MaxError> {
        let deployer = self.deployers.resolve(&request.via)?;
        let spec_value = serde_json::to_value(&request.spec).map_err(|e| MaxError::wrap(e).with_context("serializing installation spec"))?;
        let unlabelled = deployer.create(&request.config, &spec_value).await?;

        let id = self.register_and_route(unlabelled, None).await;

        let record = InstallationRecord {
            connector: request.spec.connector.clone(),
            name: request.spec.name.clone(),
            id: id.clone(),
            deployer_kind: request.via,
            config: request.config,
            spec: spec_value,
            connected_at: Utc::now(),
        };
        let slug = max_registry::slugify(&request.spec.name);
        self.registry.save(&slug, &record).await?;

        if let Some(handle) = self.supervisor.get(&id).await {
            handle.client.start().await?;
        }
        Ok(id)
    }

    async fn connect_installation(&self, locator: InstallationLocator) -> Result<InstallationId, MaxError> {
        let deployer = self.deployers.resolve(&locator.via)?;
        let spec_value = serde_json::to_value(&locator.spec).map_err(|e| MaxError::wrap(e).with_context("serializing installation spec"))?;
        let unlabelled = deployer.connect(&locator.config, &spec_value).await?;

        let id = self.register_and_route(unlabelled, None).await;

        let record = InstallationRecord {
            connector: locator.spec.connector.clone(),
            name: locator.spec.name.clone(),
            id: id.clone(),
            deployer_kind: locator.via,
            config: locator.config,
            spec: spec_value,
            connected_at: Utc::now(),
        };
        let slug = max_registry::slugify(&locator.spec.name);
        self.registry.save(&slug, &record).await?;

        if let Some(handle) = self.supervisor.get(&id).await {
            handle.client.start().await?;
        }
        Ok(id)
    }

    async fn remove_installation(&self, id: &InstallationId) -> Result<(), MaxError> {
        let handle = self.supervisor.get(id).await;
        if let Some(handle) = &handle {
            let _ = handle.client.stop().await;
        }
        self.unregister_and_unroute(id).await;

        let entries = self.registry.list().await?;
        let mut removed_record = None;
        for (connector, slug) in entries {
            let record = self.registry.load(&connector, &slug).await?;
            if &record.id == id {
                self.registry.remove(&connector, &slug).await?;
                removed_record = Some(record);
                break;
            }
        }

        if let Some(record) = removed_record {
            if let Some(deployer) = self.deployers.get(&record.deployer_kind) {
                let _ = deployer.teardown(&record.config, &record.spec).await;
            }
        }
        Ok(())
    }

    fn list_connectors(&self) -> Vec<ConnectorType> {
        self.connectors.keys().cloned().collect()
    }

    fn connector_schema(&self, name: &ConnectorType) -> Result<Schema, MaxError> {
        self.connectors.get(name).map(|c| c.schema.clone()).ok_or_else(|| not_found_connector(name))
    }

    fn connector_onboarding(&self, name: &ConnectorType) -> Result<Onboarding, MaxError> {
        self.connectors.get(name).map(|c| c.onboarding.clone()).ok_or_else(|| not_found_connector(name))
    }
}

#[async_trait]
impl Routable for WorkspaceMax {
    fn route(&self, scope: &ScopeRouting) -> RouteDecision {
        let Some(installation_id) = &scope.installation_id else {
            return RouteDecision::Local;
        };
        match self.routing.get(installation_id) {
            Some(transport) => RouteDecision::Forward { scope: scope.clone().strip_installation(), transport },
            None => RouteDecision::ChildNotFound { id: installation_id.as_str().to_string() },
        }
    }

    async fn handle_local(&self, request: &RpcRequest) -> Result<serde_json::Value, MaxError> {
        match request.target.as_str() {
            "" => match request.method.as_str() {
                "listInstallations" => serde_json::to_value(self.list_installations().await?).map_err(dispatch_json_err),
                "listConnectors" => serde_json::to_value(self.list_connectors()).map_err(dispatch_json_err),
                other => Err(MaxError::bad_input("dispatch.unknown_method", format!("no method \"{other}\" on target \"\""))),
            },
            other => Err(MaxError::not_found("dispatch.unknown_target", "target", other)),
        }
    }
}

fn dispatch_json_err(error: serde_json::Error) -> MaxError {
    MaxError::new("dispatch.serialization_failed", error.to_string()).with_facet(max_error::Facet::InvariantViolated)
}
