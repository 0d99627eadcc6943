// SPDX-License-Identifier: MIT OR Apache-2.0
//! The static descriptor an installation is built from: schema, seeder,
//! field resolvers, sync plan, and onboarding metadata. Connector business
//! logic (the actual SaaS-specific API calls) lives outside this crate;
//! `Connector` only carries the fixed contract a connector exposes.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use max_credential::{Credential, CredentialProvider};
use max_engine::Schema;
use max_error::MaxError;
use max_sync::SyncPlan;
use serde::{Deserialize, Serialize};

use crate::resolver::ResolverGraph;

/// Everything a connector's [`Seeder`]/resolvers need to reach the
/// upstream system.
pub struct ConnectorContext {
    /// Resolved-on-demand credentials registered for this installation.
    pub credentials: Arc<CredentialProvider>,
    /// Connector-private state threaded through from onboarding, e.g. a
    /// tenant id or base URL discovered during setup.
    pub state: serde_json::Value,
}

/// Creates the root entity a sync run seeds before any resolver runs.
#[async_trait::async_trait]
pub trait Seeder: Send + Sync {
    /// Produce the root entity's initial field values.
    async fn seed(&self, ctx: &ConnectorContext) -> Result<serde_json::Map<String, serde_json::Value>, MaxError>;
}

/// A [`Seeder`] built from a plain async closure.
pub struct FnSeeder<F> {
    f: F,
}

impl<F, Fut> FnSeeder<F>
where
    F: Fn(Arc<ConnectorContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Map<String, serde_json::Value>, MaxError>> + Send,
{
    /// Wrap a closure as a [`Seeder`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F, Fut> Seeder for FnSeeder<F>
where
    F: Fn(Arc<ConnectorContext>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Map<String, serde_json::Value>, MaxError>> + Send,
{
    async fn seed(&self, ctx: &ConnectorContext) -> Result<serde_json::Map<String, serde_json::Value>, MaxError> {
        // ctx is borrowed but the closure needs ownership of the pieces it
        // actually reaches into; clone the cheap Arc and pass state by value.
        let owned = Arc::new(ConnectorContext { credentials: Arc::clone(&ctx.credentials), state: ctx.state.clone() });
        (self.f)(owned).await
    }
}

/// Builds connector-private state (a tenant id, a discovered base URL,
/// whatever `ConnectorContext::state` needs to hold) from the
/// installation's config and its credential provider. Runs synchronously
/// inside a deployer's factory closure, so it must not perform I/O itself;
/// any network calls a connector needs during onboarding belong in its
/// onboarding flow or its seeder/resolvers, not here.
pub type InitialiseFn =
    Arc<dyn Fn(serde_json::Value, Arc<CredentialProvider>) -> Result<serde_json::Value, MaxError> + Send + Sync>;

/// Describes one onboarding step a caller walks through before an
/// installation can be created against this connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStep {
    /// Stable identifier for this step, e.g. `"oauth_redirect"`.
    pub id: String,
    /// Human-readable instructions for whoever is driving onboarding.
    pub description: String,
    /// JSON schema describing the config fields this step collects.
    pub input_schema: serde_json::Value,
}

/// The full onboarding flow: an ordered sequence of steps a caller
/// completes to assemble the config `initialise` expects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Onboarding {
    /// Steps in the order they must be completed.
    pub steps: Vec<OnboardingStep>,
}

/// A connector's static descriptor: everything `max-rt` needs to stand up
/// and sync an installation without knowing the connector's own business
/// logic.
pub struct Connector {
    /// Stable connector type name, e.g. `"salesforce"`.
    pub connector_type: String,
    /// The entity schema this connector's installations enforce.
    pub schema: Schema,
    /// Seeds the root entity at the start of a sync run.
    pub seeder: Arc<dyn Seeder>,
    /// Field resolvers this connector's sync plan dispatches into.
    pub resolvers: ResolverGraph,
    /// The fixed task graph a sync run executes for this connector.
    pub sync_plan: SyncPlan,
    /// Onboarding flow a caller walks before `initialise` can run.
    pub onboarding: Onboarding,
    /// Secrets and OAuth pairs this connector's credential provider must
    /// have registered, keyed by the name its resolvers/seeder look them
    /// up under.
    pub credentials: BTreeMap<String, Credential>,
    /// Builds connector-private state from config and credentials.
    pub initialise: InitialiseFn,
}

impl Connector {
    /// True iff the connector's schema declares a root entity type and the
    /// sync plan's first step targets it, the minimal shape a sync run
    /// needs to make progress.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.schema.root_entity_type().is_some()
    }
}
