// SPDX-License-Identifier: MIT OR Apache-2.0
//! A lookup from [`DeployerKind`] to the deployer that implements it.

use std::collections::BTreeMap;
use std::sync::Arc;

use max_error::MaxError;
use max_id::DeployerKind;

use crate::Deployer;

/// Maps each known [`DeployerKind`] to the [`Deployer`] that implements it.
/// Built once at startup from whichever strategies this binary links in,
/// then consulted by installation creation and reconciliation to resolve
/// the strategy named in a persisted or requested config.
pub struct DeployerRegistry<R> {
    deployers: BTreeMap<DeployerKind, Arc<dyn Deployer<R>>>,
}

impl<R> DeployerRegistry<R> {
    /// An empty registry.
    pub fn new() -> Self {
        Self { deployers: BTreeMap::new() }
    }

    /// Register a deployer under its own [`Deployer::kind`], replacing any
    /// deployer previously registered for that kind.
    pub fn register(&mut self, deployer: Arc<dyn Deployer<R>>) {
        self.deployers.insert(deployer.kind(), deployer);
    }

    /// Look up the deployer for `kind`, if one is registered.
    pub fn get(&self, kind: &DeployerKind) -> Option<Arc<dyn Deployer<R>>> {
        self.deployers.get(kind).cloned()
    }

    /// Look up the deployer for `kind`, or a `NotFound`-faceted error
    /// naming the kind.
    pub fn resolve(&self, kind: &DeployerKind) -> Result<Arc<dyn Deployer<R>>, MaxError> {
        self.get(kind).ok_or_else(|| MaxError::not_found("deploy.unknown_kind", "deployer", kind.as_str()))
    }
}

impl<R> Default for DeployerRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}
