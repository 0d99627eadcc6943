// SPDX-License-Identifier: MIT OR Apache-2.0
//! A deployer that builds its node directly in this process, with no
//! child process or socket involved.

use async_trait::async_trait;
use max_error::MaxError;
use max_id::DeployerKind;
use max_node::UnlabelledHandle;

use crate::Deployer;

type Factory<R> = Box<dyn Fn(&serde_json::Value, &serde_json::Value) -> Result<R, MaxError> + Send + Sync>;

/// Builds `R` directly via a caller-supplied factory. `connect` is
/// rejected: an in-process node only exists for as long as this process
/// does, so there is nothing to reconnect to after a restart.
pub struct InProcessDeployer<R> {
    kind: DeployerKind,
    factory: Factory<R>,
}

impl<R> InProcessDeployer<R> {
    /// Build a deployer that calls `factory(config, spec)` on every
    /// `create`.
    pub fn new(kind: DeployerKind, factory: impl Fn(&serde_json::Value, &serde_json::Value) -> Result<R, MaxError> + Send + Sync + 'static) -> Self {
        Self { kind, factory: Box::new(factory) }
    }
}

#[async_trait]
impl<R: Send + Sync> Deployer<R> for InProcessDeployer<R> {
    fn kind(&self) -> DeployerKind {
        self.kind.clone()
    }

    async fn create(&self, config: &serde_json::Value, spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError> {
        let client = (self.factory)(config, spec)?;
        Ok(UnlabelledHandle::new(self.kind.clone(), client))
    }

    async fn connect(&self, _config: &serde_json::Value, _spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError> {
        Err(MaxError::new("deploy.not_implemented", "in-process deployers cannot reconnect to an existing node")
            .with_facet(max_error::Facet::NotImplemented))
    }

    async fn teardown(&self, _config: &serde_json::Value, _spec: &serde_json::Value) -> Result<(), MaxError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_invokes_factory_with_config_and_spec() {
        let deployer = InProcessDeployer::new(DeployerKind::new("in-process"), |config, _spec| {
            Ok(config["name"].as_str().unwrap_or("unnamed").to_string())
        });
        let handle = deployer.create(&serde_json::json!({"name": "acme"}), &serde_json::json!({})).await.unwrap();
        assert_eq!(handle.client, "acme");
    }

    #[tokio::test]
    async fn connect_is_rejected() {
        let deployer = InProcessDeployer::new(DeployerKind::new("in-process"), |_c, _s| Ok(()));
        let err = deployer.connect(&serde_json::json!({}), &serde_json::json!({})).await.unwrap_err();
        assert!(err.has(max_error::Facet::NotImplemented));
    }
}
