// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted installation metadata, one JSON file per installation under
//! `<root>/<connector>/<slug>/installation.json`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use max_error::MaxError;
use max_id::{ConnectorType, DeployerKind, InstallationId};
use serde::{Deserialize, Serialize};

/// A persisted installation entry, carrying enough of the deployer
/// config to reconstitute it on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    /// Connector this installation runs.
    pub connector: ConnectorType,
    /// Display name.
    pub name: String,
    /// Identity assigned by the installation supervisor.
    pub id: InstallationId,
    /// The deployment strategy `config` is meant for, used to pick the
    /// right `Deployer` out of the registry on startup reconciliation.
    pub deployer_kind: DeployerKind,
    /// Deployer config sufficient to call `connect`/`create` again.
    pub config: serde_json::Value,
    /// The installation spec handed to the node itself (connector type,
    /// connector config, and anything else `initialise` needs).
    pub spec: serde_json::Value,
    /// When this installation was first connected.
    pub connected_at: DateTime<Utc>,
}

/// File-based installation registry rooted at a workspace's
/// `.max/installations` directory.
#[derive(Debug, Clone)]
pub struct InstallationRegistry {
    root: PathBuf,
}

impl InstallationRegistry {
    /// Create a registry rooted at `root` (a workspace's
    /// `.max/installations` directory). Nothing is read or created until
    /// a method is called.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_dir(&self, connector: &ConnectorType, slug: &str) -> PathBuf {
        self.root.join(connector.as_str()).join(slug)
    }

    fn record_path(&self, connector: &ConnectorType, slug: &str) -> PathBuf {
        self.entry_dir(connector, slug).join("installation.json")
    }

    /// Path to the credentials file for this installation, for callers
    /// that want to open a [`crate::FileCredentialStore`] alongside it.
    #[must_use]
    pub fn credentials_path(&self, connector: &ConnectorType, slug: &str) -> PathBuf {
        self.entry_dir(connector, slug).join("credentials.json")
    }

    /// Persist `record` under `slug`, creating parent directories as
    /// needed. Overwrites any existing entry at that slug.
    pub async fn save(&self, slug: &str, record: &InstallationRecord) -> Result<(), MaxError> {
        let dir = self.entry_dir(&record.connector, slug);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MaxError::wrap(e).with_context(format!("creating installation directory {}", dir.display())))?;

        let path = self.record_path(&record.connector, slug);
        let json = serde_json::to_string_pretty(record).map_err(|e| MaxError::wrap(e).with_context("serializing installation record"))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| MaxError::wrap(e).with_context(format!("writing {}", path.display())))
    }

    /// Load the entry persisted under `slug`.
    pub async fn load(&self, connector: &ConnectorType, slug: &str) -> Result<InstallationRecord, MaxError> {
        let path = self.record_path(connector, slug);
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| installation_not_found(connector, slug, e))?;
        serde_json::from_str(&json).map_err(|e| MaxError::wrap(e).with_context(format!("parsing {}", path.display())))
    }

    /// List every `(connector, slug)` pair with a persisted entry.
    pub async fn list(&self) -> Result<Vec<(ConnectorType, String)>, MaxError> {
        let mut entries = Vec::new();
        let mut connector_dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(MaxError::wrap(e).with_context(format!("reading {}", self.root.display()))),
        };

        while let Some(connector_dir) = connector_dirs
            .next_entry()
            .await
            .map_err(|e| MaxError::wrap(e).with_context("reading installation registry root"))?
        {
            if !connector_dir.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let connector_name = connector_dir.file_name().to_string_lossy().into_owned();
            let connector = ConnectorType::new(connector_name);

            let mut slug_dirs = tokio::fs::read_dir(connector_dir.path())
                .await
                .map_err(|e| MaxError::wrap(e).with_context("reading connector directory"))?;
            while let Some(slug_dir) = slug_dirs
                .next_entry()
                .await
                .map_err(|e| MaxError::wrap(e).with_context("reading connector directory"))?
            {
                if !slug_dir.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                if slug_dir.path().join("installation.json").exists() {
                    entries.push((connector.clone(), slug_dir.file_name().to_string_lossy().into_owned()));
                }
            }
        }

        entries.sort_by(|a, b| (a.0.as_str(), &a.1).cmp(&(b.0.as_str(), &b.1)));
        Ok(entries)
    }

    /// Remove the persisted entry (and its credentials file, if any) for
    /// `slug`.
    pub async fn remove(&self, connector: &ConnectorType, slug: &str) -> Result<(), MaxError> {
        let dir = self.entry_dir(connector, slug);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MaxError::wrap(e).with_context(format!("removing {}", dir.display()))),
        }
    }
}

fn installation_not_found(connector: &ConnectorType, slug: &str, source: std::io::Error) -> MaxError {
    if source.kind() == std::io::ErrorKind::NotFound {
        MaxError::not_found("registry.installation_not_found", "installation", format!("{}/{slug}", connector.as_str()))
    } else {
        MaxError::wrap(source).with_context("reading installation record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(connector: &str, id: &str) -> InstallationRecord {
        InstallationRecord {
            connector: ConnectorType::new(connector),
            name: "Acme".to_string(),
            id: InstallationId::new(id),
            deployer_kind: DeployerKind::new("subprocess"),
            config: serde_json::json!({"command": "acme-connector"}),
            spec: serde_json::json!({"connector": connector, "config": {}}),
            connected_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstallationRegistry::new(dir.path());
        let record = sample("acme", "inst-1");

        registry.save("acme-prod", &record).await.unwrap();
        let loaded = registry.load(&ConnectorType::new("acme"), "acme-prod").await.unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.name, "Acme");
    }

    #[tokio::test]
    async fn load_missing_entry_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstallationRegistry::new(dir.path());
        let err = registry.load(&ConnectorType::new("acme"), "nope").await.unwrap_err();
        assert!(err.has(max_error::Facet::NotFound));
    }

    #[tokio::test]
    async fn list_finds_entries_across_connectors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstallationRegistry::new(dir.path());
        registry.save("prod", &sample("acme", "inst-1")).await.unwrap();
        registry.save("sandbox", &sample("beta", "inst-2")).await.unwrap();

        let mut entries = registry.list().await.unwrap();
        entries.sort();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&(ConnectorType::new("acme"), "prod".to_string())));
        assert!(entries.contains(&(ConnectorType::new("beta"), "sandbox".to_string())));
    }

    #[tokio::test]
    async fn remove_deletes_entry_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstallationRegistry::new(dir.path());
        registry.save("prod", &sample("acme", "inst-1")).await.unwrap();

        registry.remove(&ConnectorType::new("acme"), "prod").await.unwrap();
        let err = registry.load(&ConnectorType::new("acme"), "prod").await.unwrap_err();
        assert!(err.has(max_error::Facet::NotFound));
    }

    #[tokio::test]
    async fn remove_missing_entry_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let registry = InstallationRegistry::new(dir.path());
        let result = registry.remove(&ConnectorType::new("acme"), "nope").await;
        assert!(result.is_ok());
    }
}
