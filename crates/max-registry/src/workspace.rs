// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted workspace metadata, one JSON file per workspace under a
//! platform-defined root, keyed by slug rather than by connector.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use max_error::MaxError;
use max_id::WorkspaceId;
use serde::{Deserialize, Serialize};

/// A persisted workspace entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    /// Identity assigned by the global supervisor.
    pub id: WorkspaceId,
    /// Display name.
    pub name: String,
    /// When this workspace was first connected.
    pub connected_at: DateTime<Utc>,
    /// Deployer config sufficient to call `connect`/`create` again.
    pub config: serde_json::Value,
    /// The workspace's own project spec.
    pub spec: serde_json::Value,
}

/// File-based workspace registry, one JSON file per slug under `root`.
#[derive(Debug, Clone)]
pub struct WorkspaceRegistry {
    root: PathBuf,
}

impl WorkspaceRegistry {
    /// Create a registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, slug: &str) -> PathBuf {
        self.root.join(format!("{slug}.json"))
    }

    /// Persist `record` under `slug`, overwriting any existing entry.
    pub async fn save(&self, slug: &str, record: &WorkspaceRecord) -> Result<(), MaxError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| MaxError::wrap(e).with_context(format!("creating workspace registry root {}", self.root.display())))?;

        let path = self.record_path(slug);
        let json = serde_json::to_string_pretty(record).map_err(|e| MaxError::wrap(e).with_context("serializing workspace record"))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| MaxError::wrap(e).with_context(format!("writing {}", path.display())))
    }

    /// Load the entry persisted under `slug`.
    pub async fn load(&self, slug: &str) -> Result<WorkspaceRecord, MaxError> {
        let path = self.record_path(slug);
        let json = tokio::fs::read_to_string(&path).await.map_err(|e| workspace_not_found(slug, e))?;
        serde_json::from_str(&json).map_err(|e| MaxError::wrap(e).with_context(format!("parsing {}", path.display())))
    }

    /// List every `(slug, record)` pair persisted under this root.
    pub async fn list(&self) -> Result<Vec<(String, WorkspaceRecord)>, MaxError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MaxError::wrap(e).with_context(format!("reading {}", self.root.display()))),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| MaxError::wrap(e).with_context("reading workspace registry root"))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let record = self.load(slug).await?;
            entries.push((slug.to_string(), record));
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Remove the persisted entry for `slug`.
    pub async fn remove(&self, slug: &str) -> Result<(), MaxError> {
        let path = self.record_path(slug);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MaxError::wrap(e).with_context(format!("removing {}", path.display()))),
        }
    }
}

fn workspace_not_found(slug: &str, source: std::io::Error) -> MaxError {
    if source.kind() == std::io::ErrorKind::NotFound {
        MaxError::not_found("registry.workspace_not_found", "workspace", slug)
    } else {
        MaxError::wrap(source).with_context("reading workspace record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> WorkspaceRecord {
        WorkspaceRecord {
            id: WorkspaceId::new(id),
            name: "Acme Workspace".to_string(),
            connected_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
            config: serde_json::json!({}),
            spec: serde_json::json!({"name": "acme"}),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorkspaceRegistry::new(dir.path());
        registry.save("acme", &sample("ws-1")).await.unwrap();

        let loaded = registry.load("acme").await.unwrap();
        assert_eq!(loaded.id, WorkspaceId::new("ws-1"));
    }

    #[tokio::test]
    async fn list_reads_every_persisted_slug() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorkspaceRegistry::new(dir.path());
        registry.save("acme", &sample("ws-1")).await.unwrap();
        registry.save("beta", &sample("ws-2")).await.unwrap();

        let entries = registry.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "acme");
        assert_eq!(entries[1].0, "beta");
    }

    #[tokio::test]
    async fn remove_then_load_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorkspaceRegistry::new(dir.path());
        registry.save("acme", &sample("ws-1")).await.unwrap();
        registry.remove("acme").await.unwrap();

        let err = registry.load("acme").await.unwrap_err();
        assert!(err.has(max_error::Facet::NotFound));
    }
}
