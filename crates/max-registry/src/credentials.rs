// SPDX-License-Identifier: MIT OR Apache-2.0
//! A [`CredentialStore`] backed by a single JSON file, for secrets that
//! must survive a process restart. Writes serialize through an in-memory
//! cache and replace the whole file, matching the installation
//! registry's `credentials.json` contract.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use max_credential::CredentialStore;
use max_error::MaxError;
use tokio::sync::Mutex;

/// Persists a credential-name-to-secret map to one JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Open (or prepare to create) the store at `path`, loading any
    /// existing contents into memory.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, MaxError> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json).map_err(|e| MaxError::wrap(e).with_context(format!("parsing {}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(MaxError::wrap(e).with_context(format!("reading {}", path.display()))),
        };
        Ok(Self { path, values: Mutex::new(values) })
    }

    async fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), MaxError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MaxError::wrap(e).with_context(format!("creating {}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(values).map_err(|e| MaxError::wrap(e).with_context("serializing credentials"))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| MaxError::wrap(e).with_context(format!("writing {}", self.path.display())))?;
        restrict_permissions(&self.path).await;
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(error) = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        tracing::warn!(%error, path = %path.display(), "failed to restrict credentials file permissions");
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &std::path::Path) {}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MaxError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), MaxError> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        self.flush(&values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::open(dir.path().join("credentials.json")).await.unwrap();

        store.set("access_token", "tok-1".to_string()).await.unwrap();
        assert_eq!(store.get("access_token").await.unwrap(), Some("tok-1".to_string()));
    }

    #[tokio::test]
    async fn reopening_loads_prior_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let first = FileCredentialStore::open(&path).await.unwrap();
        first.set("refresh_token", "rt-old".to_string()).await.unwrap();

        let second = FileCredentialStore::open(&path).await.unwrap();
        assert_eq!(second.get("refresh_token").await.unwrap(), Some("rt-old".to_string()));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::open(dir.path().join("credentials.json")).await.unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_restricted_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = FileCredentialStore::open(&path).await.unwrap();
        store.set("k", "v".to_string()).await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
