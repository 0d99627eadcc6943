// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-credential
//!
//! A credential store plus a provider that memoizes OAuth access tokens
//! with TTL caching, persists rotated refresh tokens back to the store,
//! and can proactively refresh them ahead of expiry.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use max_error::MaxError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// An async refresh callback: given the current refresh token, produce a
/// new access token and (optionally) a rotated refresh token.
pub type RefreshFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<RefreshResult, MaxError>> + Send>> + Send + Sync>;

/// The result of one OAuth refresh call.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    /// The new access token.
    pub access_token: String,
    /// A rotated refresh token, if the provider issued one.
    pub refresh_token: Option<String>,
}

/// A credential declaration: either a plain pass-through secret, or an
/// OAuth pair with a refresh callback.
#[derive(Clone)]
pub enum Credential {
    /// A plain secret looked up in the store by `name`.
    String {
        /// Store key holding the secret value.
        name: String,
    },
    /// An OAuth access/refresh token pair, refreshed on expiry.
    OAuth {
        /// Store key holding the current access token.
        access_token_name: String,
        /// Store key holding the current refresh token.
        refresh_token_name: String,
        /// Access token lifetime in seconds.
        expires_in: u64,
        /// Callback that exchanges a refresh token for a new access token.
        refresh: RefreshFn,
    },
}

/// A map from credential key to secret value.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a secret by key.
    async fn get(&self, key: &str) -> Result<Option<String>, MaxError>;

    /// Set a secret by key. Concurrent `set` calls for the same key must
    /// serialize; concurrent `get` is always safe.
    async fn set(&self, key: &str, value: String) -> Result<(), MaxError>;
}

/// An in-memory [`CredentialStore`], useful for tests and for installations
/// that do not require secrets to survive a process restart.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl InMemoryCredentialStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MaxError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), MaxError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

fn err_oauth_not_registered(name: &str) -> MaxError {
    MaxError::new(
        "credential.oauth_not_registered",
        format!("no OAuth credential registered under ref {name}"),
    )
    .with_facet(max_error::Facet::NotFound)
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// A lazy handle to one registered credential: no I/O happens until
/// [`CredentialHandle::get`] is called.
pub struct CredentialHandle {
    provider: Arc<CredentialProvider>,
    name: String,
}

impl CredentialHandle {
    /// Resolve the current secret value, refreshing an OAuth token if its
    /// cached value has expired.
    pub async fn get(&self) -> Result<String, MaxError> {
        self.provider.resolve(&self.name).await
    }
}

/// Wraps a [`CredentialStore`] with OAuth-aware TTL caching and an
/// optional proactive refresh scheduler.
pub struct CredentialProvider {
    store: Arc<dyn CredentialStore>,
    credentials: BTreeMap<String, Credential>,
    cache: Mutex<BTreeMap<String, CachedToken>>,
    scheduler_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CredentialProvider {
    /// Build a provider over `store`, with the given named credentials
    /// registered.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, credentials: BTreeMap<String, Credential>) -> Arc<Self> {
        Arc::new(Self {
            store,
            credentials,
            cache: Mutex::new(BTreeMap::new()),
            scheduler_handles: Mutex::new(Vec::new()),
        })
    }

    /// Return a lazy handle to the named credential. Does not touch the
    /// store or cache; call `.get()` on the handle to resolve a value.
    #[must_use]
    pub fn get(self: &Arc<Self>, name: &str) -> CredentialHandle {
        CredentialHandle {
            provider: self.clone(),
            name: name.to_string(),
        }
    }

    async fn resolve(&self, name: &str) -> Result<String, MaxError> {
        match self
            .credentials
            .get(name)
            .ok_or_else(|| err_oauth_not_registered(name))?
        {
            Credential::String { name: store_key } => self
                .store
                .get(store_key)
                .await?
                .ok_or_else(|| MaxError::not_found("credential.secret_missing", "credential", store_key)),
            Credential::OAuth {
                access_token_name,
                refresh_token_name,
                expires_in,
                refresh,
            } => {
                self.resolve_oauth(name, access_token_name, refresh_token_name, *expires_in, refresh)
                    .await
            }
        }
    }

    async fn resolve_oauth(
        &self,
        name: &str,
        access_token_name: &str,
        refresh_token_name: &str,
        expires_in: u64,
        refresh: &RefreshFn,
    ) -> Result<String, MaxError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(name) {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }
        let access_token = self
            .do_refresh(access_token_name, refresh_token_name, expires_in, refresh, &mut cache, name)
            .await?;
        Ok(access_token)
    }

    async fn do_refresh(
        &self,
        access_token_name: &str,
        refresh_token_name: &str,
        expires_in: u64,
        refresh: &RefreshFn,
        cache: &mut BTreeMap<String, CachedToken>,
        name: &str,
    ) -> Result<String, MaxError> {
        let refresh_token = self.store.get(refresh_token_name).await?.ok_or_else(|| {
            MaxError::not_found("credential.refresh_token_missing", "credential", refresh_token_name)
        })?;
        let result = refresh(refresh_token).await?;
        self.store.set(access_token_name, result.access_token.clone()).await?;
        if let Some(rotated) = &result.refresh_token {
            self.store.set(refresh_token_name, rotated.clone()).await?;
        }
        cache.insert(
            name.to_string(),
            CachedToken {
                value: result.access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(expires_in),
            },
        );
        Ok(result.access_token)
    }

    /// Start one periodic timer per registered OAuth credential, firing at
    /// `0.9 * expires_in` seconds and refreshing proactively. Refresh
    /// failures are logged and swallowed; the next tick (or an on-demand
    /// `get()`) retries.
    pub fn start_refresh_schedulers(self: &Arc<Self>) {
        for (name, cred) in &self.credentials {
            let Credential::OAuth {
                access_token_name,
                refresh_token_name,
                expires_in,
                refresh,
            } = cred
            else {
                continue;
            };
            let provider = self.clone();
            let name = name.clone();
            let access_token_name = access_token_name.clone();
            let refresh_token_name = refresh_token_name.clone();
            let expires_in = *expires_in;
            let refresh = refresh.clone();
            let period = Duration::from_secs_f64(0.9 * expires_in as f64).max(Duration::from_millis(1));

            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await; // first tick fires immediately; skip it
                loop {
                    interval.tick().await;
                    let mut cache = provider.cache.lock().await;
                    let result = provider
                        .do_refresh(&access_token_name, &refresh_token_name, expires_in, &refresh, &mut cache, &name)
                        .await;
                    drop(cache);
                    if let Err(e) = result {
                        tracing::warn!(credential = %name, error = %e, "scheduled OAuth refresh failed");
                    }
                }
            });
            // scheduler_handles is only ever locked uncontended here, from
            // a sync call that never awaits across the lock.
            if let Ok(mut handles) = self.scheduler_handles.try_lock() {
                handles.push(handle);
            }
        }
    }

    /// Stop all scheduler timers started by [`Self::start_refresh_schedulers`].
    pub async fn stop(&self) {
        let mut handles = self.scheduler_handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}
