// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-lifecycle
//!
//! The `start`/`stop` contract shared by every supervised node, plus the
//! `auto(deps)` combinator for composing lifecycles out of other
//! lifecycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use max_error::MaxError;
use tokio::sync::Mutex;

/// `start` must be idempotent: calls after the first are no-ops until a
/// matching `stop` runs. `stop` runs unconditionally and should not assume
/// `start` ever succeeded.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Bring this component up. Safe to call repeatedly; only the first
    /// call (since construction or the last `stop`) does work.
    async fn start(&self) -> Result<(), MaxError>;

    /// Tear this component down. Always runs, even if `start` never
    /// succeeded or was never called.
    async fn stop(&self) -> Result<(), MaxError>;
}

#[async_trait]
impl<T: Lifecycle + ?Sized> Lifecycle for Arc<T> {
    async fn start(&self) -> Result<(), MaxError> {
        (**self).start().await
    }

    async fn stop(&self) -> Result<(), MaxError> {
        (**self).stop().await
    }
}

/// Wraps a fallible start/stop pair with idempotence tracking, so callers
/// implementing [`Lifecycle`] do not need to hand-roll a guard flag.
pub struct IdempotentLifecycle<F, G>
where
    F: Fn() -> futures::future::BoxFuture<'static, Result<(), MaxError>> + Send + Sync,
    G: Fn() -> futures::future::BoxFuture<'static, Result<(), MaxError>> + Send + Sync,
{
    started: AtomicBool,
    on_start: F,
    on_stop: G,
}

impl<F, G> IdempotentLifecycle<F, G>
where
    F: Fn() -> futures::future::BoxFuture<'static, Result<(), MaxError>> + Send + Sync,
    G: Fn() -> futures::future::BoxFuture<'static, Result<(), MaxError>> + Send + Sync,
{
    /// Build a lifecycle from plain start/stop closures.
    pub fn new(on_start: F, on_stop: G) -> Self {
        Self {
            started: AtomicBool::new(false),
            on_start,
            on_stop,
        }
    }
}

#[async_trait]
impl<F, G> Lifecycle for IdempotentLifecycle<F, G>
where
    F: Fn() -> futures::future::BoxFuture<'static, Result<(), MaxError>> + Send + Sync,
    G: Fn() -> futures::future::BoxFuture<'static, Result<(), MaxError>> + Send + Sync,
{
    async fn start(&self) -> Result<(), MaxError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match (self.on_start)().await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Allow a retry on the next start() call.
                self.started.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<(), MaxError> {
        self.started.store(false, Ordering::SeqCst);
        (self.on_stop)().await
    }
}

/// One entry in an `auto()` dependency list: a single lifecycle started in
/// sequence with its neighbors, or a batch started concurrently with each
/// other (but still in order relative to surrounding entries).
pub enum LifecycleGroup {
    /// Started/stopped on its own, in order relative to sibling entries.
    Sequential(Box<dyn Lifecycle>),
    /// Started concurrently; stopped concurrently (in reverse group order
    /// relative to other entries).
    Concurrent(Vec<Box<dyn Lifecycle>>),
}

/// A lifecycle composed from an ordered list of dependencies.
///
/// `start` walks `deps` forward, starting sequential entries one at a
/// time and concurrent entries together; `stop` walks in reverse. If
/// entry `i`'s start fails, entries `0..i-1` are left started — the caller
/// must still invoke `stop` on the `Auto` lifecycle to reclaim them.
pub struct Auto {
    deps: Vec<LifecycleGroup>,
    /// How many leading groups (by index) have successfully started.
    started_through: Mutex<usize>,
}

impl Auto {
    /// Compose a lifecycle from the given dependency groups, in order.
    #[must_use]
    pub fn new(deps: Vec<LifecycleGroup>) -> Self {
        Self {
            deps,
            started_through: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Lifecycle for Auto {
    async fn start(&self) -> Result<(), MaxError> {
        let mut started_through = self.started_through.lock().await;
        while *started_through < self.deps.len() {
            let group = &self.deps[*started_through];
            let result = match group {
                LifecycleGroup::Sequential(lc) => lc.start().await,
                LifecycleGroup::Concurrent(lcs) => {
                    let futures = lcs.iter().map(|lc| lc.start());
                    let results = futures::future::join_all(futures).await;
                    results.into_iter().collect::<Result<Vec<()>, _>>().map(|_| ())
                }
            };
            result?;
            *started_through += 1;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), MaxError> {
        let mut started_through = self.started_through.lock().await;
        let mut first_err = None;
        while *started_through > 0 {
            let idx = *started_through - 1;
            let group = &self.deps[idx];
            let result = match group {
                LifecycleGroup::Sequential(lc) => lc.stop().await,
                LifecycleGroup::Concurrent(lcs) => {
                    let futures = lcs.iter().map(|lc| lc.stop());
                    let results = futures::future::join_all(futures).await;
                    let mut err = None;
                    for r in results {
                        if let Err(e) = r {
                            err.get_or_insert(e);
                        }
                    }
                    err.map_or(Ok(()), Err)
                }
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
            *started_through = idx;
        }
        first_err.map_or(Ok(()), Err)
    }
}
