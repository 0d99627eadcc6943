// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lazy field resolution with cycle detection. A [`ResolverGraph`] maps a
//! field name to a factory; the factory is handed a [`Resolved`] accessor
//! so it can pull other fields on demand without the graph's owner having
//! to pre-compute a dependency order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use max_error::{Facet, MaxError};
use tokio::sync::Mutex;

/// Produces one field's value given the installation config and an
/// accessor for evaluating other fields in the same graph.
pub type ResolverFactory = Arc<dyn Fn(serde_json::Value, Resolved) -> BoxFuture<'static, Result<serde_json::Value, MaxError>> + Send + Sync>;

/// A mapping from field name to the factory that computes it.
///
/// `with(overrides)` returns a new graph with the named factories
/// replaced, leaving the rest untouched — the mechanism a connector uses
/// to specialize a shared base graph per onboarding variant.
#[derive(Clone)]
pub struct ResolverGraph {
    factories: Arc<HashMap<String, ResolverFactory>>,
}

impl ResolverGraph {
    /// Build a graph from an explicit field-to-factory map.
    #[must_use]
    pub fn new(factories: HashMap<String, ResolverFactory>) -> Self {
        Self { factories: Arc::new(factories) }
    }

    /// An empty graph, resolving no fields.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    /// Return a new graph with `overrides` substituted in, keeping every
    /// other factory from this graph unchanged.
    #[must_use]
    pub fn with(&self, overrides: HashMap<String, ResolverFactory>) -> Self {
        let mut merged = (*self.factories).clone();
        merged.extend(overrides);
        Self { factories: Arc::new(merged) }
    }

    /// Names of every field this graph knows how to resolve.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Resolve `field` with a fresh in-progress set, i.e. as the root of a
    /// new evaluation rather than a dependency of another resolve.
    pub async fn resolve(&self, field: &str, config: serde_json::Value) -> Result<serde_json::Value, MaxError> {
        Resolved::new(self.clone()).get(field, config).await
    }
}

/// An in-flight evaluation of a [`ResolverGraph`], tracking which fields
/// are currently being computed so a factory that (directly or
/// transitively) depends on its own field raises `ErrCircularDependency`
/// instead of recursing forever.
#[derive(Clone)]
pub struct Resolved {
    graph: ResolverGraph,
    in_progress: Arc<Mutex<HashSet<String>>>,
}

impl Resolved {
    fn new(graph: ResolverGraph) -> Self {
        Self { graph, in_progress: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Evaluate `field`, reusing this accessor's in-progress set so a
    /// cycle anywhere in the chain is caught.
    pub async fn get(&self, field: &str, config: serde_json::Value) -> Result<serde_json::Value, MaxError> {
        {
            let mut in_progress = self.in_progress.lock().await;
            if !in_progress.insert(field.to_string()) {
                return Err(MaxError::new(
                    "resolver.circular_dependency",
                    format!("field \"{field}\" depends on itself, directly or transitively"),
                )
                .with_facet(Facet::InvariantViolated));
            }
        }

        let factory = self
            .graph
            .factories
            .get(field)
            .cloned()
            .ok_or_else(|| MaxError::not_found("resolver.unknown_field", "field", field));

        let result = match factory {
            Ok(factory) => factory(config, self.clone()).await,
            Err(error) => Err(error),
        };

        self.in_progress.lock().await.remove(field);
        result
    }
}
