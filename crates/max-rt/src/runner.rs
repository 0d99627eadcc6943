// SPDX-License-Identifier: MIT OR Apache-2.0
//! Interprets a connector's [`Step`]s against its [`ResolverGraph`] and
//! [`Engine`], the concrete [`TaskRunner`] a [`max_sync::SyncExecutor`]
//! drives for one installation.

use std::sync::Arc;

use async_trait::async_trait;
use max_engine::Engine;
use max_error::{Facet, MaxError};
use max_sync::{Step, StepOperation, StepTarget, TaskOutcome, TaskRunner};
use max_task_store::Task;

use crate::connector::ConnectorContext;
use crate::resolver::ResolverGraph;

/// Runs one installation's sync tasks by dispatching each [`Step`] to the
/// connector's resolvers and writing the result through its engine.
pub struct ConnectorTaskRunner {
    resolvers: ResolverGraph,
    engine: Arc<dyn Engine>,
    ctx: Arc<ConnectorContext>,
}

impl ConnectorTaskRunner {
    /// Build a runner over a connector's resolver graph, an installation's
    /// engine, and the context those resolvers close over.
    #[must_use]
    pub fn new(resolvers: ResolverGraph, engine: Arc<dyn Engine>, ctx: Arc<ConnectorContext>) -> Self {
        Self { resolvers, engine, ctx }
    }

    async fn load_fields(&self, entity_type: &str, id: &str, fields: &[String]) -> Result<TaskOutcome, MaxError> {
        let mut resolved = serde_json::Map::new();
        for field in fields {
            let config = serde_json::json!({
                "entityType": entity_type,
                "id": id,
                "state": self.ctx.state,
            });
            let value = self.resolvers.resolve(field, config).await?;
            resolved.insert(field.clone(), value);
        }
        self.engine.update(entity_type, id, resolved).await?;
        Ok(TaskOutcome { entity_type: entity_type.to_string(), count: Some(1) })
    }

    async fn load_collection(&self, entity_type: &str, field: &str) -> Result<TaskOutcome, MaxError> {
        let config = serde_json::json!({
            "entityType": entity_type,
            "state": self.ctx.state,
        });
        let value = self.resolvers.resolve(field, config).await?;
        let elements = value.as_array().cloned().ok_or_else(|| {
            MaxError::bad_input(
                "sync.collection_resolver_not_array",
                format!("resolver \"{field}\" must return an array to seed a collection"),
            )
        })?;

        let mut count = 0usize;
        for element in elements {
            let fields = element.as_object().cloned().ok_or_else(|| {
                MaxError::bad_input(
                    "sync.collection_element_not_object",
                    format!("resolver \"{field}\" must return an array of objects"),
                )
            })?;
            self.engine.create(entity_type, fields).await?;
            count += 1;
        }
        Ok(TaskOutcome { entity_type: entity_type.to_string(), count: Some(count) })
    }
}

#[async_trait]
impl TaskRunner for ConnectorTaskRunner {
    async fn run(&self, task: &Task) -> Result<TaskOutcome, MaxError> {
        let step: Step = serde_json::from_value(task.payload.clone())
            .map_err(|error| MaxError::bad_input("sync.malformed_step", error.to_string()))?;

        match (&step.target, &step.operation) {
            (StepTarget::ForRoot(entity_ref) | StepTarget::ForOne(entity_ref), StepOperation::LoadFields(fields)) => {
                self.load_fields(&entity_ref.entity_type, &entity_ref.id, fields).await
            }
            (StepTarget::ForAll(def), StepOperation::LoadCollection(field)) => {
                self.load_collection(&def.entity_type, field).await
            }
            _ => Err(MaxError::new(
                "sync.unsupported_step",
                "this target/operation combination is not implemented",
            )
            .with_facet(Facet::NotImplemented)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverFactory;
    use max_credential::{CredentialProvider, InMemoryCredentialStore};
    use max_engine::{EntityDef, FieldKind, InMemoryEngine, Schema};
    use max_id::{Ref, Scope};
    use std::collections::{BTreeMap, HashMap};

    fn ctx() -> Arc<ConnectorContext> {
        Arc::new(ConnectorContext {
            credentials: CredentialProvider::new(Arc::new(InMemoryCredentialStore::new()), BTreeMap::new()),
            state: serde_json::json!({"tenant": "acme"}),
        })
    }

    fn task_for(step: &Step) -> Task {
        Task {
            id: "task-1".into(),
            sync_id: "sync-1".into(),
            state: max_task_store::TaskState::Running,
            parent_id: None,
            blocked_by: None,
            not_before: None,
            payload: serde_json::to_value(step).unwrap(),
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn load_fields_merges_resolved_values_into_engine() {
        let schema = Schema::new().with_entity(
            EntityDef::new("account").with_field("name", FieldKind::Scalar),
        );
        let engine: Arc<dyn Engine> = Arc::new(InMemoryEngine::new(schema));
        let created = engine.create("account", serde_json::Map::new()).await.unwrap();

        let mut factories: HashMap<String, ResolverFactory> = HashMap::new();
        factories.insert(
            "name".into(),
            Arc::new(|_config, _resolved| Box::pin(async move { Ok(serde_json::json!("Acme Corp")) })),
        );
        let runner = ConnectorTaskRunner::new(ResolverGraph::new(factories), Arc::clone(&engine), ctx());

        let step = Step {
            target: StepTarget::ForRoot(Ref::new("account", &created.id, Scope::Global)),
            operation: StepOperation::LoadFields(vec!["name".into()]),
        };
        let outcome = runner.run(&task_for(&step)).await.unwrap();
        assert_eq!(outcome.count, Some(1));

        let refreshed = engine.get("account", &created.id).await.unwrap();
        assert_eq!(refreshed.fields["name"], serde_json::json!("Acme Corp"));
    }

    #[tokio::test]
    async fn load_collection_creates_one_entity_per_resolved_element() {
        let schema = Schema::new().with_entity(EntityDef::new("contact").with_field("email", FieldKind::Scalar));
        let engine: Arc<dyn Engine> = Arc::new(InMemoryEngine::new(schema));

        let mut factories: HashMap<String, ResolverFactory> = HashMap::new();
        factories.insert(
            "contacts".into(),
            Arc::new(|_config, _resolved| {
                Box::pin(async move {
                    Ok(serde_json::json!([
                        {"email": "a@example.com"},
                        {"email": "b@example.com"},
                    ]))
                })
            }),
        );
        let runner = ConnectorTaskRunner::new(ResolverGraph::new(factories), Arc::clone(&engine), ctx());

        let step = Step {
            target: StepTarget::ForAll(EntityDef::new("contact")),
            operation: StepOperation::LoadCollection("contacts".into()),
        };
        let outcome = runner.run(&task_for(&step)).await.unwrap();
        assert_eq!(outcome.count, Some(2));

        let page = engine
            .query("contact", &[], max_engine::PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn unsupported_combination_is_not_implemented() {
        let engine: Arc<dyn Engine> = Arc::new(InMemoryEngine::new(Schema::new()));
        let runner = ConnectorTaskRunner::new(ResolverGraph::empty(), engine, ctx());

        let step = Step {
            target: StepTarget::ForAll(EntityDef::new("contact")),
            operation: StepOperation::LoadFields(vec!["email".into()]),
        };
        let err = runner.run(&task_for(&step)).await.unwrap_err();
        assert!(err.has(Facet::NotImplemented));
    }
}
