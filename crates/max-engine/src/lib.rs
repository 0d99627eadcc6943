// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-engine
//!
//! The entity storage abstraction every [`InstallationMax`](https://docs.rs/max-rt)
//! layer queries through: a schema-validated CRUD surface plus filtered,
//! paginated listing.

mod filter;
mod page;
mod schema;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use max_error::MaxError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub use filter::{parse_filter, Filter, FilterOp};
pub use page::{Page, PageRequest};
pub use schema::{EntityDef, FieldKind, Schema};

/// One stored entity instance: an id, its declared type, and its field
/// values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique id within `entity_type`.
    pub id: String,
    /// The declared entity type this instance belongs to.
    pub entity_type: String,
    /// Field values, keyed by field name.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Entity storage: schema-validated create/read/update/delete plus
/// filtered, paginated listing.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Create a new entity of `entity_type`, validating required fields
    /// against the engine's schema.
    async fn create(
        &self,
        entity_type: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Entity, MaxError>;

    /// Fetch one entity by id. `NotFound`-faceted on a missing id.
    async fn get(&self, entity_type: &str, id: &str) -> Result<Entity, MaxError>;

    /// Merge `fields` into an existing entity. `NotFound`-faceted on a
    /// missing id.
    async fn update(
        &self,
        entity_type: &str,
        id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Entity, MaxError>;

    /// Delete an entity by id. `NotFound`-faceted on a missing id.
    async fn delete(&self, entity_type: &str, id: &str) -> Result<(), MaxError>;

    /// List entities of `entity_type` matching every filter (AND-joined),
    /// ordered by id, one page at a time.
    async fn query(
        &self,
        entity_type: &str,
        filters: &[Filter],
        page: PageRequest,
    ) -> Result<Page<Entity>, MaxError>;
}

/// A schema-validated, in-process [`Engine`] backed by a `BTreeMap` per
/// entity type. Entities are ordered by id within their type, which is
/// what makes a plain id string usable as a pagination cursor.
pub struct InMemoryEngine {
    schema: Schema,
    store: RwLock<BTreeMap<String, BTreeMap<String, Entity>>>,
    next_id: AtomicU64,
}

impl InMemoryEngine {
    /// Build an engine enforcing the given schema.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            store: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn entity_def(&self, entity_type: &str) -> Result<&EntityDef, MaxError> {
        self.schema.entity(entity_type).ok_or_else(|| {
            MaxError::bad_input(
                "engine.unknown_entity_type",
                format!("unknown entity type: {entity_type}"),
            )
        })
    }

    fn validate_required(
        def: &EntityDef,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), MaxError> {
        for required in &def.required {
            if !fields.contains_key(required) {
                return Err(MaxError::bad_input(
                    "engine.missing_required_field",
                    format!("missing required field: {required}"),
                ));
            }
        }
        Ok(())
    }

    fn next_id_for(&self, entity_type: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{entity_type}-{n}")
    }
}

#[async_trait]
impl Engine for InMemoryEngine {
    async fn create(
        &self,
        entity_type: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Entity, MaxError> {
        let def = self.entity_def(entity_type)?;
        Self::validate_required(def, &fields)?;

        let id = self.next_id_for(entity_type);
        let entity = Entity {
            id: id.clone(),
            entity_type: entity_type.to_string(),
            fields,
        };

        let mut store = self.store.write().await;
        store
            .entry(entity_type.to_string())
            .or_default()
            .insert(id, entity.clone());
        Ok(entity)
    }

    async fn get(&self, entity_type: &str, id: &str) -> Result<Entity, MaxError> {
        let store = self.store.read().await;
        store
            .get(entity_type)
            .and_then(|by_id| by_id.get(id))
            .cloned()
            .ok_or_else(|| MaxError::not_found("engine.entity_not_found", entity_type, id))
    }

    async fn update(
        &self,
        entity_type: &str,
        id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Entity, MaxError> {
        let mut store = self.store.write().await;
        let entity = store
            .get_mut(entity_type)
            .and_then(|by_id| by_id.get_mut(id))
            .ok_or_else(|| MaxError::not_found("engine.entity_not_found", entity_type, id))?;
        entity.fields.extend(fields);
        Ok(entity.clone())
    }

    async fn delete(&self, entity_type: &str, id: &str) -> Result<(), MaxError> {
        let mut store = self.store.write().await;
        let removed = store.get_mut(entity_type).and_then(|by_id| by_id.remove(id));
        if removed.is_none() {
            return Err(MaxError::not_found("engine.entity_not_found", entity_type, id));
        }
        Ok(())
    }

    async fn query(
        &self,
        entity_type: &str,
        filters: &[Filter],
        page: PageRequest,
    ) -> Result<Page<Entity>, MaxError> {
        let store = self.store.read().await;
        let empty = BTreeMap::new();
        let by_id = store.get(entity_type).unwrap_or(&empty);

        let matches = |entity: &Entity| {
            filters.iter().all(|f| {
                entity
                    .fields
                    .get(&f.field)
                    .map(|v| f.matches(v))
                    .unwrap_or(false)
            })
        };

        let overfetched: Vec<Entity> = by_id
            .range(page.cursor.clone().map_or(String::new(), |c| next_key(&c))..)
            .map(|(_, entity)| entity.clone())
            .filter(matches)
            .take(page.limit + 1)
            .collect();

        Ok(Page::from_overfetch(overfetched, page.limit, |e| e.id.clone()))
    }
}

/// The lexicographically smallest key strictly greater than `cursor`, used
/// to resume a `BTreeMap::range` scan just past the last item returned.
fn next_key(cursor: &str) -> String {
    format!("{cursor}\0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact_schema() -> Schema {
        Schema::new().with_entity(
            EntityDef::new("contact")
                .with_field("name", FieldKind::Scalar)
                .with_field("priority", FieldKind::Scalar)
                .require("name"),
        )
    }

    fn fields(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn create_rejects_unknown_entity_type() {
        let engine = InMemoryEngine::new(contact_schema());
        let err = engine
            .create("account", fields(&[("name", json!("Acme"))]))
            .await
            .unwrap_err();
        assert!(err.has(max_error::Facet::BadInput));
    }

    #[tokio::test]
    async fn create_rejects_missing_required_field() {
        let engine = InMemoryEngine::new(contact_schema());
        let err = engine.create("contact", fields(&[])).await.unwrap_err();
        assert!(err.has(max_error::Facet::BadInput));
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let engine = InMemoryEngine::new(contact_schema());
        let created = engine
            .create("contact", fields(&[("name", json!("Acme"))]))
            .await
            .unwrap();
        let fetched = engine.get("contact", &created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.fields.get("name"), Some(&json!("Acme")));
    }

    #[tokio::test]
    async fn get_missing_entity_is_not_found() {
        let engine = InMemoryEngine::new(contact_schema());
        let err = engine.get("contact", "contact-999").await.unwrap_err();
        assert!(err.has(max_error::Facet::NotFound));
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let engine = InMemoryEngine::new(contact_schema());
        let created = engine
            .create("contact", fields(&[("name", json!("Acme"))]))
            .await
            .unwrap();
        let updated = engine
            .update("contact", &created.id, fields(&[("priority", json!(2))]))
            .await
            .unwrap();
        assert_eq!(updated.fields.get("name"), Some(&json!("Acme")));
        assert_eq!(updated.fields.get("priority"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let engine = InMemoryEngine::new(contact_schema());
        let created = engine
            .create("contact", fields(&[("name", json!("Acme"))]))
            .await
            .unwrap();
        engine.delete("contact", &created.id).await.unwrap();
        assert!(engine.get("contact", &created.id).await.is_err());
    }

    #[tokio::test]
    async fn query_filters_and_paginates() {
        let engine = InMemoryEngine::new(contact_schema());
        for i in 0..5 {
            engine
                .create(
                    "contact",
                    fields(&[("name", json!(format!("c{i}"))), ("priority", json!(i))]),
                )
                .await
                .unwrap();
        }
        let filters = parse_filter("priority>=2", &["name", "priority"]).unwrap();
        let page = engine
            .query("contact", &filters, PageRequest::first(2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next_cursor.is_some());

        let next = engine
            .query(
                "contact",
                &filters,
                PageRequest {
                    cursor: page.next_cursor,
                    limit: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(next.items.len(), 1);
        assert!(next.next_cursor.is_none());
    }
}
