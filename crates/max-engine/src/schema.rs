// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entity schemas: the field-level shape an [`crate::Engine`] enforces on
//! create and update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The kind of one field on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// A string, number, or boolean scalar.
    Scalar,
    /// An RFC 3339 timestamp.
    Date,
    /// A single reference to another entity type.
    Ref {
        /// The entity type this field points at.
        entity_type: String,
    },
    /// A collection of references to another entity type.
    Collection {
        /// The entity type each element points at.
        entity_type: String,
    },
}

/// The declared shape of one entity type: its fields and which ones are
/// required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDef {
    /// Name of the entity type, e.g. `"contact"`.
    pub entity_type: String,
    /// Field name to field kind.
    pub fields: BTreeMap<String, FieldKind>,
    /// Field names that must be present on every instance.
    pub required: Vec<String>,
}

impl EntityDef {
    /// Declare a new entity type with no fields.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            fields: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Add a field declaration, returning `self` for chaining.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    /// Mark a field as required, returning `self` for chaining.
    #[must_use]
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Field names declared on this entity type, for filter validation.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

/// A set of entity type definitions, keyed by entity type name.
///
/// A `Ref`/`Collection` field is only valid if its target entity type is
/// also declared in the same schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    entities: BTreeMap<String, EntityDef>,
    /// The entity type a connector seeds first, if this schema belongs to
    /// an installation rather than a bare test fixture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root_entity_type: Option<String>,
}

impl Schema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity type. Returns `self` for chaining.
    #[must_use]
    pub fn with_entity(mut self, def: EntityDef) -> Self {
        self.entities.insert(def.entity_type.clone(), def);
        self
    }

    /// Designate the entity type a connector seeds as the installation's
    /// root entity. Returns `self` for chaining.
    #[must_use]
    pub fn with_root(mut self, entity_type: impl Into<String>) -> Self {
        self.root_entity_type = Some(entity_type.into());
        self
    }

    /// The designated root entity type, if this schema declares one.
    #[must_use]
    pub fn root_entity_type(&self) -> Option<&str> {
        self.root_entity_type.as_deref()
    }

    /// Look up a declared entity type by name.
    #[must_use]
    pub fn entity(&self, entity_type: &str) -> Option<&EntityDef> {
        self.entities.get(entity_type)
    }

    /// Check that every `Ref`/`Collection` field across every declared
    /// entity type names another entity type present in this schema.
    ///
    /// Returns the names of the first dangling reference encountered, if
    /// any: `(owning entity type, field name, target entity type)`.
    #[must_use]
    pub fn find_dangling_ref(&self) -> Option<(&str, &str, &str)> {
        for def in self.entities.values() {
            for (field_name, kind) in &def.fields {
                let target = match kind {
                    FieldKind::Ref { entity_type } | FieldKind::Collection { entity_type } => {
                        Some(entity_type.as_str())
                    }
                    FieldKind::Scalar | FieldKind::Date => None,
                };
                if let Some(target) = target {
                    if !self.entities.contains_key(target) {
                        return Some((def.entity_type.as_str(), field_name.as_str(), target));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_def_tracks_declared_fields() {
        let def = EntityDef::new("contact")
            .with_field("name", FieldKind::Scalar)
            .with_field("createdAt", FieldKind::Date)
            .require("name");
        assert_eq!(def.field_names().len(), 2);
        assert_eq!(def.required, vec!["name"]);
    }

    #[test]
    fn schema_accepts_ref_to_declared_entity() {
        let schema = Schema::new()
            .with_entity(EntityDef::new("account"))
            .with_entity(
                EntityDef::new("contact").with_field(
                    "account",
                    FieldKind::Ref {
                        entity_type: "account".into(),
                    },
                ),
            );
        assert!(schema.find_dangling_ref().is_none());
    }

    #[test]
    fn schema_flags_dangling_ref() {
        let schema = Schema::new().with_entity(EntityDef::new("contact").with_field(
            "account",
            FieldKind::Ref {
                entity_type: "account".into(),
            },
        ));
        let dangling = schema.find_dangling_ref().unwrap();
        assert_eq!(dangling, ("contact", "account", "account"));
    }

    #[test]
    fn schema_flags_dangling_collection_ref() {
        let schema = Schema::new().with_entity(EntityDef::new("account").with_field(
            "contacts",
            FieldKind::Collection {
                entity_type: "contact".into(),
            },
        ));
        assert!(schema.find_dangling_ref().is_some());
    }
}
