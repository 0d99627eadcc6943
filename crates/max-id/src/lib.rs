// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-id
//!
//! Branded identifiers, hierarchical scopes, and entity references shared
//! across every level of the federation runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! branded_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing string as this id. Creation is the
            /// responsibility of the owning parent (a supervisor or an id
            /// generator), not of this type.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

branded_id!(WorkspaceId, "Opaque identifier for one workspace.");
branded_id!(InstallationId, "Opaque identifier for one installation.");
branded_id!(
    ConnectorType,
    "Name of a connector static descriptor, e.g. `\"acme-crm\"`."
);
branded_id!(
    DeployerKind,
    "Name of a registered deployment strategy, e.g. `\"in-process\"`."
);
branded_id!(
    ProviderKind,
    "Name of a registered credential provider kind."
);

/// A tagged hierarchical location within the federation.
///
/// Scopes form a lattice: upgrading a lower scope with a parent-assigned
/// identifier produces a higher scope. Data flowing up the hierarchy
/// carries a scope stamp; requests flowing down carry a [`ScopeRouting`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
#[serde(rename_all_fields = "camelCase")]
pub enum Scope {
    /// The process-level root.
    Global,
    /// One workspace.
    Workspace {
        /// The workspace this scope names.
        workspace_id: WorkspaceId,
    },
    /// One installation within a workspace.
    Installation {
        /// The owning workspace.
        workspace_id: WorkspaceId,
        /// The installation this scope names.
        installation_id: InstallationId,
    },
}

impl Scope {
    /// Upgrade a [`Scope::Global`] to [`Scope::Workspace`] under the given
    /// workspace id. Any other input scope is returned unchanged, since it
    /// is already at or below the target level.
    #[must_use]
    pub fn upgrade_to_workspace(self, workspace_id: WorkspaceId) -> Scope {
        match self {
            Scope::Global => Scope::Workspace { workspace_id },
            other => other,
        }
    }

    /// Upgrade [`Scope::Global`] or [`Scope::Workspace`] to
    /// [`Scope::Installation`] under the given installation id, filling in
    /// `workspace_id` when missing.
    #[must_use]
    pub fn upgrade_to_installation(
        self,
        workspace_id: WorkspaceId,
        installation_id: InstallationId,
    ) -> Scope {
        match self {
            Scope::Global | Scope::Workspace { .. } => Scope::Installation {
                workspace_id,
                installation_id,
            },
            other => other,
        }
    }
}

/// A routing envelope used on requests flowing down the hierarchy: each
/// level strips its own field before forwarding to a child dispatcher.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRouting {
    /// Target workspace, if the request is scoped at or below a workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,
    /// Target installation, if the request is scoped at an installation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<InstallationId>,
}

impl ScopeRouting {
    /// A routing envelope with no fields set, addressing the receiving
    /// node itself.
    #[must_use]
    pub fn here() -> Self {
        Self::default()
    }

    /// Strip the workspace field, returning the remainder to forward to a
    /// child dispatcher scoped below the workspace level.
    #[must_use]
    pub fn strip_workspace(mut self) -> Self {
        self.workspace_id = None;
        self
    }

    /// Strip the installation field, returning the remainder to forward to
    /// an installation dispatcher. An installation is a leaf, so the result
    /// is typically empty.
    #[must_use]
    pub fn strip_installation(mut self) -> Self {
        self.installation_id = None;
        self
    }
}

/// A typed, scope-aware reference to one entity.
///
/// Refs compare equal iff their canonical keys are equal; scope does not
/// participate in equality, matching the round-trip property
/// `Ref::from_key(entity_type, ref.to_key().1) == ref` (ignoring scope).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ref {
    /// Name of the entity type this reference points to.
    pub entity_type: String,
    /// Entity id, unique within `entity_type`.
    pub id: String,
    /// Where this entity currently lives.
    pub scope: Scope,
}

impl Ref {
    /// Construct a ref at the given scope.
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>, scope: Scope) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            scope,
        }
    }

    /// Canonical string key: `"{entityType}:{id}"`.
    #[must_use]
    pub fn to_key(&self) -> String {
        format!("{}:{}", self.entity_type, self.id)
    }

    /// Parse a canonical key produced by [`Ref::to_key`] back into a ref at
    /// the given scope. Returns `None` if the key has no `:` separator.
    #[must_use]
    pub fn from_key(key: &str, scope: Scope) -> Option<Self> {
        let (entity_type, id) = key.split_once(':')?;
        Some(Self {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
            scope,
        })
    }

    /// Return a copy of this ref at a new scope, preserving identity.
    #[must_use]
    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
            scope,
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.to_key() == other.to_key()
    }
}

impl Eq for Ref {}
