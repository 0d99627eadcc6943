// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composable, facet-based error values for Max.
//!
//! Errors are composed from facets rather than an inheritance hierarchy:
//! any combination of [`Facet`]s can be attached to one [`MaxError`], and
//! `has(err, facet)` is plain set membership. A [`MaxError`] carries a
//! stable `code`, the `domain` derived from the code's prefix up to the
//! first `.`, the set of facets, arbitrary structured `data`, an optional
//! human `context` string, and an optional opaque source for local cause
//! chaining. Serialization drops the source (it is not guaranteed to be
//! `Send + Sync` across a process boundary) but preserves everything else
//! exactly, so `reconstitute(err.to_json())` satisfies `has(...)`
//! identically to the originating value.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A declarative tag describing one facet of an error's kind.
///
/// Facets are structural, not hierarchical: an error can carry any
/// combination, and `has` is a membership test rather than a type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    /// Requested entity/child/field does not exist.
    NotFound,
    /// Caller-supplied value failed validation.
    BadInput,
    /// Internal contract breach; bug-class.
    InvariantViolated,
    /// Operation intentionally unsupported here.
    NotImplemented,
    /// Carries an `{entityType, entityId}` payload in `data`.
    HasEntityRef,
    /// Carries an `{entityType, field}` payload in `data`.
    HasEntityField,
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::BadInput => "bad_input",
            Self::InvariantViolated => "invariant_violated",
            Self::NotImplemented => "not_implemented",
            Self::HasEntityRef => "has_entity_ref",
            Self::HasEntityField => "has_entity_field",
        };
        f.write_str(s)
    }
}

/// A composable federation error.
///
/// Construct with [`MaxError::new`] and attach facets/data/context with the
/// builder methods, or use one of the facet shorthands (e.g.
/// [`MaxError::not_found`]).
pub struct MaxError {
    /// Stable machine-readable code, e.g. `"installation.not_found"`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Facets composed onto this error.
    pub facets: BTreeSet<Facet>,
    /// Structured payload data (merged from facet payloads and explicit
    /// `with_data` calls).
    pub data: serde_json::Value,
    /// Optional free-form diagnostic context string.
    pub context: Option<String>,
    /// Optional local cause; dropped on serialization.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MaxError {
    /// Create a new error with the given code and message, no facets.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            facets: BTreeSet::new(),
            data: serde_json::Value::Null,
            context: None,
            source: None,
        }
    }

    /// The domain of this error: everything in `code` up to the first `.`,
    /// or the whole code if there is no `.`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.code.split('.').next().unwrap_or(&self.code)
    }

    /// Attach a facet.
    #[must_use]
    pub fn with_facet(mut self, facet: Facet) -> Self {
        self.facets.insert(facet);
        self
    }

    /// Attach structured data, replacing any previously set value.
    #[must_use]
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(data) {
            self.data = v;
        }
        self
    }

    /// Attach a free-form diagnostic context string.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attach a local cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Build a `NotFound`-faceted error carrying `{entityType, entityId}`.
    pub fn not_found(code: impl Into<String>, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(code, "not found")
            .with_facet(Facet::NotFound)
            .with_facet(Facet::HasEntityRef)
            .with_data(serde_json::json!({
                "entityType": entity_type.into(),
                "entityId": entity_id.into(),
            }))
    }

    /// Build a `BadInput`-faceted error.
    pub fn bad_input(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, message).with_facet(Facet::BadInput)
    }

    /// True iff this error carries `facet`.
    #[must_use]
    pub fn has(&self, facet: Facet) -> bool {
        self.facets.contains(&facet)
    }

    /// True iff this error's domain equals `domain`.
    #[must_use]
    pub fn in_domain(&self, domain: &str) -> bool {
        self.domain() == domain
    }

    /// Promote any error to a `MaxError` with code `"unknown"`, preserving
    /// the original as the source (and thus its `Display` in the message).
    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        let message = error.to_string();
        Self::new("unknown", message).with_source(error)
    }

    /// Serialize to the wire representation. The `source` is dropped;
    /// everything else round-trips exactly.
    #[must_use]
    pub fn to_dto(&self) -> MaxErrorDto {
        MaxErrorDto {
            code: self.code.clone(),
            domain: self.domain().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
            data: self.data.clone(),
            facets: self.facets.iter().copied().collect(),
        }
    }

    /// Reconstitute a `MaxError` from its wire representation. The result
    /// satisfies `has(...)` identically to the originating value, but
    /// carries no source (opaque errors do not cross the wire).
    #[must_use]
    pub fn reconstitute(dto: MaxErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            facets: dto.facets.into_iter().collect(),
            data: dto.data,
            context: dto.context,
            source: None,
        }
    }
}

impl fmt::Debug for MaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("MaxError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        d.field("facets", &self.facets);
        if self.data != serde_json::Value::Null {
            d.field("data", &self.data);
        }
        if let Some(ctx) = &self.context {
            d.field("context", ctx);
        }
        if let Some(src) = &self.source {
            d.field("source", &src.to_string());
        }
        d.finish()
    }
}

impl fmt::Display for MaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ctx) = &self.context {
            write!(f, " ({ctx})")?;
        }
        Ok(())
    }
}

impl std::error::Error for MaxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Wire representation of a [`MaxError`]: `{code, domain, message, context?,
/// data, facets[]}`. Stable across process boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaxErrorDto {
    /// Stable machine-readable code.
    pub code: String,
    /// Domain prefix of `code`.
    pub domain: String,
    /// Human-readable message.
    pub message: String,
    /// Free-form diagnostic context, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Structured payload data.
    pub data: serde_json::Value,
    /// Facets composed onto this error.
    pub facets: Vec<Facet>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn domain_is_prefix_before_first_dot() {
        let err = MaxError::new("installation.not_found", "gone");
        assert_eq!(err.domain(), "installation");
    }

    #[test]
    fn domain_falls_back_to_whole_code_without_dot() {
        let err = MaxError::new("unknown", "boom");
        assert_eq!(err.domain(), "unknown");
    }

    #[test]
    fn has_is_set_membership() {
        let err = MaxError::new("x", "y").with_facet(Facet::NotFound);
        assert!(err.has(Facet::NotFound));
        assert!(!err.has(Facet::BadInput));
    }

    #[test]
    fn not_found_shorthand_carries_entity_ref() {
        let err = MaxError::not_found("installation.not_found", "installation", "inst-1");
        assert!(err.has(Facet::NotFound));
        assert!(err.has(Facet::HasEntityRef));
        assert_eq!(err.data["entityType"], "installation");
        assert_eq!(err.data["entityId"], "inst-1");
    }

    #[test]
    fn in_domain_matches_prefix() {
        let err = MaxError::new("storage.write_failed", "disk full");
        assert!(err.in_domain("storage"));
        assert!(!err.in_domain("network"));
    }

    #[test]
    fn wrap_promotes_to_unknown_code() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err = MaxError::wrap(io_err);
        assert_eq!(err.code, "unknown");
        assert!(err.source.is_some());
    }

    #[test]
    fn to_dto_roundtrips_code_domain_data_facets() {
        let err = MaxError::new("resolver.circular_dependency", "cycle detected")
            .with_facet(Facet::InvariantViolated)
            .with_data(serde_json::json!({"field": "owner"}))
            .with_context("while resolving owner");
        let dto = err.to_dto();
        let json = serde_json::to_string(&dto).unwrap();
        let back: MaxErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dto);

        let reconstituted = MaxError::reconstitute(back);
        assert_eq!(reconstituted.code, err.code);
        assert_eq!(reconstituted.domain(), err.domain());
        assert_eq!(reconstituted.data, err.data);
        assert!(reconstituted.has(Facet::InvariantViolated));
    }

    #[test]
    fn dto_drops_source_but_keeps_everything_else() {
        let err = MaxError::new("x.y", "z")
            .with_source(io::Error::other("inner"))
            .with_facet(Facet::BadInput);
        let dto = err.to_dto();
        let reconstituted = MaxError::reconstitute(dto);
        assert!(reconstituted.source.is_none());
        assert!(reconstituted.has(Facet::BadInput));
    }

    #[test]
    fn dto_omits_context_when_absent() {
        let err = MaxError::new("x", "y");
        let json = serde_json::to_value(err.to_dto()).unwrap();
        assert!(json.get("context").is_none());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = MaxError::new("sync.failed", "could not reach upstream");
        assert_eq!(err.to_string(), "[sync.failed] could not reach upstream");
    }

    #[test]
    fn display_includes_context_when_present() {
        let err = MaxError::new("sync.failed", "could not reach upstream")
            .with_context("installation=inst-1");
        assert_eq!(
            err.to_string(),
            "[sync.failed] could not reach upstream (installation=inst-1)"
        );
    }

    #[test]
    fn std_error_source_chain() {
        let err = MaxError::new("x", "y").with_source(io::Error::other("boom"));
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "boom");
    }

    #[test]
    fn bad_input_shorthand_has_facet() {
        let err = MaxError::bad_input("filter.unknown_field", "unknown field: owner");
        assert!(err.has(Facet::BadInput));
        assert_eq!(err.message, "unknown field: owner");
    }

    #[test]
    fn facets_are_deduplicated_via_set() {
        let err = MaxError::new("x", "y")
            .with_facet(Facet::NotFound)
            .with_facet(Facet::NotFound);
        assert_eq!(err.facets.len(), 1);
    }

    #[test]
    fn facet_serde_uses_snake_case() {
        let json = serde_json::to_string(&Facet::HasEntityRef).unwrap();
        assert_eq!(json, "\"has_entity_ref\"");
    }
}
