// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-registry
//!
//! Persisted metadata for workspaces and installations: one JSON file per
//! entry under a root directory, mirroring the in-memory supervisors that
//! own the live handles. Registries persist on every mutation; nothing
//! here is cached beyond what a single call needs.

pub mod credentials;
pub mod installation;
pub mod workspace;

pub use credentials::FileCredentialStore;
pub use installation::{InstallationRecord, InstallationRegistry};
pub use workspace::{WorkspaceRecord, WorkspaceRegistry};

/// Turn a display name into a filesystem-safe slug: lowercase ASCII
/// alphanumerics separated by single hyphens.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes_case_and_punctuation() {
        assert_eq!(slugify("Acme Corp!"), "acme-corp");
    }

    #[test]
    fn slugify_collapses_runs_of_separators() {
        assert_eq!(slugify("a   b--c"), "a-b-c");
    }

    #[test]
    fn slugify_falls_back_on_empty_input() {
        assert_eq!(slugify("   "), "unnamed");
    }
}
