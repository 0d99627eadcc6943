// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! max-rt
//!
//! The federation runtime: connector descriptors, field resolvers, the
//! sync-task runner built on them, and the three-level hierarchy
//! ([`global::GlobalMax`] over [`workspace::WorkspaceMax`] over
//! [`installation::InstallationMax`]) that gives every node in it a typed
//! client surface regardless of whether it runs in-process, as a
//! subprocess, or behind a remote transport.

pub mod connector;
pub mod global;
pub mod installation;
pub mod resolver;
pub mod routing;
pub mod runner;
pub mod workspace;

pub use connector::{Connector, ConnectorContext, FnSeeder, InitialiseFn, Onboarding, OnboardingStep, Seeder};
pub use global::{CreateWorkspaceRequest, GlobalClient, GlobalMax, WorkspaceSummary};
pub use installation::{InstallationClient, InstallationDescription, InstallationMax, InstallationProxy, SyncObserver};
pub use resolver::ResolverGraph;
pub use routing::{shim_transport, RoutingTable};
pub use runner::ConnectorTaskRunner;
pub use workspace::{
    in_process_factory, proxy_factory, CreateInstallationRequest, InstallationLocator, InstallationSpec,
    InstallationSummary, WorkspaceClient, WorkspaceMax,
};
