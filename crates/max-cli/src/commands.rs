// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level command implementations for the Max CLI, kept separate
//! from `main` so they can be tested without spawning the binary.

use anyhow::{Context, Result};
use max_id::{InstallationId, WorkspaceId};
use max_rt::{
    CreateInstallationRequest, CreateWorkspaceRequest, GlobalClient, InstallationLocator, InstallationSummary,
    WorkspaceSummary,
};

fn max_err(context: &'static str) -> impl FnOnce(max_error::MaxError) -> anyhow::Error {
    move |e| anyhow::anyhow!(e.to_string()).context(context)
}

/// List every workspace registered with the global runtime.
pub async fn list_workspaces(global: &impl GlobalClient) -> Vec<WorkspaceSummary> {
    global.list_workspaces().await
}

/// Create a new workspace and return its assigned id.
pub async fn create_workspace(global: &impl GlobalClient, name: String) -> Result<WorkspaceId> {
    global
        .create_workspace(CreateWorkspaceRequest { name, config: serde_json::Value::Null, spec: serde_json::Value::Null })
        .await
        .map_err(max_err("create workspace"))
}

/// Stop and unregister a workspace.
pub async fn remove_workspace(global: &impl GlobalClient, id: &WorkspaceId) -> Result<()> {
    global.remove_workspace(id).await.map_err(max_err("remove workspace"))
}

/// List every installation registered in a workspace.
pub async fn list_installations(global: &impl GlobalClient, workspace: &WorkspaceId) -> Result<Vec<InstallationSummary>> {
    let handle = global.workspace(workspace).await.with_context(|| format!("no such workspace \"{workspace}\""))?;
    handle.list_installations().await.map_err(max_err("list installations"))
}

/// Create and register an installation in a workspace.
pub async fn create_installation(
    global: &impl GlobalClient,
    workspace: &WorkspaceId,
    request: CreateInstallationRequest,
) -> Result<InstallationId> {
    let handle = global.workspace(workspace).await.with_context(|| format!("no such workspace \"{workspace}\""))?;
    handle.create_installation(request).await.map_err(max_err("create installation"))
}

/// Attach to an already-running installation (e.g. a subprocess started
/// out of band) and register it under a freshly assigned id.
pub async fn connect_installation(
    global: &impl GlobalClient,
    workspace: &WorkspaceId,
    locator: InstallationLocator,
) -> Result<InstallationId> {
    let handle = global.workspace(workspace).await.with_context(|| format!("no such workspace \"{workspace}\""))?;
    handle.connect_installation(locator).await.map_err(max_err("connect installation"))
}

/// Stop, unregister, and tear down an installation.
pub async fn remove_installation(global: &impl GlobalClient, workspace: &WorkspaceId, id: &InstallationId) -> Result<()> {
    let handle = global.workspace(workspace).await.with_context(|| format!("no such workspace \"{workspace}\""))?;
    handle.remove_installation(id).await.map_err(max_err("remove installation"))
}
