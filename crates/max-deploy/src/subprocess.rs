// SPDX-License-Identifier: MIT OR Apache-2.0
//! A deployer that spawns a child process bound to a Unix socket, per the
//! installation subprocess contract.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use max_error::MaxError;
use max_id::DeployerKind;
use max_node::UnlabelledHandle;
use max_transport::UnixSocketTransport;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::warn;

use crate::Deployer;

/// Everything a [`SubprocessDeployer`] needs to spawn and reach one child:
/// the command to run, the role flag to pass it, where its data lives, and
/// the socket it will bind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubprocessConfig {
    /// Executable to spawn.
    pub command: String,
    /// Extra arguments appended after the contract's own flags.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables set on the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Role flag value (`"installation"` for an installation child).
    pub role: String,
    /// Directory the child persists its state under.
    pub data_dir: String,
    /// Unix socket path the child binds and the deployer connects to.
    pub socket_path: String,
}

type Factory<R> = Box<dyn Fn(UnixSocketTransport) -> R + Send + Sync>;

/// Spawns a child process with `--role <role> --spec <base64(spec)>
/// --data-dir <dir> --socket <path>`, waits for its one-line readiness
/// signal on stdout, then connects a [`UnixSocketTransport`] to the socket
/// it bound.
///
/// Tracks spawned children in memory, keyed by socket path, purely so
/// `teardown` can reap the OS process within this daemon run — that
/// bookkeeping is lost across a daemon restart, which is fine: startup
/// reconciliation reaches running installations through `connect`, not
/// through a remembered `Child`.
pub struct SubprocessDeployer<R> {
    kind: DeployerKind,
    make_client: Factory<R>,
    children: Mutex<HashMap<String, Child>>,
}

impl<R> SubprocessDeployer<R> {
    /// Build a deployer that wraps every freshly connected transport with
    /// `make_client`.
    pub fn new(kind: DeployerKind, make_client: impl Fn(UnixSocketTransport) -> R + Send + Sync + 'static) -> Self {
        Self { kind, make_client: Box::new(make_client), children: Mutex::new(HashMap::new()) }
    }

    fn parse_config(config: &serde_json::Value) -> Result<SubprocessConfig, MaxError> {
        serde_json::from_value(config.clone()).map_err(|e| MaxError::bad_input("deploy.invalid_config", e.to_string()))
    }

    async fn spawn(&self, config: &SubprocessConfig, spec: &serde_json::Value) -> Result<UnixSocketTransport, MaxError> {
        let encoded_spec = base64::engine::general_purpose::STANDARD.encode(spec.to_string());

        let mut cmd = Command::new(&config.command);
        cmd.arg("--role")
            .arg(&config.role)
            .arg("--spec")
            .arg(&encoded_spec)
            .arg("--data-dir")
            .arg(&config.data_dir)
            .arg("--socket")
            .arg(&config.socket_path)
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (k, v) in &config.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| MaxError::wrap(e).with_context("spawning installation subprocess"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MaxError::new("deploy.spawn_failed", "subprocess stdout unavailable"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) => break,
                        Ok(_) => {
                            let s = line.trim_end();
                            if !s.is_empty() {
                                warn!(target: "max.deploy.subprocess.stderr", "{s}");
                            }
                        }
                        Err(_) => break,
                    }
                }
            });
        }

        let mut reader = BufReader::new(stdout);
        let mut ready_line = String::new();
        let n = reader
            .read_line(&mut ready_line)
            .await
            .map_err(|e| MaxError::wrap(e).with_context("reading subprocess readiness line"))?;
        if n == 0 {
            let status = child.wait().await.ok();
            return Err(MaxError::new("deploy.spawn_failed", format!("subprocess exited before signaling readiness (status={status:?})")));
        }

        let socket_path = ready_line.trim().to_string();
        let transport = UnixSocketTransport::connect(&socket_path)
            .await
            .map_err(|e| MaxError::wrap(e).with_context("connecting to installation subprocess socket"))?;

        self.children.lock().await.insert(config.socket_path.clone(), child);
        Ok(transport)
    }
}

#[async_trait]
impl<R: Send + Sync> Deployer<R> for SubprocessDeployer<R> {
    fn kind(&self) -> DeployerKind {
        self.kind.clone()
    }

    async fn create(&self, config: &serde_json::Value, spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError> {
        let config = Self::parse_config(config)?;
        let transport = self.spawn(&config, spec).await?;
        Ok(UnlabelledHandle::new(self.kind.clone(), (self.make_client)(transport)))
    }

    async fn connect(&self, config: &serde_json::Value, spec: &serde_json::Value) -> Result<UnlabelledHandle<R>, MaxError> {
        // A subprocess does not survive its parent daemon restarting, so
        // reconciliation "connects" by spawning it again.
        self.create(config, spec).await
    }

    async fn teardown(&self, config: &serde_json::Value, _spec: &serde_json::Value) -> Result<(), MaxError> {
        let config = Self::parse_config(config)?;
        let mut children = self.children.lock().await;
        let Some(mut child) = children.remove(&config.socket_path) else {
            return Ok(());
        };
        drop(children);

        let exited = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await;
        if exited.is_err() {
            warn!(target: "max.deploy.subprocess", "installation subprocess did not exit after stop(), killing");
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        Ok(())
    }
}

/// Convenience alias for a deployer whose client is shared across
/// supervisors and callers.
pub type SharedSubprocessDeployer<R> = Arc<SubprocessDeployer<R>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn python_cmd() -> Option<String> {
        for cmd in &["python3", "python"] {
            if std::process::Command::new(cmd)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok()
            {
                return Some(cmd.to_string());
            }
        }
        None
    }

    #[tokio::test]
    async fn create_spawns_reads_readiness_line_and_connects() {
        let Some(python) = python_cmd() else {
            eprintln!("SKIP: python not found");
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("inst.sock");

        let script = format!(
            "import socket,sys\ns=socket.socket(socket.AF_UNIX, socket.SOCK_STREAM)\ns.bind('{path}')\ns.listen(1)\nprint('{path}')\nsys.stdout.flush()\nconn,_=s.accept()\n",
            path = socket_path.display()
        );
        let script_path = dir.path().join("fake_installation.py");
        std::fs::write(&script_path, script).unwrap();

        let deployer = SubprocessDeployer::new(DeployerKind::new("subprocess"), |_t| ());

        let config = serde_json::json!({
            "command": python,
            "args": [script_path.to_string_lossy()],
            "role": "installation",
            "dataDir": dir.path().to_string_lossy(),
            "socketPath": socket_path.to_string_lossy(),
        });

        let result = deployer.create(&config, &serde_json::json!({})).await;
        assert!(result.is_ok(), "expected successful connect, got {result:?}");
    }

    #[test]
    fn config_deserializes_camel_case_fields() {
        let value = serde_json::json!({
            "command": "node",
            "role": "installation",
            "dataDir": "/tmp/x",
            "socketPath": "/tmp/x.sock",
        });
        let config: SubprocessConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.data_dir, "/tmp/x");
        assert_eq!(config.socket_path, "/tmp/x.sock");
    }
}
