// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The installation subprocess entry point: everything `main` needs to go
//! from a role/spec/data-dir/socket flag set to a running, dispatched
//! [`InstallationMax`] per the subprocess contract.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine as _;
use max_credential::CredentialProvider;
use max_dispatch::Dispatcher;
use max_engine::{Engine, InMemoryEngine};
use max_id::ConnectorType;
use max_lifecycle::Lifecycle;
use max_protocol::{JsonlCodec, RpcRequest};
use max_registry::FileCredentialStore;
use max_rt::{Connector, ConnectorContext, ConnectorTaskRunner, InstallationMax, InstallationSpec};
use max_sync::{EventBus, SyncExecutor};
use max_task_store::InMemoryTaskStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// Flags the subprocess contract requires: role, the base64-encoded
/// installation spec, a data directory, and the socket path to bind.
#[derive(clap::Parser, Debug)]
#[command(name = "max-daemon", version, about = "Max installation subprocess")]
pub struct Args {
    /// What kind of node this process hosts. Only `"installation"` is
    /// currently meaningful; any other value is rejected.
    #[arg(long)]
    pub role: String,

    /// Base64-encoded JSON [`InstallationSpec`].
    #[arg(long)]
    pub spec: String,

    /// Directory this installation persists credentials under.
    #[arg(long = "data-dir")]
    pub data_dir: PathBuf,

    /// Unix socket path to bind and signal readiness on.
    #[arg(long = "socket")]
    pub socket: PathBuf,

    /// Enable debug-level tracing.
    #[arg(long)]
    pub debug: bool,
}

/// The catalog of connectors this binary can host. Real connectors are an
/// external collaborator (spec non-goal); this is the seam a deployment
/// links its own connector crates into.
#[must_use]
pub fn connectors() -> BTreeMap<ConnectorType, Arc<Connector>> {
    BTreeMap::new()
}

/// Decode the `--spec` flag's base64-JSON payload.
///
/// # Errors
///
/// Returns an error if the value is not valid base64 or does not decode to
/// an [`InstallationSpec`].
pub fn decode_spec(encoded: &str) -> Result<InstallationSpec> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("decoding --spec as base64")?;
    serde_json::from_slice(&bytes).context("parsing --spec JSON")
}

/// Build the in-process installation the subprocess hosts: resolve the
/// spec's connector out of `catalog`, open its restart-durable credential
/// store under `data_dir`, and wire schema/engine/sync executor exactly as
/// `max_rt::workspace::in_process_factory` does for in-process
/// installations — the one difference is the credential store, which here
/// is file-backed rather than in-memory, since this process's whole
/// purpose is to survive the parent daemon restarting.
///
/// # Errors
///
/// Returns an error if the spec names an unknown connector, the
/// credential store cannot be opened, or the connector's `initialise`
/// rejects the given config.
pub async fn build_installation(
    spec: &InstallationSpec,
    data_dir: &Path,
    catalog: &BTreeMap<ConnectorType, Arc<Connector>>,
) -> Result<Arc<InstallationMax>> {
    let connector = catalog
        .get(&spec.connector)
        .cloned()
        .with_context(|| format!("unknown connector \"{}\"", spec.connector.as_str()))?;
    anyhow::ensure!(connector.is_well_formed(), "connector \"{}\" has no root entity type", spec.connector.as_str());

    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let store = FileCredentialStore::open(data_dir.join("credentials.json"))
        .await
        .context("opening credential store")?;
    let credentials = CredentialProvider::new(Arc::new(store), connector.credentials.clone());

    let state = (connector.initialise)(spec.config.clone(), Arc::clone(&credentials))
        .map_err(|e| anyhow::anyhow!(e.to_string()).context("connector initialise"))?;
    let ctx = Arc::new(ConnectorContext { credentials, state });

    let engine: Arc<dyn Engine> = Arc::new(InMemoryEngine::new(connector.schema.clone()));
    let bus = Arc::new(EventBus::new());
    let runner = Arc::new(ConnectorTaskRunner::new(connector.resolvers.clone(), Arc::clone(&engine), Arc::clone(&ctx)));
    let executor = SyncExecutor::new(Arc::new(InMemoryTaskStore::new()), runner, Arc::clone(&bus));

    Ok(Arc::new(InstallationMax::new(
        spec.connector.clone(),
        spec.name.clone(),
        connector.schema.clone(),
        engine,
        Arc::clone(&connector.seeder),
        ctx,
        connector.sync_plan.clone(),
        executor,
        bus,
    )))
}

/// Bind `socket_path`, print its one-line readiness signal to stdout, then
/// serve [`RpcRequest`]/[`RpcResponse`] pairs over every accepted
/// connection until `shutdown` completes, at which point the listener is
/// dropped and the socket file is removed.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn serve(
    installation: Arc<InstallationMax>,
    socket_path: &Path,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    if socket_path.exists() {
        let _ = tokio::fs::remove_file(socket_path).await;
    }
    let listener = UnixListener::bind(socket_path).with_context(|| format!("binding {}", socket_path.display()))?;

    println!("{}", socket_path.display());
    use std::io::Write as _;
    std::io::stdout().flush().context("flushing readiness line")?;

    let dispatcher = Arc::new(Dispatcher::new(installation));
    let accept = async {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(handle_connection(stream, dispatcher));
                }
                Err(error) => {
                    tracing::warn!(%error, "accept failed, closing listener");
                    break;
                }
            }
        }
    };

    tokio::select! {
        () = accept => {}
        () = shutdown => {}
    }

    drop(listener);
    let _ = tokio::fs::remove_file(socket_path).await;
    Ok(())
}

async fn handle_connection(stream: UnixStream, dispatcher: Arc<Dispatcher<InstallationMax>>) {
    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end().to_string();
                if trimmed.is_empty() {
                    continue;
                }
                let dispatcher = Arc::clone(&dispatcher);
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    let request: RpcRequest = match JsonlCodec::decode(&trimmed) {
                        Ok(request) => request,
                        Err(error) => {
                            tracing::warn!(%error, "dropping malformed request line");
                            return;
                        }
                    };
                    let response = dispatcher.dispatch(request).await;
                    if let Ok(encoded) = JsonlCodec::encode(&response) {
                        let mut writer = writer.lock().await;
                        let _ = writer.write_all(encoded.as_bytes()).await;
                        let _ = writer.flush().await;
                    }
                });
            }
            Err(error) => {
                tracing::warn!(%error, "unix connection read failed, closing");
                break;
            }
        }
    }
}

/// Run the whole subprocess lifecycle: build the installation, serve its
/// socket, and call `client.stop()` once `shutdown` resolves, per the
/// subprocess contract.
///
/// # Errors
///
/// Returns an error if the role is unsupported, the spec fails to decode,
/// or the installation fails to build, start, or bind its socket.
pub async fn run(args: &Args, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
    if args.role != "installation" {
        anyhow::bail!("unsupported role \"{}\"", args.role);
    }

    let spec = decode_spec(&args.spec)?;
    let installation = build_installation(&spec, &args.data_dir, &connectors()).await?;
    installation.start().await.map_err(|e| anyhow::anyhow!(e.to_string()).context("starting installation"))?;

    serve(Arc::clone(&installation), &args.socket, shutdown).await?;

    installation.stop().await.map_err(|e| anyhow::anyhow!(e.to_string()).context("stopping installation"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use max_engine::{EntityDef, FieldKind, Schema};
    use max_rt::{FnSeeder, InitialiseFn, Onboarding};
    use max_sync::SyncPlan;

    fn test_catalog() -> BTreeMap<ConnectorType, Arc<Connector>> {
        let schema = Schema::new().with_entity(EntityDef::new("account").with_field("name", FieldKind::Scalar)).with_root("account");
        let initialise: InitialiseFn = Arc::new(|_config, _creds| Ok(serde_json::json!({})));
        let mut catalog = BTreeMap::new();
        catalog.insert(
            ConnectorType::new("acme"),
            Arc::new(Connector {
                connector_type: "acme".into(),
                schema,
                seeder: Arc::new(FnSeeder::new(|_ctx| async move { Ok(serde_json::Map::new()) })),
                resolvers: max_rt::ResolverGraph::empty(),
                sync_plan: SyncPlan::default(),
                onboarding: Onboarding::default(),
                credentials: BTreeMap::new(),
                initialise,
            }),
        );
        catalog
    }

    #[test]
    fn decode_spec_round_trips() {
        let spec = InstallationSpec { connector: ConnectorType::new("acme"), name: "Acme Prod".into(), config: serde_json::json!({}) };
        let json = serde_json::to_vec(&spec).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(json);
        let decoded = decode_spec(&encoded).unwrap();
        assert_eq!(decoded.name, "Acme Prod");
    }

    #[test]
    fn decode_spec_rejects_invalid_base64() {
        assert!(decode_spec("not base64!!").is_err());
    }

    #[tokio::test]
    async fn build_installation_resolves_connector_and_opens_credential_store() {
        use max_credential::CredentialStore as _;

        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("credentials.json"), r#"{"api_key":"s3cr3t"}"#).await.unwrap();

        let spec = InstallationSpec { connector: ConnectorType::new("acme"), name: "Acme Prod".into(), config: serde_json::json!({}) };
        let installation = build_installation(&spec, dir.path(), &test_catalog()).await.unwrap();

        let description = installation.describe().await.unwrap();
        assert_eq!(description.name, "Acme Prod");

        // build_installation must have loaded the existing file rather than
        // clobbering it with an empty store.
        let reopened = FileCredentialStore::open(dir.path().join("credentials.json")).await.unwrap();
        assert_eq!(reopened.get("api_key").await.unwrap(), Some("s3cr3t".to_string()));
    }

    #[tokio::test]
    async fn build_installation_unknown_connector_errors() {
        let dir = tempfile::tempdir().unwrap();
        let spec = InstallationSpec { connector: ConnectorType::new("ghost"), name: "Ghost".into(), config: serde_json::json!({}) };
        let result = build_installation(&spec, dir.path(), &test_catalog()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn serve_writes_readiness_line_and_shuts_down_on_signal() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("inst.sock");
        let spec = InstallationSpec { connector: ConnectorType::new("acme"), name: "Acme Prod".into(), config: serde_json::json!({}) };
        let installation = build_installation(&spec, dir.path(), &test_catalog()).await.unwrap();
        installation.start().await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let socket_for_serve = socket_path.clone();
        let serve_task = tokio::spawn(async move {
            serve(installation, &socket_for_serve, async {
                let _ = rx.await;
            })
            .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(socket_path.exists());

        tx.send(()).unwrap();
        serve_task.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }
}
