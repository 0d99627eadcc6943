// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use max_cli::commands;
use max_deploy::{DeployerRegistry, InProcessDeployer, SubprocessDeployer};
use max_id::{DeployerKind, InstallationId, WorkspaceId};
use max_lifecycle::Lifecycle;
use max_rt::{CreateInstallationRequest, GlobalClient, GlobalMax, InstallationLocator, InstallationSpec};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "max", version, about = "Max federation runtime CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory Max persists workspace/installation state under.
    #[arg(long, default_value = ".max", global = true)]
    data_dir: PathBuf,

    /// Path to `max.json`, if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of plain text.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Workspace-level operations.
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
    /// Installation-level operations.
    Installation {
        #[command(subcommand)]
        command: InstallationCommands,
    },
}

#[derive(Subcommand, Debug)]
enum WorkspaceCommands {
    /// List every registered workspace.
    List,
    /// Create a new workspace.
    Create {
        /// Display name.
        name: String,
    },
    /// Stop and unregister a workspace.
    Remove {
        /// Workspace id.
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum InstallationCommands {
    /// List installations registered in a workspace.
    List {
        /// Workspace id.
        #[arg(long)]
        workspace: String,
    },
    /// Deploy and register a new installation.
    Create {
        /// Workspace id.
        #[arg(long)]
        workspace: String,
        /// Deployer strategy: `in-process` or `subprocess`.
        #[arg(long, default_value = "in-process")]
        via: String,
        /// Connector to run.
        #[arg(long)]
        connector: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// JSON config passed to the connector's `initialise`.
        #[arg(long, default_value = "{}")]
        connector_config: String,
        /// JSON config the deployer itself needs (e.g. a `SubprocessConfig`).
        #[arg(long, default_value = "null")]
        deployer_config: String,
    },
    /// Attach to an installation that is already running.
    Connect {
        /// Workspace id.
        #[arg(long)]
        workspace: String,
        /// Deployer strategy it is reachable through.
        #[arg(long)]
        via: String,
        /// Connector it runs.
        #[arg(long)]
        connector: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// JSON config passed to the connector's `initialise`.
        #[arg(long, default_value = "{}")]
        connector_config: String,
        /// JSON config to reconnect through the deployer with.
        #[arg(long)]
        deployer_config: String,
    },
    /// Stop, unregister, and tear down an installation.
    Remove {
        /// Workspace id.
        #[arg(long)]
        workspace: String,
        /// Installation id.
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { EnvFilter::new("debug") } else { EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")) };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = max_config::load_config(cli.config.as_deref())?;
    let data_dir = config.data_dir.map(PathBuf::from).unwrap_or(cli.data_dir);

    let global = build_global(&data_dir)?;
    global.start().await.map_err(|e| anyhow::anyhow!(e.to_string()).context("starting runtime"))?;

    match cli.command {
        Commands::Workspace { command } => run_workspace(&global, command, cli.json).await,
        Commands::Installation { command } => run_installation(&global, command, cli.json).await,
    }
}

fn build_global(data_dir: &std::path::Path) -> Result<GlobalMax> {
    let connectors = BTreeMap::new();

    let mut deployers: DeployerRegistry<Arc<dyn max_rt::InstallationClient>> = DeployerRegistry::new();
    deployers.register(Arc::new(InProcessDeployer::new(DeployerKind::new("in-process"), max_rt::in_process_factory(connectors))));
    deployers.register(Arc::new(SubprocessDeployer::new(DeployerKind::new("subprocess"), max_rt::proxy_factory)));

    let registry = max_registry::WorkspaceRegistry::new(data_dir.join("workspaces"));
    Ok(GlobalMax::new(data_dir, BTreeMap::new(), Arc::new(deployers), registry))
}

async fn run_workspace(global: &GlobalMax, command: WorkspaceCommands, json: bool) -> Result<()> {
    match command {
        WorkspaceCommands::List => {
            let workspaces = commands::list_workspaces(global).await;
            print_result(&workspaces, json)
        }
        WorkspaceCommands::Create { name } => {
            let id = commands::create_workspace(global, name).await?;
            if json { println!("{}", serde_json::to_string(&id)?); } else { println!("created workspace {id}"); }
            Ok(())
        }
        WorkspaceCommands::Remove { id } => {
            commands::remove_workspace(global, &WorkspaceId::new(id.clone())).await?;
            if !json { println!("removed workspace {id}"); }
            Ok(())
        }
    }
}

async fn run_installation(global: &GlobalMax, command: InstallationCommands, json: bool) -> Result<()> {
    match command {
        InstallationCommands::List { workspace } => {
            let installations = commands::list_installations(global, &WorkspaceId::new(workspace)).await?;
            print_result(&installations, json)
        }
        InstallationCommands::Create { workspace, via, connector, name, connector_config, deployer_config } => {
            let request = CreateInstallationRequest {
                via: DeployerKind::new(via),
                config: serde_json::from_str(&deployer_config).context("parsing --deployer-config")?,
                spec: InstallationSpec {
                    connector: max_id::ConnectorType::new(connector),
                    name,
                    config: serde_json::from_str(&connector_config).context("parsing --connector-config")?,
                },
            };
            let id = commands::create_installation(global, &WorkspaceId::new(workspace), request).await?;
            if json { println!("{}", serde_json::to_string(&id)?); } else { println!("created installation {id}"); }
            Ok(())
        }
        InstallationCommands::Connect { workspace, via, connector, name, connector_config, deployer_config } => {
            let locator = InstallationLocator {
                via: DeployerKind::new(via),
                config: serde_json::from_str(&deployer_config).context("parsing --deployer-config")?,
                spec: InstallationSpec {
                    connector: max_id::ConnectorType::new(connector),
                    name,
                    config: serde_json::from_str(&connector_config).context("parsing --connector-config")?,
                },
            };
            let id = commands::connect_installation(global, &WorkspaceId::new(workspace), locator).await?;
            if json { println!("{}", serde_json::to_string(&id)?); } else { println!("connected installation {id}"); }
            Ok(())
        }
        InstallationCommands::Remove { workspace, id } => {
            commands::remove_installation(global, &WorkspaceId::new(workspace), &InstallationId::new(id.clone())).await?;
            if !json { println!("removed installation {id}"); }
            Ok(())
        }
    }
}

fn print_result<T: serde::Serialize + std::fmt::Debug>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value:#?}");
    }
    Ok(())
}
