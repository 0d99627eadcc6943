#![deny(unsafe_code)]
use anyhow::Result;
use clap::Parser;
use max_daemon::Args;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug { EnvFilter::new("debug") } else { EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")) };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let shutdown = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler");
        sigterm.recv().await;
        tracing::info!("received SIGTERM, shutting down");
    };

    max_daemon::run(&args, shutdown).await
}
