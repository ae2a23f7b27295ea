// Supervisor daemon: loads definitions, runs the supervisor, health monitor
// and control socket until shut down

use anyhow::Context;
use clap::Parser;
use mcproc::config::ConfigFile;
use mcproc::ipc::server::DEFAULT_SOCKET_PATH;
use mcproc::ipc::IpcServer;
use mcproc::monitor::HealthMonitor;
use mcproc::supervisor::Supervisor;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcprocd")]
#[command(about = "Supervisor daemon for managed server processes")]
#[command(version)]
struct Args {
    /// TOML or JSON config file with server definitions
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path for the control socket
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Start every configured server immediately
    #[arg(long)]
    start_all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let (definitions, settings) = match &args.config {
        Some(path) => {
            let config = ConfigFile::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            (config.servers, config.supervisor)
        }
        None => (Vec::new(), Default::default()),
    };

    info!(
        "Starting daemon with {} configured server(s)",
        definitions.len()
    );

    let supervisor = Supervisor::new(settings);
    supervisor
        .load_definitions(definitions)
        .context("invalid server definitions")?;

    if args.start_all {
        for snapshot in supervisor.list() {
            if let Err(e) = supervisor.start(&snapshot.name, None).await {
                error!("Failed to start server {}: {}", snapshot.name, e);
            }
        }
    }

    let monitor = HealthMonitor::with_defaults(supervisor.downgrade());
    let ipc = IpcServer::bind(&args.socket)
        .with_context(|| format!("failed to bind socket {}", args.socket.display()))?;

    tokio::select! {
        _ = ipc.run(supervisor.clone()) => {
            warn!("Control socket loop exited");
        }
        _ = monitor.run() => {
            warn!("Health monitor exited");
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    supervisor.stop_all().await;
    ipc.cleanup();
    info!("Daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
