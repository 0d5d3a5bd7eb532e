use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use meshkv::Error;
use meshkv::NodeBuilder;
use meshkv::Overrides;
use meshkv::Result;
use meshkv::Settings;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// In-memory key-value node replicated over a peer mesh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<String>,

    /// Address of the peer listener
    #[arg(long)]
    peer_listen: Option<SocketAddr>,

    /// Address of the client query listener
    #[arg(long)]
    query_listen: Option<SocketAddr>,

    /// Comma separated `host:port` peers to dial at startup
    #[arg(long)]
    peers: Option<String>,

    /// Directory of the write-ahead log
    #[arg(long)]
    wal_dir: Option<PathBuf>,

    /// Run without the client query listener
    #[arg(long)]
    disable_query_server: bool,
}

impl From<Cli> for Overrides {
    fn from(cli: Cli) -> Self {
        Overrides {
            config_path: cli.config_path,
            peer_listen: cli.peer_listen,
            query_listen: cli.query_listen,
            peers: cli.peers,
            wal_dir: cli.wal_dir,
            disable_query_server: cli.disable_query_server,
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    init_observability();

    let settings = Settings::load(&Cli::parse().into())?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let node = NodeBuilder::new(settings, graceful_rx)
        .build()
        .await?
        .start_peer_server()
        .start_query_server()
        .ready()?;

    info!("Application started. Waiting for CTRL+C signal...");
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if let Err(e) = node.run().await {
        error!("node stops: {:?}", e);
        return Err(e);
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

fn init_observability() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
