use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use multus_config::{Manager, MultusConfig};

/// Keeps the multus shim configuration in sync with the primary CNI plugin
#[derive(Parser)]
#[command(name = "multus-config-daemon", author, version, about)]
struct Cli {
    /// Path to the top-level multus configuration
    #[arg(long, default_value = "/etc/cni/multus/daemon-config.json")]
    config: PathBuf,

    /// Debounce window for configuration changes, in milliseconds
    #[arg(long, default_value_t = 200)]
    debounce_ms: u64,

    /// Write the shim configuration once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_max_level(Level::INFO)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);

    if let Err(err) = run(Cli::parse()).await {
        error!("multus configuration daemon failed: {:#}", err);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = MultusConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let manager = Manager::new(config)
        .context("Failed to create the configuration manager")?
        .with_debounce(Duration::from_millis(cli.debounce_ms));

    if cli.once {
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    manager
        .start(cancel.clone(), &tracker)
        .context("Failed to watch the primary CNI configuration")?;
    tracker.close();

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = terminate.recv() => info!("Received SIGTERM"),
        _ = tracker.wait() => error!("Configuration watch exited"),
    }

    cancel.cancel();
    tracker.wait().await;
    info!(
        "Stopped; last configuration left at {}",
        manager.multus_config_file_path().display()
    );
    Ok(())
}
