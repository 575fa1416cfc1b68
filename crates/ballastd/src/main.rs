//! ballastd — the Ballast worker daemon.
//!
//! Runs the worker agent: the job endpoint backed by the configured
//! device driver.
//!
//! # Usage
//!
//! ```text
//! ballastd worker --config /etc/ballast/ballast.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use ballast_core::BallastConfig;
use ballast_driver::{DeviceDriver, HaproxyDriver, NullDriver, ProcessServices};
use ballast_worker::DriverFactory;

#[derive(Parser)]
#[command(name = "ballastd", about = "Ballast worker daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker agent: serve the job endpoint against the
    /// configured device driver.
    Worker {
        /// Path to the ballast.toml configuration file.
        #[arg(long, default_value = "/etc/ballast/ballast.toml")]
        config: PathBuf,

        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ballastd=debug,ballast=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Worker { config, bind } => run_worker(config, bind).await,
    }
}

async fn run_worker(config_path: PathBuf, bind: Option<String>) -> anyhow::Result<()> {
    info!(config = ?config_path, "Ballast worker starting");

    let config = BallastConfig::from_file(&config_path)?;
    let bind = bind.unwrap_or_else(|| config.worker.bind.clone());

    let factory = driver_factory(&config)?;
    info!(driver = %config.worker.driver, "device driver selected");

    let router = ballast_worker::build_router(factory);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "worker job endpoint listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("Ballast worker stopped");
    Ok(())
}

fn driver_factory(config: &BallastConfig) -> anyhow::Result<DriverFactory> {
    match config.worker.driver.as_str() {
        "haproxy" => {
            let haproxy = config.worker.haproxy.clone();
            Ok(Arc::new(move || {
                let services = ProcessServices::new(&haproxy);
                Box::new(HaproxyDriver::new(services, haproxy.stats_socket.clone()))
                    as Box<dyn DeviceDriver>
            }))
        }
        "null" => Ok(Arc::new(|| Box::new(NullDriver) as Box<dyn DeviceDriver>)),
        other => anyhow::bail!("unknown driver '{other}'"),
    }
}
