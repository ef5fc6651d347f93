mod cli;
mod config;
mod error;
mod host;
mod store;

use std::process::ExitCode;

use arvan_driver::BuildInfo;
use arvan_driver::driver::DRIVER_NAME;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::error::Result;
use crate::host::Host;
use crate::store::MachineStore;

const BUILD: BuildInfo = BuildInfo {
    driver_name: DRIVER_NAME,
    version: env!("CARGO_PKG_VERSION"),
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match register_driver(BUILD, cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Hand the driver and its build metadata to the host and run one command.
async fn register_driver(build: BuildInfo, cli: Cli) -> Result<()> {
    tracing::debug!(driver = build.driver_name, version = build.version, "driver registered");

    let config = AppConfig::resolve(cli.storage_path)?;
    let host = Host::new(MachineStore::new(config.storage_path), build);
    host.run(cli.command).await
}
