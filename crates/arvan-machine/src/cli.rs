use std::path::PathBuf;

use arvan_driver::config::flag;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "arvan-machine", about = "Provision docker hosts on ArvanCloud")]
pub struct Cli {
    /// Directory holding machine state and keys [default: ~/.docker/machine]
    #[arg(short = 's', long, env = "MACHINE_STORAGE_PATH", global = true)]
    pub storage_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a machine
    Create {
        name: String,
        #[command(flatten)]
        options: CreateOptions,
    },
    /// Start a machine
    Start { name: String },
    /// Stop a machine
    Stop { name: String },
    /// Restart a machine
    Restart { name: String },
    /// Kill (abruptly force stop) a machine
    Kill { name: String },
    /// Remove a machine
    Rm {
        name: String,
        /// Remove local state even if the remote resources cannot be removed
        #[arg(short, long)]
        force: bool,
    },
    /// Get the state of a machine
    Status { name: String },
    /// Get the IP address of a machine
    Ip { name: String },
    /// Get the docker URL of a machine
    Url { name: String },
    /// Show the stored configuration of a machine
    Inspect { name: String },
    /// List machines
    Ls,
    /// List the options accepted by `create`
    Flags,
    /// Show the driver version
    Version,
}

/// Options for `create`. Unset values fall back to the environment, then defaults.
#[derive(Debug, Default, Args)]
pub struct CreateOptions {
    /// API token
    #[arg(long = "arvan-api-token")]
    pub api_token: Option<String>,
    /// Image
    #[arg(long = "arvan-image")]
    pub image: Option<String>,
    /// Region
    #[arg(long = "arvan-region")]
    pub region: Option<String>,
    /// Server flavor
    #[arg(long = "arvan-server-flavor")]
    pub server_flavor: Option<String>,
    /// Network
    #[arg(long = "arvan-network")]
    pub network: Option<String>,
    /// Security group
    #[arg(long = "arvan-security-group")]
    pub security_group: Option<String>,
    /// SSH username
    #[arg(long = "arvan-ssh-user")]
    pub ssh_user: Option<String>,
}

impl CreateOptions {
    /// Values given on the command line, keyed by flag name.
    pub fn explicit(&self) -> Vec<(String, String)> {
        [
            (flag::API_TOKEN, &self.api_token),
            (flag::IMAGE, &self.image),
            (flag::REGION, &self.region),
            (flag::SERVER_FLAVOR, &self.server_flavor),
            (flag::NETWORK, &self.network),
            (flag::SECURITY_GROUP, &self.security_group),
            (flag::SSH_USER, &self.ssh_user),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name.to_string(), v)))
        .collect()
    }
}
