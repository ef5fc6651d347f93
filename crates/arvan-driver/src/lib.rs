pub mod api;
pub mod config;
pub mod driver;
pub mod ssh;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

pub use api::{ApiConnector, ArvanConnector, ComputeApi};
pub use config::{CREATE_FLAGS, CreateFlag, DriverConfig, DriverOptions};
pub use driver::ArvanDriver;

/// Port the docker daemon listens on inside a provisioned machine.
pub const DOCKER_PORT: u16 = 2376;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] arvan_api::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("ssh key error: {0}")]
    SshKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server {server_id} did not become active within {waited:?}")]
    Timeout { server_id: String, waited: Duration },

    #[error("{0} is not set")]
    NotSet(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Machine state as derived from the provider's status string.
#[derive(Debug)]
pub enum MachineState {
    /// No server has been created for this machine yet.
    Unprovisioned,
    Starting,
    Running,
    Stopped,
    /// A status the provider reported that has no mapping; carries the raw value.
    Unknown(String),
    /// The status could not be fetched.
    Error(Error),
}

impl MachineState {
    pub fn from_status(status: &str) -> Self {
        match status {
            "build" => Self::Starting,
            "active" => Self::Running,
            "stop" => Self::Stopped,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprovisioned => "Unprovisioned",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Unknown(_) => "Unknown",
            Self::Error(_) => "Error",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build metadata handed to the host when the driver is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub driver_name: &'static str,
    pub version: &'static str,
}

/// Lifecycle contract the host invokes for one managed machine.
///
/// Accessors with a default body derive from `ip()` and the SSH settings,
/// so a provider only supplies the remote operations and its configuration.
#[async_trait]
pub trait MachineDriver: Send + Sync {
    /// Provider identifier, used as the `--driver` value by the host.
    fn driver_name(&self) -> &'static str;

    /// Options this driver accepts at creation time.
    fn create_flags(&self) -> &'static [CreateFlag];

    /// Apply resolved options. Fails before any remote call if a required one is missing.
    fn set_config_from_flags(&mut self, opts: &DriverOptions) -> Result<()>;

    async fn create(&mut self) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    async fn remove(&self) -> Result<()>;

    /// Forced stop. Providers without a hard power-off fall back to `stop`.
    async fn kill(&self) -> Result<()> {
        self.stop().await
    }

    async fn get_state(&self) -> MachineState;

    fn machine_name(&self) -> &str;

    fn ip(&self) -> Result<String>;

    fn ssh_username(&self) -> String;

    fn ssh_port(&self) -> u16;

    fn ssh_key_path(&self) -> PathBuf;

    fn ssh_hostname(&self) -> Result<String> {
        self.ip()
    }

    /// Docker daemon endpoint, e.g. `tcp://185.8.1.2:2376`.
    fn url(&self) -> Result<String> {
        let ip = self.ip()?;
        Ok(format!("tcp://{}", join_host_port(&ip, DOCKER_PORT)))
    }
}

/// Format `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
