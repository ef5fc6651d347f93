use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// Defaults target the nl-ams-su1 region.
pub const DEFAULT_IMAGE: &str = "285bcbf1-738b-4bcf-a9a9-b9940587a026"; // Ubuntu 18.04
pub const DEFAULT_REGION: &str = "nl-ams-su1";
pub const DEFAULT_SERVER_FLAVOR: &str = "ar-2-1-15";
pub const DEFAULT_NETWORK: &str = "fe9645fc-2234-4865-895b-e3bb4bb0eb7b"; // public1
pub const DEFAULT_SECURITY_GROUP: &str = "771874f3-541e-4693-97ad-d585e78999ef";
pub const DEFAULT_SSH_USER: &str = "ubuntu";
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Option names accepted by the driver.
pub mod flag {
    pub const API_TOKEN: &str = "arvan-api-token";
    pub const IMAGE: &str = "arvan-image";
    pub const REGION: &str = "arvan-region";
    pub const SERVER_FLAVOR: &str = "arvan-server-flavor";
    pub const NETWORK: &str = "arvan-network";
    pub const SECURITY_GROUP: &str = "arvan-security-group";
    pub const SSH_USER: &str = "arvan-ssh-user";
}

/// A creation-time option, bound to an environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateFlag {
    pub name: &'static str,
    pub env_var: &'static str,
    pub usage: &'static str,
    pub default: Option<&'static str>,
}

pub const CREATE_FLAGS: &[CreateFlag] = &[
    CreateFlag {
        name: flag::API_TOKEN,
        env_var: "ARVAN_API_TOKEN",
        usage: "API token",
        default: None,
    },
    CreateFlag {
        name: flag::IMAGE,
        env_var: "ARVAN_IMAGE",
        usage: "Image",
        default: Some(DEFAULT_IMAGE),
    },
    CreateFlag {
        name: flag::REGION,
        env_var: "ARVAN_REGION",
        usage: "Region",
        default: Some(DEFAULT_REGION),
    },
    CreateFlag {
        name: flag::SERVER_FLAVOR,
        env_var: "ARVAN_SERVER_FLAVOR",
        usage: "Server flavor",
        default: Some(DEFAULT_SERVER_FLAVOR),
    },
    CreateFlag {
        name: flag::NETWORK,
        env_var: "ARVAN_NETWORK",
        usage: "Network",
        default: Some(DEFAULT_NETWORK),
    },
    CreateFlag {
        name: flag::SECURITY_GROUP,
        env_var: "ARVAN_SECURITY_GROUP",
        usage: "Security group",
        default: Some(DEFAULT_SECURITY_GROUP),
    },
    CreateFlag {
        name: flag::SSH_USER,
        env_var: "ARVAN_SSH_USER",
        usage: "SSH username",
        default: Some(DEFAULT_SSH_USER),
    },
];

/// Resolved option values keyed by flag name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOptions {
    values: HashMap<String, String>,
}

impl DriverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Value for `name`, treating an empty string as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Resolve every flag from an explicit value, then `lookup(env_var)`, then its default.
    pub fn resolve<I, F>(flags: &[CreateFlag], explicit: I, lookup: F) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
        F: Fn(&str) -> Option<String>,
    {
        let explicit: HashMap<String, String> = explicit
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .collect();

        let values = flags
            .iter()
            .filter_map(|f| {
                let value = explicit
                    .get(f.name)
                    .cloned()
                    .or_else(|| lookup(f.env_var).filter(|v| !v.is_empty()))
                    .or_else(|| f.default.map(str::to_string))?;
                Some((f.name.to_string(), value))
            })
            .collect();

        Self { values }
    }

    /// Resolve against the process environment (and `.env`, if present).
    pub fn from_env<I>(flags: &[CreateFlag], explicit: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        dotenvy::dotenv().ok();
        Self::resolve(flags, explicit, |var| std::env::var(var).ok())
    }
}

/// Everything the driver knows about one machine, including the remote
/// identifiers assigned during creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub machine_name: String,
    pub store_path: PathBuf,
    pub api_token: String,
    pub region: String,
    pub image: String,
    pub server_flavor: String,
    pub network: String,
    pub security_group: String,
    pub ssh_user: String,
    pub ssh_port: u16,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub ssh_key_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl DriverConfig {
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            api_token: String::new(),
            region: DEFAULT_REGION.into(),
            image: DEFAULT_IMAGE.into(),
            server_flavor: DEFAULT_SERVER_FLAVOR.into(),
            network: DEFAULT_NETWORK.into(),
            security_group: DEFAULT_SECURITY_GROUP.into(),
            ssh_user: DEFAULT_SSH_USER.into(),
            ssh_port: DEFAULT_SSH_PORT,
            server_id: None,
            ssh_key_id: None,
            ip_address: None,
        }
    }

    /// Apply resolved options. Unset options keep their current value.
    pub fn apply_options(&mut self, opts: &DriverOptions) -> Result<()> {
        let fields: [(&str, &mut String); 7] = [
            (flag::API_TOKEN, &mut self.api_token),
            (flag::IMAGE, &mut self.image),
            (flag::REGION, &mut self.region),
            (flag::SERVER_FLAVOR, &mut self.server_flavor),
            (flag::NETWORK, &mut self.network),
            (flag::SECURITY_GROUP, &mut self.security_group),
            (flag::SSH_USER, &mut self.ssh_user),
        ];
        for (name, field) in fields {
            if let Some(value) = opts.get(name) {
                *field = value.to_string();
            }
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_token.is_empty() {
            return Err(Error::Config(format!(
                "arvan driver requires the --{} option",
                flag::API_TOKEN
            )));
        }
        Ok(())
    }

    /// Directory holding this machine's key files and persisted state.
    pub fn machine_dir(&self) -> PathBuf {
        machine_dir(&self.store_path, &self.machine_name)
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.machine_dir().join("id_rsa")
    }
}

pub fn machine_dir(store_path: &Path, machine_name: &str) -> PathBuf {
    store_path.join("machines").join(machine_name)
}
