use std::path::PathBuf;

use crate::error::{CliError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_path: PathBuf,
}

impl AppConfig {
    /// Use the given storage path, falling back to `~/.docker/machine`.
    pub fn resolve(storage_path: Option<PathBuf>) -> Result<Self> {
        let storage_path = match storage_path {
            Some(path) => path,
            None => dirs::home_dir()
                .ok_or(CliError::NoHomeDir)?
                .join(".docker")
                .join("machine"),
        };

        Ok(Self { storage_path })
    }
}
