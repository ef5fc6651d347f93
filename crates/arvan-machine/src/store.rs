use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use arvan_driver::DriverConfig;
use arvan_driver::config::machine_dir;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

const CONFIG_FILE: &str = "config.json";

/// What the host persists for each machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub driver_name: String,
    pub driver: DriverConfig,
}

impl MachineRecord {
    /// Copy with the API token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut record = self.clone();
        if !record.driver.api_token.is_empty() {
            record.driver.api_token = "********".into();
        }
        record
    }
}

/// Machine state on disk under `<root>/machines/<name>/`.
#[derive(Debug, Clone)]
pub struct MachineStore {
    root: PathBuf,
}

impl MachineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn config_path(&self, name: &str) -> PathBuf {
        machine_dir(&self.root, name).join(CONFIG_FILE)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.config_path(name).is_file()
    }

    pub fn load(&self, name: &str) -> Result<MachineRecord> {
        let raw = match fs::read_to_string(self.config_path(name)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CliError::MachineNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the record atomically (temp file + rename).
    pub fn save(&self, record: &MachineRecord) -> Result<()> {
        let path = self.config_path(&record.driver.machine_name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Delete the machine directory, including its key files.
    pub fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_dir_all(machine_dir(&self.root, name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all stored machines, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.root.join("machines")) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str()
                && self.exists(name)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Machine names double as hostnames and remote key names.
pub fn validate_machine_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(CliError::InvalidName(name.to_string()))
    }
}
