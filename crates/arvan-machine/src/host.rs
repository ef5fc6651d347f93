use std::sync::Arc;

use arvan_driver::{ArvanDriver, BuildInfo, DriverOptions, MachineDriver, MachineState};
use tracing::{info, warn};

use crate::cli::{Command, CreateOptions};
use crate::error::{CliError, Result};
use crate::store::{MachineRecord, MachineStore, validate_machine_name};

/// Runs lifecycle commands against stored machines.
pub struct Host {
    store: MachineStore,
    build: BuildInfo,
}

impl Host {
    pub fn new(store: MachineStore, build: BuildInfo) -> Self {
        Self { store, build }
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Create { name, options } => self.create(&name, &options).await,
            Command::Start { name } => self.load(&name)?.start().await.map_err(Into::into),
            Command::Stop { name } => self.load(&name)?.stop().await.map_err(Into::into),
            Command::Restart { name } => self.load(&name)?.restart().await.map_err(Into::into),
            Command::Kill { name } => self.load(&name)?.kill().await.map_err(Into::into),
            Command::Rm { name, force } => self.remove(&name, force).await,
            Command::Status { name } => match self.load(&name)?.get_state().await {
                MachineState::Error(e) => Err(e.into()),
                state => {
                    println!("{state}");
                    Ok(())
                }
            },
            Command::Ip { name } => {
                println!("{}", self.load(&name)?.ip()?);
                Ok(())
            }
            Command::Url { name } => {
                println!("{}", self.load(&name)?.url()?);
                Ok(())
            }
            Command::Inspect { name } => {
                let record = self.store.load(&name)?;
                println!("{}", serde_json::to_string_pretty(&record.redacted())?);
                Ok(())
            }
            Command::Ls => self.list().await,
            Command::Flags => {
                self.print_flags();
                Ok(())
            }
            Command::Version => {
                println!("{} driver {}", self.build.driver_name, self.build.version);
                Ok(())
            }
        }
    }

    fn load(&self, name: &str) -> Result<ArvanDriver> {
        let record = self.store.load(name)?;
        if record.driver_name != self.build.driver_name {
            return Err(CliError::WrongDriver {
                name: name.to_string(),
                driver: record.driver_name,
            });
        }
        Ok(ArvanDriver::from_config(record.driver))
    }

    fn save(&self, driver: &ArvanDriver) -> Result<()> {
        self.store.save(&MachineRecord {
            driver_name: driver.driver_name().to_string(),
            driver: driver.config().clone(),
        })
    }

    async fn create(&self, name: &str, options: &CreateOptions) -> Result<()> {
        validate_machine_name(name)?;
        if self.store.exists(name) {
            return Err(CliError::MachineExists(name.to_string()));
        }

        let store = self.store.clone();
        let driver_name = self.build.driver_name;
        let mut driver = ArvanDriver::new(name, self.store.root()).with_checkpoint(Arc::new(
            move |config| {
                let record = MachineRecord {
                    driver_name: driver_name.to_string(),
                    driver: config.clone(),
                };
                if let Err(e) = store.save(&record) {
                    warn!(machine = %config.machine_name, error = %e, "failed to save create progress");
                }
            },
        ));
        let opts = DriverOptions::from_env(driver.create_flags(), options.explicit());
        driver.set_config_from_flags(&opts)?;

        info!(machine = %name, region = %driver.config().region, "creating machine");
        let created = driver.create().await;

        // Persist the final state, including a failed create, so it can still be removed.
        self.save(&driver)?;
        created?;

        println!("{name} is running at {}", driver.url()?);
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let driver = self.load(name)?;
        if let Err(e) = driver.remove().await {
            if !force {
                return Err(e.into());
            }
            warn!(machine = %name, error = %e, "remote removal failed, removing local state anyway");
        }

        self.store.remove(name)?;
        info!(machine = %name, "machine removed");
        Ok(())
    }

    async fn list(&self) -> Result<()> {
        println!("{:<24} {:<14} URL", "NAME", "STATE");
        for name in self.store.list()? {
            let driver = match self.load(&name) {
                Ok(driver) => driver,
                Err(e) => {
                    warn!(machine = %name, error = %e, "skipping unreadable machine");
                    continue;
                }
            };
            let state = driver.get_state().await;
            if let MachineState::Error(e) = &state {
                warn!(machine = %name, error = %e, "failed to fetch state");
            }
            let url = driver.url().unwrap_or_default();
            println!("{name:<24} {:<14} {url}", state.as_str());
        }
        Ok(())
    }

    fn print_flags(&self) {
        for f in arvan_driver::CREATE_FLAGS {
            let default = f.default.map(|d| format!(" (default: {d})")).unwrap_or_default();
            println!("--{:<24} {} [${}]{default}", f.name, f.usage, f.env_var);
        }
    }
}
