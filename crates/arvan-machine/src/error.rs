#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Driver(#[from] arvan_driver::Error),

    #[error("machine {0:?} does not exist")]
    MachineNotFound(String),

    #[error("machine {0:?} already exists")]
    MachineExists(String),

    #[error("invalid machine name {0:?}: use letters, digits, '-' and '.', starting with a letter or digit")]
    InvalidName(String),

    #[error("machine {name:?} is managed by the {driver:?} driver")]
    WrongDriver { name: String, driver: String },

    #[error("cannot determine home directory, set MACHINE_STORAGE_PATH")]
    NoHomeDir,

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt machine config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
