//! Error types for the command-line front end.

use std::path::PathBuf;

use tradegate_broker::BrokerError;

/// All errors that can occur while running a command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("target file error: {0}")]
    Target(String),

    #[error("failed to read target file {path}: {source}")]
    TargetRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse target JSON: {0}")]
    TargetParse(#[from] serde_json::Error),

    #[error("invalid order: {0}")]
    Order(String),

    #[error("plan has {count} orders, more than max_orders_per_run ({max})")]
    TooManyOrders { count: usize, max: usize },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    /// Process exit code: 0 for a user abort, 2 for input the user can fix,
    /// 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Aborted(_) => 0,
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::Target(_)
            | Error::TargetParse(_)
            | Error::Order(_)
            | Error::TooManyOrders { .. } => 2,
            Error::Broker(e) if e.is_user_error() => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
