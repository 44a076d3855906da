use std::time::Duration;

use hubbench_core::ConfigError;
use hubbench_hub::{HubError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("response pagination structure is malformed")]
    MalformedPagination,
    #[error("pagination cursor did not advance past offset {offset}")]
    CursorStalled { offset: u64 },
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build trial scheduler: {0}")]
    Scheduler(#[source] std::io::Error),
    #[error("hub failed to start: {0}")]
    Hub(#[from] HubError),
    #[error("server at {url} not reachable after {waited:?}")]
    Unreachable { url: String, waited: Duration },
    #[error("failed to launch route proxy: {0}")]
    ProxySpawn(#[source] std::io::Error),
    #[error("failed to create trial scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
}

/// Any failure is fatal to its trial; nothing here is retried.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{kind} failure in trial worker: {message}")]
    Worker { kind: String, message: String },
}

impl TrialError {
    pub fn kind(&self) -> &str {
        match self {
            TrialError::Config(_) => "config",
            TrialError::Store(_) => "store",
            TrialError::Startup(_) => "startup",
            TrialError::Api(_) => "api",
            TrialError::Worker { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Trial(#[from] TrialError),
    #[error("sweep i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("trial worker protocol: {0}")]
    Protocol(#[from] serde_json::Error),
}
