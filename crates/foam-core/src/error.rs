use foam_model::{RunId, RunState};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("a run is already active: {0}")]
    AlreadyRunning(RunId),

    #[error("run is not running: {0}")]
    NotRunning(RunId),

    #[error("unknown run: {0}")]
    UnknownRun(RunId),

    #[error("invalid transition for {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: RunId,
        from: RunState,
        to: RunState,
    },

    #[error("run is still active: {0}")]
    StillActive(RunId),

    #[error("launch failed for {run_id}: {reason}")]
    Launch { run_id: RunId, reason: String },

    #[error("invalid request: {0}")]
    InvalidSpec(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}
