use std::path::PathBuf;

use foam_core::LaunchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("empty command")]
    EmptyCommand,
    #[error("missing case directory")]
    MissingCaseDir,
    #[error("working directory does not exist: {}", .0.display())]
    WorkDir(PathBuf),
    #[error("spawn failed: {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("io error: {0}")]
    Io(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for LaunchError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::EmptyCommand | ExecError::MissingCaseDir => {
                LaunchError::InvalidRequest(e.to_string())
            }
            other => LaunchError::Spawn(other.to_string()),
        }
    }
}
