use std::path::{Path, PathBuf};

use foam_model::{LAUNCH_FAILED_EXIT_CODE, LaunchMode, RunId};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sink::OutputSink;

/// Everything a launcher needs to start one run.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub run_id: RunId,
    pub command: String,
    pub mode: LaunchMode,
    /// Container image, used by the docker launcher.
    pub image: String,
    /// OpenFOAM version, selects the bashrc sourced inside the container.
    pub openfoam_version: String,
    pub case_dir: Option<PathBuf>,
    pub run_dir: PathBuf,
    /// Cancelled when a stop is requested for the run.
    pub stop: CancellationToken,
}

impl LaunchRequest {
    /// Directory the command runs in: the case directory when set, else the run directory.
    pub fn work_dir(&self) -> &Path {
        self.case_dir.as_deref().unwrap_or(&self.run_dir)
    }
}

/// Live process started by a launcher.
#[derive(Debug)]
pub struct LaunchHandle {
    pub pid: Option<u32>,
    /// Resolves once the process is reaped and all of its output was emitted.
    pub exit: JoinHandle<ExitOutcome>,
}

/// How a launched process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub error: Option<String>,
}

impl ExitOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            signal: Some(signal),
            ..Default::default()
        }
    }

    /// The process could not be waited on.
    pub fn lost(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Shell convention: the exit code, `128 + signal`, or the launch sentinel.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(sig)) => 128 + sig,
            (None, None) => LAUNCH_FAILED_EXIT_CODE,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid launch request: {0}")]
    InvalidRequest(String),

    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("no launcher for mode: {0}")]
    Unsupported(LaunchMode),
}

/// Starts external commands and streams their output into an [`OutputSink`].
///
/// `launch` must return as soon as the process exists; reading output and
/// waiting for exit happen on tasks owned by the returned handle.
pub trait Launcher: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn supports(&self, mode: LaunchMode) -> bool;

    fn launch(&self, req: LaunchRequest, sink: OutputSink) -> Result<LaunchHandle, LaunchError>;
}
