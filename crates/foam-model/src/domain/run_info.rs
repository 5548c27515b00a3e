use std::{path::PathBuf, time::Duration, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::{LaunchMode, RunId, RunState, epoch_secs};

/// Snapshot of one run as tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    /// Unique run identifier.
    pub run_id: RunId,
    /// Current lifecycle state.
    pub state: RunState,
    /// Command line as submitted.
    pub command: String,
    /// How the command is executed.
    pub mode: LaunchMode,
    /// Directory holding the run's log and record.
    pub run_dir: PathBuf,
    /// Streamed output mirrored to disk.
    pub log_file: PathBuf,
    #[serde(with = "epoch_secs")]
    pub start_time: SystemTime,
    #[serde(
        default,
        with = "epoch_secs::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<SystemTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Diagnostic text for runs that failed outside the process itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub stop_requested: bool,
}

impl RunInfo {
    /// Wall time between start and end, or until now for active runs.
    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(SystemTime::now);
        end.duration_since(self.start_time).unwrap_or(Duration::ZERO)
    }
}
