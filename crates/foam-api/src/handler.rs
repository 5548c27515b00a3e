use async_trait::async_trait;
use foam_core::Subscription;
use foam_model::{PanelConfig, RunId, RunInfo, StartSpec};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Coarse state reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    NotRunning,
    Running,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: StatusKind,
    /// Most recent run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    pub uptime_secs: u64,
}

impl StatusReport {
    pub fn from_latest(latest: Option<RunInfo>, uptime_secs: u64) -> Self {
        let (status, return_code) = match &latest {
            None => (StatusKind::NotRunning, None),
            Some(run) if run.state.is_active() => (StatusKind::Running, None),
            Some(run) => (StatusKind::Completed, run.exit_code),
        };
        Self {
            status,
            run: latest,
            return_code,
            uptime_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSpace {
    pub path: String,
    pub available_gb: f64,
}

/// Control-panel API handler.
///
/// Abstracts the backend so the HTTP layer can be driven by the provided
/// [`PanelApiAdapter`](crate::PanelApiAdapter) or by a custom implementation.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Start a run; fails if one is already active.
    async fn start_run(&self, spec: StartSpec) -> Result<RunInfo, ApiError>;

    /// Request a stop. `false` means a stop was already in progress.
    async fn stop_run(&self, id: &RunId) -> Result<bool, ApiError>;

    async fn get_run(&self, id: &RunId) -> Result<Option<RunInfo>, ApiError>;

    /// All known runs, newest first.
    async fn list_runs(&self) -> Result<Vec<RunInfo>, ApiError>;

    async fn clear_run(&self, id: &RunId) -> Result<RunInfo, ApiError>;

    async fn status(&self) -> Result<StatusReport, ApiError>;

    async fn docker_available(&self) -> bool;

    async fn disk_space(&self) -> Result<DiskSpace, ApiError>;

    /// Contents of a run log below the runs directory.
    async fn read_log(&self, path: &str) -> Result<String, ApiError>;

    async fn config(&self) -> Result<PanelConfig, ApiError>;

    async fn set_case_dir(&self, case_dir: &str) -> Result<PanelConfig, ApiError>;

    async fn set_docker(
        &self,
        image: Option<&str>,
        openfoam_version: Option<&str>,
    ) -> Result<PanelConfig, ApiError>;

    /// Case directories below the configured case root, relative to it.
    async fn list_cases(&self) -> Result<Vec<String>, ApiError>;

    /// Text exposition of metrics, if a backend exports any.
    fn metrics(&self) -> Option<String>;

    fn subscribe(&self) -> Subscription;

    fn active_run(&self) -> Option<RunId>;
}
