use std::io;

use async_trait::async_trait;
use foam_core::{ControlPanel, Subscription, system};
use foam_model::{PanelConfig, RunId, RunInfo, StartSpec};

use crate::{
    error::ApiError,
    handler::{ApiHandler, DiskSpace, StatusReport},
};

/// Ready-to-use handler that delegates to a [`ControlPanel`].
pub struct PanelApiAdapter {
    panel: ControlPanel,
}

impl PanelApiAdapter {
    pub fn new(panel: ControlPanel) -> Self {
        Self { panel }
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }
}

fn io_error(what: &str, e: io::Error) -> ApiError {
    match e.kind() {
        io::ErrorKind::NotFound => ApiError::NotFound(format!("{what}: {e}")),
        io::ErrorKind::PermissionDenied => ApiError::Forbidden(format!("{what}: {e}")),
        _ => ApiError::Internal(format!("{what}: {e}")),
    }
}

#[async_trait]
impl ApiHandler for PanelApiAdapter {
    async fn start_run(&self, spec: StartSpec) -> Result<RunInfo, ApiError> {
        Ok(self.panel.start(spec).await?)
    }

    async fn stop_run(&self, id: &RunId) -> Result<bool, ApiError> {
        Ok(self.panel.stop(id)?)
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<RunInfo>, ApiError> {
        Ok(self.panel.get(id))
    }

    async fn list_runs(&self) -> Result<Vec<RunInfo>, ApiError> {
        Ok(self.panel.list())
    }

    async fn clear_run(&self, id: &RunId) -> Result<RunInfo, ApiError> {
        Ok(self.panel.clear(id)?)
    }

    async fn status(&self) -> Result<StatusReport, ApiError> {
        Ok(StatusReport::from_latest(
            self.panel.latest(),
            system::uptime_seconds(),
        ))
    }

    async fn docker_available(&self) -> bool {
        let settings = self.panel.settings();
        system::docker_available(&settings.docker_program, settings.docker_check_timeout).await
    }

    async fn disk_space(&self) -> Result<DiskSpace, ApiError> {
        let root = self.panel.settings().runs_root.clone();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error("runs directory", e))?;
        let bytes = system::available_space(&root).map_err(|e| io_error("disk space", e))?;
        Ok(DiskSpace {
            path: root.display().to_string(),
            available_gb: system::bytes_to_gb(bytes),
        })
    }

    async fn read_log(&self, path: &str) -> Result<String, ApiError> {
        if path.trim().is_empty() {
            return Err(ApiError::InvalidRequest("no log path provided".into()));
        }
        let resolved = system::resolve_log_path(&self.panel.settings().runs_root, path)
            .map_err(|e| io_error("log file", e))?;
        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|e| io_error("log file", e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn config(&self) -> Result<PanelConfig, ApiError> {
        Ok(self.panel.config())
    }

    async fn set_case_dir(&self, case_dir: &str) -> Result<PanelConfig, ApiError> {
        Ok(self.panel.set_case_dir(case_dir)?)
    }

    async fn set_docker(
        &self,
        image: Option<&str>,
        openfoam_version: Option<&str>,
    ) -> Result<PanelConfig, ApiError> {
        Ok(self.panel.set_docker(image, openfoam_version)?)
    }

    async fn list_cases(&self) -> Result<Vec<String>, ApiError> {
        let root = self
            .panel
            .config()
            .case_dir()
            .ok_or_else(|| ApiError::InvalidRequest("no case directory set".into()))?;
        let cases = tokio::task::spawn_blocking(move || system::discover_cases(&root))
            .await
            .map_err(|e| ApiError::Internal(format!("case scan failed: {e}")))?
            .map_err(|e| io_error("case root", e))?;
        Ok(cases.iter().map(|p| p.display().to_string()).collect())
    }

    fn metrics(&self) -> Option<String> {
        self.panel.metrics().render()
    }

    fn subscribe(&self) -> Subscription {
        self.panel.subscribe()
    }

    fn active_run(&self) -> Option<RunId> {
        self.panel.active().map(|r| r.run_id)
    }
}
