use std::sync::Arc;

use foam_model::LaunchMode;
use tracing::trace;

use crate::launcher::{LaunchError, Launcher};

/// Picks the launcher responsible for a launch mode.
#[derive(Default, Clone)]
pub struct LauncherRouter {
    launchers: Vec<Arc<dyn Launcher>>,
}

impl LauncherRouter {
    #[inline]
    pub fn new() -> Self {
        Self {
            launchers: Vec::new(),
        }
    }

    /// Register a launcher. Earlier registrations win when several support a mode.
    #[inline]
    pub fn register(&mut self, launcher: Arc<dyn Launcher>) {
        self.launchers.push(launcher);
    }

    #[inline]
    pub fn with(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.register(launcher);
        self
    }

    pub fn pick(&self, mode: LaunchMode) -> Result<&Arc<dyn Launcher>, LaunchError> {
        let launcher = self
            .launchers
            .iter()
            .find(|l| l.supports(mode))
            .ok_or(LaunchError::Unsupported(mode))?;
        trace!(target: "foam.core.router", launcher = launcher.name(), %mode, "launcher picked");
        Ok(launcher)
    }

    pub fn modes(&self) -> Vec<LaunchMode> {
        [LaunchMode::Docker, LaunchMode::Shell, LaunchMode::Direct]
            .into_iter()
            .filter(|m| self.launchers.iter().any(|l| l.supports(*m)))
            .collect()
    }
}
