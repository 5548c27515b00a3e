use std::path::PathBuf;

use foam_core::{LaunchError, LaunchHandle, LaunchRequest, Launcher, OutputSink};
use foam_model::LaunchMode;
use tokio::process::Command;
use tracing::trace;

use super::{ProcConfig, prepare_native, spawn_supervised};
use crate::error::ExecError;

/// Launcher for [`LaunchMode::Shell`]: runs the command line through `sh -c` / `cmd /C`.
pub struct ShellLauncher {
    name: &'static str,
    cfg: ProcConfig,
    /// Environment script sourced before the command (e.g. an OpenFOAM `etc/bashrc`).
    source: Option<PathBuf>,
}

impl ShellLauncher {
    pub fn new(cfg: ProcConfig) -> Self {
        Self {
            name: "shell",
            cfg,
            source: None,
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_source(mut self, script: impl Into<PathBuf>) -> Self {
        self.source = Some(script.into());
        self
    }

    fn script(&self, command: &str) -> String {
        match &self.source {
            Some(rc) => format!(". '{}' && {command}", rc.display()),
            None => command.to_string(),
        }
    }
}

impl Launcher for ShellLauncher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, mode: LaunchMode) -> bool {
        matches!(mode, LaunchMode::Shell)
    }

    fn launch(&self, req: LaunchRequest, sink: OutputSink) -> Result<LaunchHandle, LaunchError> {
        if req.command.trim().is_empty() {
            return Err(ExecError::EmptyCommand.into());
        }
        let script = self.script(&req.command);

        cfg_if::cfg_if! {
            if #[cfg(target_family = "windows")] {
                let program = "cmd";
                let mut cmd = Command::new(program);
                cmd.arg("/C").arg(&script);
            } else {
                let program = "sh";
                let mut cmd = Command::new(program);
                cmd.arg("-c").arg(&script);
            }
        }
        prepare_native(&mut cmd, &req, &self.cfg)?;

        trace!(target: "foam.exec.shell", run_id = %req.run_id, %script, "spawn");
        Ok(spawn_supervised(cmd, program, req.stop, sink, self.cfg.grace, None)?)
    }
}
