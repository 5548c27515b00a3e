use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use foam_core::{LaunchError, LaunchHandle, LaunchRequest, Launcher, OutputSink};
use foam_model::LaunchMode;
use tokio::process::Command;
use tracing::{debug, info, trace};

use crate::{
    error::{ExecError, ExecResult},
    proc::{Cleanup, spawn_supervised},
    util::DEFAULT_GRACE,
    utils::limits::ResourceLimits,
};

/// Label put on every container the panel starts; its value is the run id.
pub const RUN_LABEL: &str = "foampanel.run";

/// Mount point of the case directory inside the container.
pub const CASE_MOUNT: &str = "/case";

#[derive(Clone, Debug)]
pub struct DockerConfig {
    /// Container runtime CLI.
    pub program: String,
    /// Time between SIGTERM and SIGKILL of the CLI client on stop.
    pub grace: Duration,
    pub limits: ResourceLimits,
    /// Run as the host uid:gid so files written to the case stay owned by the user.
    pub map_user: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            program: "docker".into(),
            grace: DEFAULT_GRACE,
            limits: ResourceLimits::container_default(),
            map_user: false,
        }
    }
}

/// Launcher for [`LaunchMode::Docker`]: `docker run` with the case mounted at `/case`.
pub struct DockerLauncher {
    cfg: DockerConfig,
}

impl DockerLauncher {
    pub fn new(cfg: DockerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DockerConfig {
        &self.cfg
    }
}

/// Container name for a run.
pub fn container_name(run_id: &str) -> String {
    format!("foampanel-{run_id}")
}

/// Shell script run inside the container: source the OpenFOAM environment, enter the case, run.
pub fn container_script(openfoam_version: &str, command: &str) -> String {
    format!(
        "source /usr/lib/openfoam/openfoam{v}/etc/bashrc 2>/dev/null || source /opt/openfoam{v}/etc/bashrc; cd {CASE_MOUNT} && {command}",
        v = openfoam_version
    )
}

/// Full `docker run` argument list for `req`, with `case_dir` as the mounted case.
pub fn build_args(cfg: &DockerConfig, req: &LaunchRequest, case_dir: &Path) -> Vec<String> {
    let run_id = req.run_id.as_str();
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        container_name(run_id),
        "--label".to_string(),
        format!("{RUN_LABEL}={run_id}"),
        "-v".to_string(),
        format!("{}:{CASE_MOUNT}", case_dir.display()),
        "-w".to_string(),
        CASE_MOUNT.to_string(),
        "-e".to_string(),
        "FOAM_USER_RUN=/tmp".to_string(),
        "-e".to_string(),
        format!(
            "WM_PROJECT_DIR=/usr/lib/openfoam/openfoam{}",
            req.openfoam_version
        ),
    ];
    args.extend(cfg.limits.docker_args());
    if let Some(user) = cfg.map_user.then(host_user).flatten() {
        args.push("--user".to_string());
        args.push(user);
    }
    args.push(req.image.clone());
    args.push("bash".to_string());
    args.push("-c".to_string());
    args.push(container_script(&req.openfoam_version, &req.command));
    args
}

#[cfg(unix)]
fn host_user() -> Option<String> {
    // SAFETY: getuid/getgid cannot fail and touch no memory.
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    Some(format!("{uid}:{gid}"))
}

#[cfg(not(unix))]
fn host_user() -> Option<String> {
    None
}

fn absolute_case(req: &LaunchRequest) -> ExecResult<PathBuf> {
    let case_dir = req.case_dir.as_deref().ok_or(ExecError::MissingCaseDir)?;
    if !case_dir.is_dir() {
        return Err(ExecError::WorkDir(case_dir.to_path_buf()));
    }
    Ok(std::path::absolute(case_dir)?)
}

impl Launcher for DockerLauncher {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn supports(&self, mode: LaunchMode) -> bool {
        matches!(mode, LaunchMode::Docker)
    }

    fn launch(&self, req: LaunchRequest, sink: OutputSink) -> Result<LaunchHandle, LaunchError> {
        if req.command.trim().is_empty() {
            return Err(ExecError::EmptyCommand.into());
        }
        if !req.run_dir.is_dir() {
            return Err(ExecError::WorkDir(req.run_dir.clone()).into());
        }
        let case_dir = absolute_case(&req)?;
        let args = build_args(&self.cfg, &req, &case_dir);

        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&args).current_dir(&req.run_dir);

        let cleanup = Cleanup {
            program: self.cfg.program.clone(),
            args: vec![
                "rm".to_string(),
                "-f".to_string(),
                container_name(req.run_id.as_str()),
            ],
        };

        trace!(target: "foam.exec.docker", run_id = %req.run_id, image = %req.image, case = %case_dir.display(), "docker run");
        Ok(spawn_supervised(
            cmd,
            &self.cfg.program,
            req.stop,
            sink,
            self.cfg.grace,
            Some(cleanup),
        )?)
    }
}

/// Force-remove containers left behind by a previous server process.
///
/// Returns the number of containers removed.
pub async fn cleanup_orphan_containers(program: &str) -> ExecResult<usize> {
    let listed = Command::new(program)
        .args(["ps", "-aq", "--filter"])
        .arg(format!("label={RUN_LABEL}"))
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| ExecError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
    if !listed.status.success() {
        return Err(ExecError::Io(format!("{program} ps exited with {}", listed.status)));
    }

    let ids: Vec<String> = String::from_utf8_lossy(&listed.stdout)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        debug!(target: "foam.exec.docker", "no leftover containers");
        return Ok(0);
    }

    let status = Command::new(program)
        .arg("rm")
        .arg("-f")
        .args(&ids)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        return Err(ExecError::Io(format!("{program} rm exited with {status}")));
    }

    info!(target: "foam.exec.docker", removed = ids.len(), "leftover containers removed");
    Ok(ids.len())
}
