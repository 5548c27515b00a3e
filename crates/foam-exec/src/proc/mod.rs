use std::{process::Stdio, time::Duration};

use foam_core::{
    ExitOutcome, LaunchError, LaunchHandle, LaunchRequest, Launcher, OutputSink,
};
use foam_model::{LaunchMode, StreamKind};
use tokio::{process::Command, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::{ExecError, ExecResult},
    reader::pump,
    util::{DEFAULT_GRACE, exit_outcome, kill_graceful},
    utils::limits::{ResourceLimits, attach_rlimits},
};

const LINE_QUEUE: usize = 256;

/// Settings shared by the native launchers.
#[derive(Clone, Debug)]
pub struct ProcConfig {
    /// Time between SIGTERM and SIGKILL on stop.
    pub grace: Duration,
    pub limits: ResourceLimits,
    /// Extra environment for every run.
    pub env: Vec<(String, String)>,
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            grace: DEFAULT_GRACE,
            limits: ResourceLimits::default(),
            env: Vec::new(),
        }
    }
}

/// Launcher for [`LaunchMode::Direct`]: program plus whitespace-split args, no shell.
pub struct ProcLauncher {
    name: &'static str,
    cfg: ProcConfig,
}

impl ProcLauncher {
    pub fn new(cfg: ProcConfig) -> Self {
        Self { name: "proc", cfg }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl Launcher for ProcLauncher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, mode: LaunchMode) -> bool {
        matches!(mode, LaunchMode::Direct)
    }

    fn launch(&self, req: LaunchRequest, sink: OutputSink) -> Result<LaunchHandle, LaunchError> {
        let mut parts = req.command.split_whitespace();
        let program = parts.next().ok_or(ExecError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(parts);
        prepare_native(&mut cmd, &req, &self.cfg)?;

        trace!(target: "foam.exec.proc", run_id = %req.run_id, program, "spawn");
        Ok(spawn_supervised(cmd, program, req.stop, sink, self.cfg.grace, None)?)
    }
}

/// Working directory, env and limits common to native runs.
pub(crate) fn prepare_native(
    cmd: &mut Command,
    req: &LaunchRequest,
    cfg: &ProcConfig,
) -> ExecResult<()> {
    let work_dir = req.work_dir();
    if !work_dir.is_dir() {
        return Err(ExecError::WorkDir(work_dir.to_path_buf()));
    }
    cmd.current_dir(work_dir);
    cmd.env("FOAMPANEL_RUN_ID", req.run_id.as_str());
    cmd.env("FOAMPANEL_RUN_DIR", &req.run_dir);
    for (k, v) in &cfg.env {
        cmd.env(k, v);
    }
    attach_rlimits(cmd, &cfg.limits);
    Ok(())
}

/// Command run after a stopped process is gone (e.g. container removal).
#[derive(Clone, Debug)]
pub(crate) struct Cleanup {
    pub program: String,
    pub args: Vec<String>,
}

impl Cleanup {
    async fn run(&self) {
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match tokio::time::timeout(Duration::from_secs(30), status).await {
            Ok(Ok(s)) if s.success() => {
                debug!(target: "foam.exec.proc", program = %self.program, args = ?self.args, "cleanup done")
            }
            Ok(Ok(s)) => {
                warn!(target: "foam.exec.proc", program = %self.program, args = ?self.args, status = %s, "cleanup failed")
            }
            Ok(Err(e)) => {
                warn!(target: "foam.exec.proc", program = %self.program, error = %e, "cleanup did not start")
            }
            Err(_) => {
                warn!(target: "foam.exec.proc", program = %self.program, "cleanup timed out")
            }
        }
    }
}

/// Spawn `cmd` as a process-group leader with piped output and supervise it.
///
/// The returned handle resolves after the process is reaped and every line
/// it printed went through `sink`.
pub(crate) fn spawn_supervised(
    mut cmd: Command,
    program: &str,
    stop: CancellationToken,
    sink: OutputSink,
    grace: Duration,
    cleanup: Option<Cleanup>,
) -> ExecResult<LaunchHandle> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
        program: program.to_string(),
        reason: e.to_string(),
    })?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel(LINE_QUEUE);
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump(stdout, StreamKind::Stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump(stderr, StreamKind::Stderr, tx.clone())));
    }
    drop(tx);

    let exit = tokio::spawn(supervise(child, rx, pumps, sink, stop, grace, cleanup));
    Ok(LaunchHandle { pid, exit })
}

async fn supervise(
    mut child: tokio::process::Child,
    mut lines: mpsc::Receiver<(StreamKind, String)>,
    pumps: Vec<JoinHandle<()>>,
    mut sink: OutputSink,
    stop: CancellationToken,
    grace: Duration,
    cleanup: Option<Cleanup>,
) -> ExitOutcome {
    let run_id = sink.run_id().clone();

    // Forward output until both pipes close or a stop arrives.
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            line = lines.recv() => match line {
                Some((stream, text)) => {
                    sink.emit(stream, text).await;
                }
                None => break,
            },
        }
    }

    let status = if stop.is_cancelled() {
        debug!(target: "foam.exec.proc", %run_id, "stop requested; terminating");
        kill_graceful(&mut child, grace).await
    } else {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                debug!(target: "foam.exec.proc", %run_id, "stop requested after output closed; terminating");
                kill_graceful(&mut child, grace).await
            }
            status = child.wait() => status,
        }
    };

    if stop.is_cancelled() {
        for p in &pumps {
            p.abort();
        }
        if let Some(cleanup) = &cleanup {
            cleanup.run().await;
        }
    }

    let outcome = match status {
        Ok(status) => exit_outcome(status),
        Err(e) => ExitOutcome::lost(format!("wait failed: {e}")),
    };
    let published = sink.finish().await;
    debug!(
        target: "foam.exec.proc",
        %run_id,
        exit_code = outcome.exit_code(),
        published,
        "process reaped"
    );
    outcome
}

#[cfg(feature = "shell")]
pub mod shell;
