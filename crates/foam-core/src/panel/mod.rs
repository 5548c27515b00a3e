use std::{path::PathBuf, sync::Arc, time::Duration};

use foam_model::{LaunchMode, PanelConfig, RunId, RunInfo, RunState, StartSpec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    broadcast::{Broadcaster, DEFAULT_QUEUE_CAPACITY, Subscription},
    config::ConfigStore,
    error::CoreError,
    launcher::LaunchRequest,
    lifecycle::Notifier,
    metrics::{MetricsHandle, noop_metrics},
    registry::RunRegistry,
    router::LauncherRouter,
    runlog::{self, RunLog},
    sink::OutputSink,
    system,
};

/// Runtime settings of the control panel.
#[derive(Debug, Clone)]
pub struct PanelSettings {
    /// Parent of every run directory.
    pub runs_root: PathBuf,
    /// Terminal runs kept in memory.
    pub history: usize,
    /// Per-subscriber push queue length.
    pub queue_capacity: usize,
    /// Mode used when a start request names none.
    pub default_mode: LaunchMode,
    /// Container runtime CLI used for availability checks.
    pub docker_program: String,
    pub docker_check_timeout: Duration,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            runs_root: PathBuf::from("runs"),
            history: 32,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_mode: LaunchMode::Docker,
            docker_program: "docker".into(),
            docker_check_timeout: Duration::from_secs(5),
        }
    }
}

/// Orchestrates runs: registry, launchers, output fan-out and completion.
#[derive(Clone)]
pub struct ControlPanel {
    registry: RunRegistry,
    broadcaster: Broadcaster,
    router: Arc<LauncherRouter>,
    config: Arc<ConfigStore>,
    notifier: Notifier,
    metrics: MetricsHandle,
    settings: Arc<PanelSettings>,
}

impl ControlPanel {
    pub fn new(settings: PanelSettings, router: LauncherRouter, config: ConfigStore) -> Self {
        Self::with_metrics(settings, router, config, noop_metrics())
    }

    pub fn with_metrics(
        settings: PanelSettings,
        router: LauncherRouter,
        config: ConfigStore,
        metrics: MetricsHandle,
    ) -> Self {
        let registry = RunRegistry::with_history(settings.history);
        let broadcaster =
            Broadcaster::new(settings.queue_capacity).with_metrics(Arc::clone(&metrics));
        let notifier = Notifier::new(registry.clone(), broadcaster.clone(), Arc::clone(&metrics));

        Self {
            registry,
            broadcaster,
            router: Arc::new(router),
            config: Arc::new(config),
            notifier,
            metrics,
            settings: Arc::new(settings),
        }
    }

    /// Start a run.
    ///
    /// Returns the Running run. A launch failure leaves the run Failed (with
    /// its completion published) and is reported as [`CoreError::Launch`].
    pub async fn start(&self, spec: StartSpec) -> Result<RunInfo, CoreError> {
        let command = spec.command.trim();
        if command.is_empty() {
            return Err(CoreError::InvalidSpec("no command provided".into()));
        }

        let mode = spec.mode.unwrap_or(self.settings.default_mode);
        let cfg = self.config.snapshot();
        let case_dir = spec.case_dir.or_else(|| cfg.case_dir());
        if mode == LaunchMode::Docker && case_dir.is_none() {
            return Err(CoreError::InvalidSpec(
                "no case directory set; set one before running in docker".into(),
            ));
        }
        let image = spec
            .image
            .filter(|i| !i.trim().is_empty())
            .unwrap_or(cfg.docker_image);

        let run = self
            .registry
            .create_run(command, mode, &self.settings.runs_root)?;
        info!(target: "foam.core.panel", run_id = %run.run_id, %mode, command, "starting run");

        if let Err(e) = tokio::fs::create_dir_all(&run.run_dir).await {
            return Err(self
                .launch_failed(&run, format!("cannot create run directory: {e}"))
                .await);
        }
        if let Err(e) = runlog::write_record(&run).await {
            debug!(target: "foam.core.panel", run_id = %run.run_id, error = %e, "pending record not written");
        }
        if mode == LaunchMode::Docker
            && !system::docker_available(
                &self.settings.docker_program,
                self.settings.docker_check_timeout,
            )
            .await
        {
            return Err(self
                .launch_failed(&run, "docker is not available".into())
                .await);
        }

        let stop = CancellationToken::new();
        let mut sink = OutputSink::new(run.run_id.clone(), self.broadcaster.clone(), stop.clone())
            .with_metrics(Arc::clone(&self.metrics));
        match RunLog::create(&run).await {
            Ok(log) => sink = sink.with_log(log),
            Err(e) => {
                warn!(target: "foam.core.panel", run_id = %run.run_id, error = %e, "run log unavailable; streaming only")
            }
        }

        let req = LaunchRequest {
            run_id: run.run_id.clone(),
            command: command.to_string(),
            mode,
            image,
            openfoam_version: cfg.openfoam_version,
            case_dir,
            run_dir: run.run_dir.clone(),
            stop: stop.clone(),
        };

        let launched = self
            .router
            .pick(mode)
            .and_then(|launcher| launcher.launch(req, sink));
        let handle = match launched {
            Ok(handle) => handle,
            Err(e) => return Err(self.launch_failed(&run, e.to_string()).await),
        };

        self.registry.attach_stop(&run.run_id, stop)?;
        let running = self
            .registry
            .transition(&run.run_id, RunState::Running, None, None)?;
        if let Err(e) = runlog::write_record(&running).await {
            warn!(target: "foam.core.panel", run_id = %running.run_id, error = %e, "run record not written");
        }
        self.metrics.run_started(mode);
        info!(target: "foam.core.panel", run_id = %running.run_id, pid = ?handle.pid, "run started");

        self.notifier.watch(running.clone(), handle.exit);
        Ok(running)
    }

    async fn launch_failed(&self, run: &RunInfo, reason: String) -> CoreError {
        if let Err(e) = self.notifier.fail_launch(run, reason.clone()).await {
            warn!(target: "foam.core.panel", run_id = %run.run_id, error = %e, "could not mark run failed");
        }
        CoreError::Launch {
            run_id: run.run_id.clone(),
            reason,
        }
    }

    /// Request a stop. `Ok(false)` means a stop was already in progress.
    pub fn stop(&self, id: &RunId) -> Result<bool, CoreError> {
        let requested = self.registry.request_stop(id)?;
        if requested {
            info!(target: "foam.core.panel", run_id = %id, "stop requested");
        } else {
            debug!(target: "foam.core.panel", run_id = %id, "stop already in progress");
        }
        Ok(requested)
    }

    pub fn get(&self, id: &RunId) -> Option<RunInfo> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<RunInfo> {
        self.registry.list()
    }

    pub fn latest(&self) -> Option<RunInfo> {
        self.registry.latest()
    }

    pub fn active(&self) -> Option<RunInfo> {
        self.registry.active()
    }

    pub fn clear(&self, id: &RunId) -> Result<RunInfo, CoreError> {
        let run = self.registry.clear(id)?;
        debug!(target: "foam.core.panel", run_id = %id, "run cleared");
        Ok(run)
    }

    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn config(&self) -> PanelConfig {
        self.config.snapshot()
    }

    pub fn set_case_dir(&self, case_dir: &str) -> Result<PanelConfig, CoreError> {
        Ok(self.config.set_case_dir(case_dir)?)
    }

    pub fn set_docker(
        &self,
        image: Option<&str>,
        openfoam_version: Option<&str>,
    ) -> Result<PanelConfig, CoreError> {
        Ok(self.config.set_docker(image, openfoam_version)?)
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    pub fn modes(&self) -> Vec<LaunchMode> {
        self.router.modes()
    }

    /// Fail runs a previous server process left active.
    pub async fn recover(&self) -> Result<Vec<RunInfo>, CoreError> {
        let recovered = runlog::recover_orphans(&self.settings.runs_root).await?;
        for run in &recovered {
            warn!(target: "foam.core.panel", run_id = %run.run_id, "run marked failed after restart");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{ExitOutcome, LaunchError, LaunchHandle, Launcher};
    use foam_model::{LAUNCH_FAILED_EXIT_CODE, PushEvent, StreamKind};

    /// Prints fixed lines and exits with `code`.
    struct Scripted {
        lines: Vec<&'static str>,
        code: i32,
    }

    impl Launcher for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn supports(&self, _mode: LaunchMode) -> bool {
            true
        }

        fn launch(&self, _req: LaunchRequest, mut sink: OutputSink) -> Result<LaunchHandle, LaunchError> {
            let lines = self.lines.clone();
            let code = self.code;
            let exit = tokio::spawn(async move {
                for l in lines {
                    sink.emit(StreamKind::Stdout, l.to_string()).await;
                }
                sink.finish().await;
                ExitOutcome::exited(code)
            });
            Ok(LaunchHandle { pid: None, exit })
        }
    }

    /// Runs until stopped.
    struct Forever;

    impl Launcher for Forever {
        fn name(&self) -> &'static str {
            "forever"
        }

        fn supports(&self, _mode: LaunchMode) -> bool {
            true
        }

        fn launch(&self, req: LaunchRequest, mut sink: OutputSink) -> Result<LaunchHandle, LaunchError> {
            let exit = tokio::spawn(async move {
                sink.emit(StreamKind::Stdout, "Time = 0.005".into()).await;
                req.stop.cancelled().await;
                sink.emit(StreamKind::Stdout, "Time = 0.010".into()).await;
                sink.finish().await;
                ExitOutcome::signaled(15)
            });
            Ok(LaunchHandle { pid: None, exit })
        }
    }

    struct Broken;

    impl Launcher for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn supports(&self, _mode: LaunchMode) -> bool {
            true
        }

        fn launch(&self, _req: LaunchRequest, _sink: OutputSink) -> Result<LaunchHandle, LaunchError> {
            Err(LaunchError::Spawn("No such file or directory".into()))
        }
    }

    fn build(launcher: Arc<dyn Launcher>, dir: &tempfile::TempDir) -> ControlPanel {
        let settings = PanelSettings {
            runs_root: dir.path().join("runs"),
            default_mode: LaunchMode::Shell,
            ..Default::default()
        };
        let config = ConfigStore::load(dir.path().join("config.json"));
        ControlPanel::new(settings, LauncherRouter::new().with(launcher), config)
    }

    async fn collect_until_completion(sub: &mut Subscription) -> (Vec<String>, foam_model::CompletionEvent) {
        let mut lines = Vec::new();
        loop {
            match sub.recv().await.unwrap() {
                PushEvent::Output(l) => lines.push(l.text),
                PushEvent::Completion(c) => return (lines, c),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn lines_then_completion() {
        let dir = tempfile::tempdir().unwrap();
        let panel = build(
            Arc::new(Scripted {
                lines: vec!["A", "B"],
                code: 0,
            }),
            &dir,
        );
        let mut sub = panel.subscribe();

        let run = panel.start(StartSpec::new("  printf  ")).await.unwrap();
        assert_eq!(run.state, RunState::Running);
        assert_eq!(run.command, "printf");

        let (lines, done) = collect_until_completion(&mut sub).await;
        assert_eq!(lines, vec!["A", "B"]);
        assert_eq!(done.exit_code, 0);
        assert_eq!(done.state, RunState::Completed);

        let log = std::fs::read_to_string(&run.log_file).unwrap();
        assert!(log.contains("Command: printf"));
        assert!(log.contains("A\nB\n"));
        assert!(log.contains("exit code: 0"));
        assert!(panel.active().is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let panel = build(Arc::new(Forever), &dir);

        let first = panel.start(StartSpec::new("simpleFoam")).await.unwrap();
        match panel.start(StartSpec::new("icoFoam")).await {
            Err(CoreError::AlreadyRunning(id)) => assert_eq!(id, first.run_id),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        assert_eq!(panel.list().len(), 1);
        panel.stop(&first.run_id).unwrap();
    }

    #[tokio::test]
    async fn stop_drops_late_output() {
        let dir = tempfile::tempdir().unwrap();
        let panel = build(Arc::new(Forever), &dir);
        let mut sub = panel.subscribe();

        let run = panel.start(StartSpec::new("simpleFoam")).await.unwrap();
        match sub.recv().await.unwrap() {
            PushEvent::Output(l) => assert_eq!(l.text, "Time = 0.005"),
            other => panic!("unexpected {other:?}"),
        }

        assert!(panel.stop(&run.run_id).unwrap());
        assert!(!panel.stop(&run.run_id).unwrap_or(false));

        let (late, done) = collect_until_completion(&mut sub).await;
        assert!(late.is_empty());
        assert_eq!(done.state, RunState::Stopped);
        assert_eq!(done.exit_code, 143);

        assert!(matches!(
            panel.stop(&run.run_id),
            Err(CoreError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn launch_failure_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let panel = build(Arc::new(Broken), &dir);
        let mut sub = panel.subscribe();

        let err = panel.start(StartSpec::new("nope")).await.unwrap_err();
        let run_id = match err {
            CoreError::Launch { run_id, reason } => {
                assert!(reason.contains("No such file"));
                run_id
            }
            other => panic!("expected launch error, got {other:?}"),
        };

        let (lines, done) = collect_until_completion(&mut sub).await;
        assert!(lines.is_empty());
        assert_eq!(done.exit_code, LAUNCH_FAILED_EXIT_CODE);
        assert_eq!(done.state, RunState::Failed);

        let run = panel.get(&run_id).unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert!(panel.active().is_none());
    }

    #[tokio::test]
    async fn empty_command_and_docker_without_case_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let panel = build(Arc::new(Broken), &dir);

        assert!(matches!(
            panel.start(StartSpec::new("   ")).await,
            Err(CoreError::InvalidSpec(_))
        ));
        assert!(matches!(
            panel
                .start(StartSpec::new("blockMesh").with_mode(LaunchMode::Docker))
                .await,
            Err(CoreError::InvalidSpec(_))
        ));
        assert!(panel.list().is_empty());
    }

    fn docker_panel(program: &str, dir: &tempfile::TempDir) -> ControlPanel {
        let settings = PanelSettings {
            runs_root: dir.path().join("runs"),
            default_mode: LaunchMode::Docker,
            docker_program: program.into(),
            ..Default::default()
        };
        let config = ConfigStore::load(dir.path().join("config.json"));
        let scripted = Scripted {
            lines: vec!["Cannot connect to the Docker daemon"],
            code: 125,
        };
        ControlPanel::new(settings, LauncherRouter::new().with(Arc::new(scripted)), config)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreachable_docker_fails_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        // `false info` exits 1, like `docker info` with the daemon down.
        let panel = docker_panel("false", &dir);
        let mut sub = panel.subscribe();

        let err = panel
            .start(StartSpec::new("blockMesh").with_case_dir(dir.path()))
            .await
            .unwrap_err();
        let run_id = match err {
            CoreError::Launch { run_id, reason } => {
                assert_eq!(reason, "docker is not available");
                run_id
            }
            other => panic!("expected launch error, got {other:?}"),
        };

        let (lines, done) = collect_until_completion(&mut sub).await;
        assert!(lines.is_empty());
        assert_eq!(done.exit_code, LAUNCH_FAILED_EXIT_CODE);
        assert_eq!(done.state, RunState::Failed);
        assert_eq!(done.error.as_deref(), Some("docker is not available"));

        let run = panel.get(&run_id).unwrap();
        assert_eq!(run.state, RunState::Failed);
        let log = std::fs::read_to_string(&run.log_file).unwrap();
        assert!(log.contains("Error: docker is not available"));
        assert!(panel.active().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reachable_docker_launches() {
        let dir = tempfile::tempdir().unwrap();
        let panel = docker_panel("true", &dir);
        let mut sub = panel.subscribe();

        let run = panel
            .start(StartSpec::new("blockMesh").with_case_dir(dir.path()))
            .await
            .unwrap();
        assert_eq!(run.state, RunState::Running);
        assert_eq!(run.mode, LaunchMode::Docker);

        let (lines, done) = collect_until_completion(&mut sub).await;
        assert_eq!(lines, vec!["Cannot connect to the Docker daemon"]);
        assert_eq!(done.exit_code, 125);
    }

    #[tokio::test]
    async fn concurrent_starts_yield_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let panel = build(Arc::new(Forever), &dir);

        let attempts = (0..8).map(|i| {
            let panel = panel.clone();
            tokio::spawn(async move { panel.start(StartSpec::new(format!("cmd{i}"))).await })
        });
        let mut ok = Vec::new();
        for attempt in attempts.collect::<Vec<_>>() {
            match attempt.await.unwrap() {
                Ok(run) => ok.push(run),
                Err(CoreError::AlreadyRunning(_)) => {}
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert_eq!(ok.len(), 1);
        panel.stop(&ok[0].run_id).unwrap();
    }

    #[tokio::test]
    async fn recover_fails_leftover_records() {
        let dir = tempfile::tempdir().unwrap();
        let panel = build(Arc::new(Forever), &dir);
        let run = panel.start(StartSpec::new("simpleFoam")).await.unwrap();

        // A fresh panel over the same runs root sees the Running record.
        let other = build(Arc::new(Broken), &dir);
        let recovered = other.recover().await.unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].run_id, run.run_id);
        assert_eq!(recovered[0].state, RunState::Failed);
        assert_eq!(recovered[0].error.as_deref(), Some(runlog::RESTART_DIAGNOSTIC));
    }
}
