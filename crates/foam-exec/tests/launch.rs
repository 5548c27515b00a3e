#![cfg(unix)]

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use foam_core::{ConfigStore, ControlPanel, CoreError, LauncherRouter, PanelSettings, Subscription};
use foam_exec::{ProcConfig, ProcLauncher, ShellLauncher};
use foam_model::{
    CompletionEvent, LAUNCH_FAILED_EXIT_CODE, LaunchMode, OutputLine, PushEvent, RunState,
    StartSpec, StreamKind,
};
use tempfile::TempDir;

fn panel(dir: &TempDir) -> ControlPanel {
    let cfg = ProcConfig {
        grace: Duration::from_millis(500),
        ..Default::default()
    };
    let router = LauncherRouter::new()
        .with(Arc::new(ShellLauncher::new(cfg.clone())))
        .with(Arc::new(ProcLauncher::new(cfg)));
    let settings = PanelSettings {
        runs_root: dir.path().join("runs"),
        default_mode: LaunchMode::Shell,
        ..Default::default()
    };
    ControlPanel::new(settings, router, ConfigStore::load(dir.path().join("config.json")))
}

async fn drain(sub: &mut Subscription) -> (Vec<OutputLine>, CompletionEvent) {
    let wait = async {
        let mut lines = Vec::new();
        loop {
            match sub.recv().await.expect("broadcaster closed") {
                PushEvent::Output(line) => lines.push(line),
                PushEvent::Completion(done) => return (lines, done),
                other => panic!("unexpected event {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(20), wait)
        .await
        .expect("run did not complete")
}

fn texts(lines: &[OutputLine]) -> Vec<&str> {
    lines.iter().map(|l| l.text.as_str()).collect()
}

#[tokio::test]
async fn printf_lines_then_completion() {
    let dir = tempfile::tempdir().unwrap();
    let panel = panel(&dir);
    let mut sub = panel.subscribe();

    let run = panel.start(StartSpec::new(r"printf 'A\nB\n'")).await.unwrap();
    let (lines, done) = drain(&mut sub).await;

    assert_eq!(texts(&lines), vec!["A", "B"]);
    assert!(lines.iter().all(|l| l.run_id == run.run_id));
    assert_eq!(done.exit_code, 0);
    assert_eq!(done.state, RunState::Completed);
    assert_eq!(panel.get(&run.run_id).unwrap().state, RunState::Completed);
}

#[tokio::test]
async fn stderr_is_captured_separately() {
    let dir = tempfile::tempdir().unwrap();
    let panel = panel(&dir);
    let mut sub = panel.subscribe();

    panel
        .start(StartSpec::new("echo out; echo err 1>&2"))
        .await
        .unwrap();
    let (lines, done) = drain(&mut sub).await;

    assert_eq!(done.exit_code, 0);
    let err = lines.iter().find(|l| l.text == "err").unwrap();
    assert_eq!(err.stream, StreamKind::Stderr);
    let out = lines.iter().find(|l| l.text == "out").unwrap();
    assert_eq!(out.stream, StreamKind::Stdout);
}

#[tokio::test]
async fn nonzero_exit_fails() {
    let dir = tempfile::tempdir().unwrap();
    let panel = panel(&dir);
    let mut sub = panel.subscribe();

    let run = panel.start(StartSpec::new("echo partial; exit 3")).await.unwrap();
    let (lines, done) = drain(&mut sub).await;

    assert_eq!(texts(&lines), vec!["partial"]);
    assert_eq!(done.exit_code, 3);
    assert_eq!(done.state, RunState::Failed);
    assert_eq!(panel.get(&run.run_id).unwrap().exit_code, Some(3));
}

#[tokio::test]
async fn missing_executable_fails_launch() {
    let dir = tempfile::tempdir().unwrap();
    let panel = panel(&dir);
    let mut sub = panel.subscribe();

    let err = panel
        .start(StartSpec::new("foampanel-definitely-missing --flag").with_mode(LaunchMode::Direct))
        .await
        .unwrap_err();
    let run_id = match err {
        CoreError::Launch { run_id, reason } => {
            assert!(reason.contains("foampanel-definitely-missing"), "{reason}");
            run_id
        }
        other => panic!("expected launch error, got {other:?}"),
    };

    let (lines, done) = drain(&mut sub).await;
    assert!(lines.is_empty());
    assert_eq!(done.run_id, run_id);
    assert_eq!(done.exit_code, LAUNCH_FAILED_EXIT_CODE);
    assert!(done.error.is_some());

    let run = panel.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Failed);
    assert!(panel.active().is_none());
}

#[tokio::test]
async fn stop_soon_after_start() {
    let dir = tempfile::tempdir().unwrap();
    let panel = panel(&dir);
    let mut sub = panel.subscribe();

    let run = panel
        .start(StartSpec::new("while true; do echo tick; sleep 0.05; done"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(panel.stop(&run.run_id).unwrap());
    let stopped_at = SystemTime::now();

    let started = std::time::Instant::now();
    let (lines, done) = drain(&mut sub).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(done.state, RunState::Stopped);
    assert!(lines.iter().all(|l| l.timestamp <= stopped_at));
    assert!(matches!(panel.stop(&run.run_id), Err(CoreError::NotRunning(_))));

    // The slot is free again.
    let next = panel.start(StartSpec::new("true")).await.unwrap();
    let (_, done) = drain(&mut sub).await;
    assert_eq!(done.run_id, next.run_id);
}

#[tokio::test]
async fn log_file_mirrors_output() {
    let dir = tempfile::tempdir().unwrap();
    let panel = panel(&dir);
    let mut sub = panel.subscribe();

    let run = panel
        .start(StartSpec::new("echo 'Time = 0.005'; echo; echo 'End'"))
        .await
        .unwrap();
    drain(&mut sub).await;

    let log = std::fs::read_to_string(&run.log_file).unwrap();
    assert!(log.starts_with("Starting simulation at "));
    assert!(log.contains("Time = 0.005\nEnd\n"));
    assert!(log.contains("Process completed with exit code: 0"));
}
