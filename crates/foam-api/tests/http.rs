use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use foam_api::{HttpApi, PanelApiAdapter};
use foam_core::{
    ConfigStore, ControlPanel, ExitOutcome, LaunchError, LaunchHandle, LaunchRequest, Launcher,
    LauncherRouter, OutputSink, PanelSettings,
};
use foam_model::{LaunchMode, StreamKind};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

/// Prints `lines` and exits 0, or waits for a stop when `lines` is empty.
struct Fake {
    lines: Vec<&'static str>,
}

impl Launcher for Fake {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supports(&self, mode: LaunchMode) -> bool {
        mode != LaunchMode::Direct
    }

    fn launch(&self, req: LaunchRequest, mut sink: OutputSink) -> Result<LaunchHandle, LaunchError> {
        let lines = self.lines.clone();
        let exit = tokio::spawn(async move {
            if lines.is_empty() {
                req.stop.cancelled().await;
                sink.finish().await;
                return ExitOutcome::signaled(15);
            }
            for l in lines {
                sink.emit(StreamKind::Stdout, l.to_string()).await;
            }
            sink.finish().await;
            ExitOutcome::exited(0)
        });
        Ok(LaunchHandle { pid: None, exit })
    }
}

fn app(dir: &TempDir, lines: Vec<&'static str>) -> Router {
    app_with_queue(dir, lines, 1024)
}

fn app_with_queue(dir: &TempDir, lines: Vec<&'static str>, queue_capacity: usize) -> Router {
    let settings = PanelSettings {
        runs_root: dir.path().join("runs"),
        default_mode: LaunchMode::Shell,
        queue_capacity,
        ..Default::default()
    };
    let router = LauncherRouter::new().with(Arc::new(Fake { lines }));
    let panel = ControlPanel::new(settings, router, ConfigStore::load(dir.path().join("config.json")));
    HttpApi::new(Arc::new(PanelApiAdapter::new(panel))).router()
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).into_owned(),
    ));
    (status, value)
}

/// Read SSE frames until the accumulated text contains `until`.
async fn read_events(body: &mut Body, until: &str) -> String {
    let mut text = String::new();
    while !text.contains(until) {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .unwrap_or_else(|_| panic!("no {until:?} within 5s, got: {text}"))
            .unwrap()
            .unwrap();
        if let Ok(data) = frame.into_data() {
            text.push_str(&String::from_utf8_lossy(&data));
        }
    }
    text
}

async fn wait_for_state(app: &Router, run_id: &str, state: &str) -> Value {
    for _ in 0..100 {
        let (status, run) = call(app, "GET", &format!("/api/v1/runs/{run_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        if run["state"] == state {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {run_id} never reached {state}");
}

#[tokio::test]
async fn start_then_complete() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec!["A", "B"]);

    let (status, body) = call(&app, "POST", "/api/v1/runs", Some(json!({"command": "printf"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = body["run_id"].as_str().unwrap().to_string();
    assert!(body["run_dir"].as_str().unwrap().ends_with(&run_id));

    let run = wait_for_state(&app, &run_id, "completed").await;
    assert_eq!(run["exit_code"], 0);

    let (_, status) = call(&app, "GET", "/api/v1/status", None).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["return_code"], 0);

    let (_, list) = call(&app, "GET", "/api/v1/runs", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let log_path = run["log_file"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/logs?path={}", log_path.replace('/', "%2F"));
    let (status, log) = call(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(log.as_str().unwrap().contains("A\nB\n"));

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", &format!("/api/v1/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn conflicting_start_and_stop_rules() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec![]);

    let (status, body) = call(&app, "POST", "/api/v1/runs", Some(json!({"command": "icoFoam"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, err) = call(&app, "POST", "/api/v1/runs", Some(json!({"command": "simpleFoam"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["status"], "error");
    assert_eq!(err["run_id"], run_id.as_str());

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, stop) = call(&app, "POST", &format!("/api/v1/runs/{run_id}/stop"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stop["success"], true);

    wait_for_state(&app, &run_id, "stopped").await;
    let (status, _) = call(&app, "POST", &format!("/api/v1/runs/{run_id}/stop"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, "POST", "/api/v1/runs/run_missing/stop", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn launch_failure_reports_run_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec!["x"]);

    let (status, err) = call(
        &app,
        "POST",
        "/api/v1/runs",
        Some(json!({"command": "nope", "mode": "direct"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let run_id = err["run_id"].as_str().unwrap();
    let run = wait_for_state(&app, run_id, "failed").await;
    assert_eq!(run["exit_code"], -1);

    let (status, _) = call(&app, "POST", "/api/v1/runs", Some(json!({"command": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec![]);

    let (_, cfg) = call(&app, "GET", "/api/v1/config", None).await;
    assert_eq!(cfg["openfoam_version"], "2412");
    assert_eq!(cfg["case_dir"], "");

    let (status, cfg) = call(
        &app,
        "POST",
        "/api/v1/config/docker",
        Some(json!({"openfoam_version": "2506"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cfg["openfoam_version"], "2506");

    let case_root = dir.path().join("cases");
    std::fs::create_dir_all(case_root.join("cavity/system")).unwrap();
    std::fs::create_dir_all(case_root.join("cavity/constant")).unwrap();
    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/config/case",
        Some(json!({"caseDir": case_root.to_str().unwrap()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, cases) = call(&app, "GET", "/api/v1/cases", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cases["cases"], json!(["cavity"]));

    // A fresh server over the same config file sees the saved values.
    let again = self::app(&dir, vec![]);
    let (_, cfg) = call(&again, "GET", "/api/v1/config", None).await;
    assert_eq!(cfg["openfoam_version"], "2506");
    assert_eq!(cfg["case_dir"], case_root.to_str().unwrap());

    let (status, _) = call(&app, "POST", "/api/v1/config/docker", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logs_outside_runs_root_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec![]);
    std::fs::create_dir_all(dir.path().join("runs")).unwrap();
    std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();

    let (status, _) = call(&app, "GET", "/api/v1/logs?path=..%2Fsecret.txt", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "GET", "/api/v1/logs", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disk_space_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec![]);

    let (status, space) = call(&app, "GET", "/api/v1/disk-space", None).await;
    if cfg!(unix) {
        assert_eq!(status, StatusCode::OK);
        assert!(space["available_gb"].as_f64().unwrap() >= 0.0);
    }

    // No metrics backend configured.
    let (status, _) = call(&app, "GET", "/api/v1/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_open_with_connected_greeting() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec![]);

    let resp = app
        .clone()
        .oneshot(Request::get("/api/v1/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let mut body = resp.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: connected"), "{text}");
    assert!(text.contains("retry: 3000"), "{text}");
    assert!(text.contains("\"session_id\""), "{text}");

    let resp = app
        .oneshot(
            Request::get("/api/v1/events")
                .header("last-event-id", "older-session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let frame = resp.into_body().frame().await.unwrap().unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: reconnected"), "{text}");
    assert!(text.contains("older-session"), "{text}");
}

#[tokio::test]
async fn events_carry_output_then_completion() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, vec!["Time = 0.005", "Time = 0.010"]);

    let resp = app
        .clone()
        .oneshot(Request::get("/api/v1/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut body = resp.into_body();
    read_events(&mut body, "event: connected").await;

    let (status, started) = call(&app, "POST", "/api/v1/runs", Some(json!({"command": "icoFoam"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let run_id = started["run_id"].as_str().unwrap();

    let text = read_events(&mut body, "event: simulation_complete").await;
    let first = text.find("\"data\":\"Time = 0.005\"").expect("first line");
    let second = text.find("\"data\":\"Time = 0.010\"").expect("second line");
    let done = text.find("event: simulation_complete").unwrap();
    assert!(first < second && second < done, "{text}");
    assert_eq!(text.matches("event: output").count(), 2, "{text}");

    let completion = text[done..]
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .expect("completion payload");
    let completion: Value = serde_json::from_str(completion).unwrap();
    assert_eq!(completion["run_id"], run_id);
    assert_eq!(completion["exit_code"], 0);
    assert_eq!(completion["state"], "completed");
}

#[tokio::test]
async fn slow_event_reader_gets_lag_notice() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with_queue(&dir, vec!["1", "2", "3", "4", "5"], 2);

    // The subscription exists from here on, but nothing is read yet.
    let resp = app
        .clone()
        .oneshot(Request::get("/api/v1/events").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let (_, started) = call(&app, "POST", "/api/v1/runs", Some(json!({"command": "icoFoam"}))).await;
    let run_id = started["run_id"].as_str().unwrap();
    wait_for_state(&app, run_id, "completed").await;

    let mut body = resp.into_body();
    let text = read_events(&mut body, "event: simulation_complete").await;
    let lagged = text.find("event: lagged").expect("lag notice");
    let last = text.find("\"data\":\"5\"").expect("newest line kept");
    assert!(lagged < last, "{text}");
    // The completion may land before or after the reader catches up.
    assert!(
        text.contains("\"skipped\":3") || text.contains("\"skipped\":4"),
        "{text}"
    );
    assert!(!text.contains("\"data\":\"1\""), "{text}");
}
