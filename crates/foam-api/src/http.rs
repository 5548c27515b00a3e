use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use foam_model::{RunId, StartSpec};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{error::ApiError, handler::ApiHandler, sse};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
    shutdown: CancellationToken,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Close open push channels when `token` is cancelled, so graceful shutdown can finish.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Build the axum router.
    ///
    /// Routes (all under `/api/v1`):
    /// - `POST /runs`, `GET /runs`, `GET|DELETE /runs/{id}`, `POST /runs/{id}/stop`
    /// - `GET /status`, `GET /docker-check`, `GET /disk-space`
    /// - `GET /events` - SSE push channel
    /// - `GET /logs?path=`
    /// - `GET /config`, `POST /config/case`, `POST /config/docker`, `GET /cases`
    /// - `GET /metrics`
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/runs", post(start_run::<H>).get(list_runs::<H>))
            .route("/api/v1/runs/{id}", get(get_run::<H>).delete(clear_run::<H>))
            .route("/api/v1/runs/{id}/stop", post(stop_run::<H>))
            .route("/api/v1/status", get(status::<H>))
            .route("/api/v1/docker-check", get(docker_check::<H>))
            .route("/api/v1/disk-space", get(disk_space::<H>))
            .route("/api/v1/events", get(events::<H>))
            .route("/api/v1/logs", get(read_log::<H>))
            .route("/api/v1/config", get(get_config::<H>))
            .route("/api/v1/config/case", post(set_case::<H>))
            .route("/api/v1/config/docker", post(set_docker::<H>))
            .route("/api/v1/cases", get(list_cases::<H>))
            .route("/api/v1/metrics", get(metrics::<H>))
            .layer(Extension(self.shutdown))
            .with_state(self.handler)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StartRunResponse {
    status: &'static str,
    run_id: String,
    run_dir: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StopRunResponse {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct DockerCheckResponse {
    running: bool,
}

#[derive(Debug, Deserialize)]
struct LogParams {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetCaseRequest {
    #[serde(alias = "caseDir")]
    case_dir: String,
}

#[derive(Debug, Deserialize)]
struct SetDockerRequest {
    #[serde(default, alias = "dockerImage")]
    docker_image: Option<String>,
    #[serde(default, alias = "openfoamVersion")]
    openfoam_version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CasesResponse {
    cases: Vec<String>,
}

fn run_id(raw: String) -> Result<RunId, ApiError> {
    let id = RunId::from(raw);
    if !id.is_path_safe() {
        return Err(ApiError::InvalidRequest(format!("invalid run id: {id}")));
    }
    Ok(id)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/runs
async fn start_run<H>(
    State(handler): State<Arc<H>>,
    Json(spec): Json<StartSpec>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    debug!(target: "foam.api", command = %spec.command, mode = ?spec.mode, "start requested");
    let run = handler.start_run(spec).await?;

    let response = StartRunResponse {
        status: "started",
        run_id: run.run_id.to_string(),
        run_dir: run.run_dir.display().to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/runs/{id}/stop
async fn stop_run<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let id = run_id(id)?;
    let requested = handler.stop_run(&id).await?;
    info!(target: "foam.api", run_id = %id, requested, "stop");

    let message = if requested {
        "stop requested"
    } else {
        "stop already in progress"
    };
    Ok(Json(StopRunResponse {
        success: true,
        message,
    }))
}

/// GET /api/v1/runs
async fn list_runs<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.list_runs().await?))
}

/// GET /api/v1/runs/{id}
async fn get_run<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let id = run_id(id)?;
    let run = handler
        .get_run(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("run {id}")))?;
    Ok(Json(run))
}

/// DELETE /api/v1/runs/{id}
async fn clear_run<H>(
    State(handler): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let id = run_id(id)?;
    Ok(Json(handler.clear_run(&id).await?))
}

/// GET /api/v1/status
async fn status<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.status().await?))
}

/// GET /api/v1/docker-check
async fn docker_check<H>(State(handler): State<Arc<H>>) -> impl IntoResponse
where
    H: ApiHandler,
{
    Json(DockerCheckResponse {
        running: handler.docker_available().await,
    })
}

/// GET /api/v1/disk-space
async fn disk_space<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.disk_space().await?))
}

/// GET /api/v1/events
///
/// Sends `connected` (or `reconnected` when `Last-Event-ID` names an earlier
/// session), the last completion summary if any, then live events.
async fn events<H>(
    State(handler): State<Arc<H>>,
    Extension(shutdown): Extension<CancellationToken>,
    headers: HeaderMap,
) -> impl IntoResponse
where
    H: ApiHandler,
{
    let previous = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let hello = sse::greeting(previous, handler.active_run());
    sse::into_sse(sse::push_stream(hello, handler.subscribe(), shutdown))
}

/// GET /api/v1/logs?path=
async fn read_log<H>(
    State(handler): State<Arc<H>>,
    Query(params): Query<LogParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let path = params
        .path
        .ok_or_else(|| ApiError::InvalidRequest("no log path provided".into()))?;
    let body = handler.read_log(&path).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

/// GET /api/v1/config
async fn get_config<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(handler.config().await?))
}

/// POST /api/v1/config/case
async fn set_case<H>(
    State(handler): State<Arc<H>>,
    Json(req): Json<SetCaseRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let cfg = handler.set_case_dir(&req.case_dir).await?;
    info!(target: "foam.api", case_dir = %cfg.case_dir, "case directory set");
    Ok(Json(cfg))
}

/// POST /api/v1/config/docker
async fn set_docker<H>(
    State(handler): State<Arc<H>>,
    Json(req): Json<SetDockerRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    if req.docker_image.is_none() && req.openfoam_version.is_none() {
        return Err(ApiError::InvalidRequest(
            "nothing to update: give docker_image and/or openfoam_version".into(),
        ));
    }
    let cfg = handler
        .set_docker(req.docker_image.as_deref(), req.openfoam_version.as_deref())
        .await?;
    info!(target: "foam.api", image = %cfg.docker_image, version = %cfg.openfoam_version, "docker settings updated");
    Ok(Json(cfg))
}

/// GET /api/v1/cases
async fn list_cases<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    Ok(Json(CasesResponse {
        cases: handler.list_cases().await?,
    }))
}

/// GET /api/v1/metrics
async fn metrics<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let body = handler
        .metrics()
        .ok_or_else(|| ApiError::NotFound("no metrics backend".into()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}
