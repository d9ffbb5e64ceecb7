//! REST API for FlowLab sessions

mod page;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::postprocess::{self, Visualization, VisualizeError};
use crate::presentation;
use crate::session::{Session, SessionError, SessionStore};
use crate::solver::{JobState, SolverError, SolverJob, SolverSpec};
use crate::upload::{self, UploadError, UploadPolicy};
use crate::LabConfig;

/// API state
pub struct AppState {
    pub config: LabConfig,
    pub sessions: Arc<SessionStore>,
}

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("No mesh uploaded yet")]
    NoMesh,

    #[error("No visualization yet; run the post-processor first")]
    NoVisualization,

    #[error("The session is busy; wait for the solver or the current operation to finish")]
    Busy,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Visualize(#[from] VisualizeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_) | ApiError::NoVisualization => StatusCode::NOT_FOUND,
            ApiError::NoMesh => StatusCode::BAD_REQUEST,
            ApiError::Busy | ApiError::Solver(SolverError::AlreadyRunning) => StatusCode::CONFLICT,
            ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upload(_) => StatusCode::BAD_REQUEST,
            ApiError::Visualize(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Session(_) | ApiError::Solver(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::SessionNotFound(_) => "session_not_found",
            ApiError::NoMesh => "no_mesh",
            ApiError::NoVisualization => "no_visualization",
            ApiError::Busy | ApiError::Solver(SolverError::AlreadyRunning) => "busy",
            ApiError::Session(_) => "session",
            ApiError::Upload(_) => "upload_rejected",
            ApiError::Solver(_) => "launch_failed",
            ApiError::Visualize(e) => e.kind(),
            ApiError::Internal(_) => "internal",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "{}", self);
        } else {
            warn!(kind = self.kind(), "{}", self);
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub id: Uuid,
}

/// Summary of a finished post-processing run
#[derive(Debug, Serialize)]
pub struct VisualSummary {
    pub time: String,
    pub max_velocity: f64,
    /// Formatted for display, e.g. "3.00 m/s"
    pub max_velocity_text: String,
    pub has_body: bool,
    pub streamline_count: usize,
    pub asset_bytes: usize,
}

impl From<&Visualization> for VisualSummary {
    fn from(v: &Visualization) -> Self {
        Self {
            time: v.time.clone(),
            max_velocity: v.max_velocity,
            max_velocity_text: presentation::format_velocity(v.max_velocity),
            has_body: v.has_body,
            streamline_count: v.streamline_count,
            asset_bytes: v.glb.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub mesh_uploaded: bool,
    /// Latest job state, absent before the first run
    pub job: Option<JobState>,
    pub log_lines: usize,
    pub results_ready: bool,
    pub visualization: Option<VisualSummary>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub stored: String,
    pub bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub since: usize,
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub lines: Vec<String>,
    pub next: usize,
    pub dropped: usize,
    pub job: Option<JobState>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(session_status).delete(delete_session))
        .route("/sessions/{id}/mesh", put(upload_mesh))
        .route("/sessions/{id}/run", post(start_run))
        .route("/sessions/{id}/cancel", post(cancel_run))
        .route("/sessions/{id}/log", get(read_log))
        .route("/sessions/{id}/visualize", post(run_visualize))
        .route("/sessions/{id}/viewer", get(viewer_fragment))
        .route("/sessions/{id}/asset.glb", get(download_asset))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn find_session(state: &AppState, id: Uuid) -> Result<Arc<Session>, ApiError> {
    state.sessions.get(&id).ok_or(ApiError::SessionNotFound(id))
}

async fn index_page() -> Html<&'static str> {
    Html(page::INDEX_HTML)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.sessions.len(),
    })
}

async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let sessions = Arc::clone(&state.sessions);
    let session = tokio::task::spawn_blocking(move || sessions.create())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok((StatusCode::CREATED, Json(SessionCreated { id: session.id })))
}

async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatus>, ApiError> {
    let session = find_session(&state, id)?;
    let (job, log_lines) = match session.job.lock().await.as_ref() {
        Some(job) => (Some(job.state()), job.line_count()),
        None => (None, 0),
    };
    let visualization = session
        .visualization
        .lock()
        .await
        .as_deref()
        .map(VisualSummary::from);

    Ok(Json(SessionStatus {
        id,
        mesh_uploaded: upload::has_mesh(&session.case_dir, &state.config.case.mesh_path),
        job,
        log_lines,
        results_ready: postprocess::marker_present(&session.case_dir, &state.config.case),
        visualization,
    }))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

async fn upload_mesh(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let session = find_session(&state, id)?;
    let _operation = session.try_begin_operation().ok_or(ApiError::Busy)?;
    if session.job.lock().await.as_ref().is_some_and(|j| j.is_running()) {
        return Err(ApiError::Busy);
    }

    let policy = UploadPolicy::new(&state.config.case, state.config.max_upload_bytes);
    let case_dir = session.case_dir.clone();
    let mesh_path = state.config.case.mesh_path.clone();
    let bytes = body.len();

    let stored = tokio::task::spawn_blocking(move || {
        upload::store_mesh(&case_dir, &mesh_path, &query.filename, &body, &policy)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(UploadResponse {
        stored: stored.display().to_string(),
        bytes,
    }))
}

async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobState>), ApiError> {
    let session = find_session(&state, id)?;
    let _operation = session.try_begin_operation().ok_or(ApiError::Busy)?;
    let mut slot = session.job.lock().await;
    if slot.as_ref().is_some_and(|j| j.is_running()) {
        return Err(SolverError::AlreadyRunning.into());
    }
    if !upload::has_mesh(&session.case_dir, &state.config.case.mesh_path) {
        return Err(ApiError::NoMesh);
    }

    // Results from an earlier run must not satisfy the completion check
    let marker = session.case_dir.join(&state.config.case.marker_file);
    if marker.exists()
        && let Err(e) = std::fs::remove_file(&marker)
    {
        warn!(session = %id, "Failed to clear stale marker: {}", e);
    }
    session.visualization.lock().await.take();

    let spec = SolverSpec::from_config(&state.config.solver, &session.case_dir);
    let job = SolverJob::spawn(spec)?;
    info!(session = %id, "Solver run started");
    *slot = Some(job);

    Ok((StatusCode::ACCEPTED, Json(JobState::Running)))
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let session = find_session(&state, id)?;
    let cancelled = session.cancel_job().await;
    if cancelled {
        info!(session = %id, "Solver run cancelled");
    }
    Ok(Json(CancelResponse { cancelled }))
}

async fn read_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogResponse>, ApiError> {
    let session = find_session(&state, id)?;
    let response = match session.job.lock().await.as_ref() {
        Some(job) => {
            let slice = job.lines_since(query.since);
            LogResponse {
                lines: slice.lines,
                next: slice.next,
                dropped: slice.dropped,
                job: Some(job.state()),
            }
        }
        None => LogResponse {
            lines: Vec::new(),
            next: 0,
            dropped: 0,
            job: None,
        },
    };
    Ok(Json(response))
}

async fn run_visualize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VisualSummary>, ApiError> {
    let session = find_session(&state, id)?;
    // Held until the result is stored, so a run cannot start underneath
    let _operation = session.try_begin_operation().ok_or(ApiError::Busy)?;
    if session.job.lock().await.as_ref().is_some_and(|j| j.is_running()) {
        return Err(ApiError::Busy);
    }

    let case_dir = session.case_dir.clone();
    let visual = state.config.visual.clone();
    let case = state.config.case.clone();
    let result =
        tokio::task::spawn_blocking(move || postprocess::visualize(&case_dir, &visual, &case))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

    let visualization = Arc::new(result?);
    let summary = VisualSummary::from(visualization.as_ref());
    *session.visualization.lock().await = Some(visualization);
    Ok(Json(summary))
}

async fn latest_visualization(session: &Session) -> Result<Arc<Visualization>, ApiError> {
    session
        .visualization
        .lock()
        .await
        .clone()
        .ok_or(ApiError::NoVisualization)
}

async fn viewer_fragment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, ApiError> {
    let session = find_session(&state, id)?;
    let visualization = latest_visualization(&session).await?;
    Ok(Html(presentation::viewer_fragment(&visualization, &state.config.viewer)))
}

async fn download_asset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, id)?;
    let visualization = latest_visualization(&session).await?;
    let disposition = presentation::download_disposition(&state.config.case.download_name);

    Ok((
        [
            (header::CONTENT_TYPE, "model/gltf-binary".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        visualization.glb.clone(),
    )
        .into_response())
}
