//! Replay task handlers for the recast web API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::replay::{ReplayTask, StartRequest};
use crate::web::error::WebError;
use crate::web::state::WebAppState;

/// Request to start a replay
#[derive(Debug, Deserialize)]
pub struct StartReplayRequest {
    pub file_id: Uuid,
    pub target_address: Option<String>,
    pub speed_multiplier: Option<f64>,
    /// Sandboxed execution is the only supported mode; omit or pass true
    pub use_sandbox: Option<bool>,
}

/// Response when a replay was accepted
#[derive(Debug, Serialize)]
pub struct StartReplayResponse {
    pub task_id: Uuid,
    pub status: String,
    pub message: String,
}

/// Response for a single replay task
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: Uuid,
    pub file_id: Uuid,
    pub filename: String,
    pub mode: String,
    pub status: String,
    pub progress: u8,
    pub sent_packets: u64,
    pub total_packets: u64,
    pub target_address: Option<String>,
    pub speed_multiplier: f64,
    pub error: Option<String>,
    pub stop_requested: bool,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl From<ReplayTask> for TaskResponse {
    fn from(task: ReplayTask) -> Self {
        Self {
            task_id: task.task_id,
            file_id: task.file_id,
            filename: task.filename,
            mode: task.mode.to_string(),
            status: task.status.to_string(),
            progress: task.progress,
            sent_packets: task.sent_packets,
            total_packets: task.total_packets,
            target_address: task.target_address,
            speed_multiplier: task.speed_multiplier,
            error: task.error,
            stop_requested: task.stop_requested,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
            started_at: task.started_at.map(|t| t.to_rfc3339()),
            finished_at: task.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for listing replay tasks
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskResponse>,
}

/// Start replaying a trace against the sandbox.
pub async fn start_replay(
    State(state): State<WebAppState>,
    Json(req): Json<StartReplayRequest>,
) -> Result<(StatusCode, Json<StartReplayResponse>), WebError> {
    let store = state
        .trace_store()
        .ok_or_else(|| WebError::Internal("Database not available".to_string()))?;
    let trace = store
        .get_by_id(req.file_id)?
        .ok_or_else(|| WebError::NotFound(format!("Trace {} not found", req.file_id)))?;

    if let Some(speed) = req.speed_multiplier {
        if speed <= 0.0 || !speed.is_finite() {
            return Err(WebError::BadRequest(
                "speed_multiplier must be a positive number".to_string(),
            ));
        }
    }

    let request = StartRequest {
        target_address: req.target_address,
        speed_multiplier: req.speed_multiplier,
        use_sandbox: req.use_sandbox.unwrap_or(true),
    };
    let task = state.replay().start(&trace, request)?;

    Ok((
        StatusCode::CREATED,
        Json(StartReplayResponse {
            task_id: task.task_id,
            status: "started".to_string(),
            message: format!("Replay of {} started", trace.filename),
        }),
    ))
}

/// List all replay tasks, newest first.
pub async fn list_tasks(State(state): State<WebAppState>) -> Json<ListTasksResponse> {
    Json(ListTasksResponse {
        tasks: state.replay().list().into_iter().map(Into::into).collect(),
    })
}

/// Get the current record of one replay task.
pub async fn get_task(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskResponse>, WebError> {
    let task = state.replay().status(id)?;
    Ok(Json(task.into()))
}

/// Request cancellation of a running replay.
pub async fn stop_task(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskResponse>, WebError> {
    let task = state.replay().stop(id)?;
    Ok(Json(task.into()))
}

/// Remove a replay task record. Always acknowledges; a task that is
/// still running is halted by its supervisor.
pub async fn delete_task(State(state): State<WebAppState>, Path(id): Path<Uuid>) -> StatusCode {
    state.replay().delete(id);
    StatusCode::NO_CONTENT
}
