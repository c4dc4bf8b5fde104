//! Analysis handlers for the recast web API.

use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::AnalysisJob;
use crate::trace::{AttackPathGraph, Statistics, TimelineBucket};
use crate::web::error::WebError;
use crate::web::state::WebAppState;

/// Request to analyze a trace
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub file_id: Uuid,
}

/// Response for an analysis job
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub file_id: Uuid,
    pub status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<AnalysisJob> for JobResponse {
    fn from(job: AnalysisJob) -> Self {
        Self {
            job_id: job.job_id,
            file_id: job.file_id,
            status: job.status.to_string(),
            error: job.error,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Map a trace id to its capture file on disk. Analysis only reads the
/// bytes; it never needs the rest of the trace record.
fn capture_path(state: &WebAppState, file_id: Uuid) -> Result<PathBuf, WebError> {
    let store = state
        .trace_store()
        .ok_or_else(|| WebError::Internal("Database not available".to_string()))?;
    store
        .resolve_path(file_id)?
        .ok_or_else(|| WebError::NotFound(format!("Trace {} not found", file_id)))
}

/// Kick off a background analysis of a trace.
pub async fn start_analysis(
    State(state): State<WebAppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<JobResponse>), WebError> {
    let path = capture_path(&state, req.file_id)?;
    let job = state.analysis().start_analysis(req.file_id, path);

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// Get the status of an analysis job.
pub async fn get_job(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, WebError> {
    let job = state
        .analysis()
        .get_job(id)
        .ok_or_else(|| WebError::NotFound(format!("Analysis job {} not found", id)))?;

    Ok(Json(job.into()))
}

/// Traffic statistics for a trace.
pub async fn get_statistics(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Statistics>, WebError> {
    let path = capture_path(&state, id)?;
    let analysis = state.analysis().full_analysis(id, &path).await?;
    Ok(Json(analysis.statistics))
}

/// Source/target communication graph for a trace.
pub async fn get_attack_path(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AttackPathGraph>, WebError> {
    let path = capture_path(&state, id)?;
    let analysis = state.analysis().full_analysis(id, &path).await?;
    Ok(Json(analysis.attack_path))
}

/// Per-second packet and byte timeline for a trace.
pub async fn get_timeline(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimelineBucket>>, WebError> {
    let path = capture_path(&state, id)?;
    let analysis = state.analysis().full_analysis(id, &path).await?;
    Ok(Json(analysis.timeline))
}
