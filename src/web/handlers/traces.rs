//! Trace library handlers for the recast web API.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::data::{TraceFile, TraceStore};
use crate::trace::{has_capture_extension, read_info, TraceDetails};
use crate::web::error::WebError;
use crate::web::state::WebAppState;

/// Response for a single trace
#[derive(Debug, Serialize)]
pub struct TraceResponse {
    pub file_id: Uuid,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub format: String,
    pub total_packets: u64,
    pub duration_secs: Option<f64>,
    pub created_at: String,
}

impl From<TraceFile> for TraceResponse {
    fn from(trace: TraceFile) -> Self {
        Self {
            file_id: trace.file_id,
            filename: trace.filename,
            size_bytes: trace.size_bytes,
            sha256: trace.sha256,
            format: trace.format.to_string(),
            total_packets: trace.total_packets,
            duration_secs: trace.duration_secs,
            created_at: trace.created_at.to_rfc3339(),
        }
    }
}

/// Response for listing traces
#[derive(Debug, Serialize)]
pub struct ListTracesResponse {
    pub traces: Vec<TraceResponse>,
}

fn require_store(state: &WebAppState) -> Result<&TraceStore, WebError> {
    state
        .trace_store()
        .ok_or_else(|| WebError::Internal("Database not available".to_string()))
}

/// Accept a capture upload and register it in the trace library.
pub async fn upload_trace(
    State(state): State<WebAppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TraceResponse>), WebError> {
    let store = require_store(&state)?;

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WebError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(|s| s.to_string())
                .ok_or_else(|| WebError::BadRequest("File field needs a filename".to_string()))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| WebError::BadRequest(format!("Failed to read upload: {}", e)))?;
            upload = Some((filename, bytes));
            break;
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| WebError::BadRequest("Multipart field 'file' is required".to_string()))?;

    if !has_capture_extension(&filename) {
        return Err(WebError::BadRequest(format!(
            "Unsupported file type: {} (expected .pcap, .pcapng or .cap)",
            filename
        )));
    }
    if bytes.is_empty() {
        return Err(WebError::BadRequest("Uploaded file is empty".to_string()));
    }

    let sha256: String = Sha256::digest(&bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    let file_id = Uuid::new_v4();
    let ext = std::path::Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "pcap".to_string());
    let path = state.uploads_dir().join(format!("{}.{}", file_id, ext));

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| WebError::Internal(format!("Failed to store upload: {}", e)))?;

    // Parse metadata off the async runtime; an unreadable capture is not
    // kept in the library
    let parse = tokio::task::spawn_blocking({
        let path = path.clone();
        move || read_info(&path)
    })
    .await;
    let info = match parse {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(WebError::BadRequest(format!("Not a readable capture: {}", e)));
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(WebError::Internal(format!("Metadata parse crashed: {}", e)));
        }
    };

    let mut trace = TraceFile::new(&filename, path, bytes.len() as u64, sha256, info.format);
    trace.file_id = file_id;
    trace.total_packets = info.total_packets;
    trace.duration_secs = info.duration_secs;

    if let Err(e) = store.create(&trace) {
        let _ = tokio::fs::remove_file(&trace.path).await;
        return Err(WebError::Database(e));
    }

    tracing::info!(
        "Trace {} uploaded: {} ({} packets)",
        trace.file_id,
        trace.filename,
        trace.total_packets
    );
    Ok((StatusCode::CREATED, Json(trace.into())))
}

/// List all traces in the library, newest first.
pub async fn list_traces(
    State(state): State<WebAppState>,
) -> Result<Json<ListTracesResponse>, WebError> {
    let store = require_store(&state)?;
    let traces = store.get_all()?;

    Ok(Json(ListTracesResponse {
        traces: traces.into_iter().map(Into::into).collect(),
    }))
}

/// Get a single trace by ID.
pub async fn get_trace(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TraceResponse>, WebError> {
    let store = require_store(&state)?;
    let trace = store
        .get_by_id(id)?
        .ok_or_else(|| WebError::NotFound(format!("Trace {} not found", id)))?;

    Ok(Json(trace.into()))
}

/// Protocol and endpoint breakdown computed from the stored payload.
pub async fn get_trace_details(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TraceDetails>, WebError> {
    let store = require_store(&state)?;
    let path = store
        .resolve_path(id)?
        .ok_or_else(|| WebError::NotFound(format!("Trace {} not found", id)))?;

    let details = state.analysis().details(&path).await?;
    Ok(Json(details))
}

/// Delete a trace: the record, its analysis state and the stored payload.
pub async fn delete_trace(
    State(state): State<WebAppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, WebError> {
    let store = require_store(&state)?;
    let trace = store
        .get_by_id(id)?
        .ok_or_else(|| WebError::NotFound(format!("Trace {} not found", id)))?;

    store.delete(id)?;
    state.analysis().forget_file(id);

    if let Err(e) = tokio::fs::remove_file(&trace.path).await {
        // The record is already gone; a stale payload only wastes disk
        tracing::warn!(
            "Failed to remove trace payload {}: {}",
            trace.path.display(),
            e
        );
    }

    Ok(StatusCode::NO_CONTENT)
}
