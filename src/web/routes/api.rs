//! REST API route definitions.

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::web::handlers::{analysis, replay, traces};
use crate::web::state::WebAppState;

/// Build the API router with all REST endpoints.
pub fn api_routes() -> Router<WebAppState> {
    Router::new()
        // Trace library routes
        .route("/traces/upload", post(traces::upload_trace))
        .route("/traces", get(traces::list_traces))
        .route("/traces/{id}", get(traces::get_trace))
        .route("/traces/{id}/details", get(traces::get_trace_details))
        .route("/traces/{id}", delete(traces::delete_trace))
        // Replay routes
        .route("/replay/start", post(replay::start_replay))
        .route("/replay/tasks", get(replay::list_tasks))
        .route("/replay/tasks/{id}", get(replay::get_task))
        .route("/replay/tasks/{id}", delete(replay::delete_task))
        .route("/replay/tasks/{id}/stop", post(replay::stop_task))
        // Analysis routes
        .route("/analysis/analyze", post(analysis::start_analysis))
        .route("/analysis/jobs/{id}", get(analysis::get_job))
        .route("/analysis/{id}/statistics", get(analysis::get_statistics))
        .route("/analysis/{id}/attack-path", get(analysis::get_attack_path))
        .route("/analysis/{id}/timeline", get(analysis::get_timeline))
}
