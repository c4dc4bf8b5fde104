//! Axum web server implementation for recast.

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::routes::api::api_routes;
use super::state::WebAppState;
use crate::config::ServerSettings;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint handler.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the Axum router with all routes.
pub fn build_router(state: WebAppState, cors_permissive: bool) -> Router {
    // The UI is served from another origin during development
    let cors = if cors_permissive {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let core_routes = Router::new().route("/health", get(health));

    // Whole captures arrive through the upload endpoint; the multipart
    // default of 2 MB is far too small for them
    let upload_limit = state
        .config()
        .server
        .max_upload_mb
        .saturating_mul(1024 * 1024);

    Router::new()
        .nest("/api", core_routes.merge(api_routes()))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the web server.
///
/// This starts the Axum server and blocks until shutdown.
pub async fn run_server(state: WebAppState, settings: ServerSettings) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let app = build_router(state, settings.cors_permissive);

    tracing::info!("Starting web server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
