//! Integration tests for the HTTP API
//!
//! Complete flows over the real router: upload a capture, analyze it,
//! replay it against the mock sandbox, stop and delete. Each test builds
//! its own state on a throwaway database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::captures;
use recast::analysis::AnalysisManager;
use recast::config::{Config, ReplaySettings};
use recast::data::{AnalysisStore, Database, ReplayTaskStore, TraceStore};
use recast::replay::ReplayManager;
use recast::sandbox::{MockSandbox, MockSandboxConfig, SandboxGateway, ScriptedStatus};
use recast::web::{build_router, WebAppState};

/// Everything a test needs to drive the API and inspect side effects
struct TestServer {
    app: Router,
    uploads_dir: PathBuf,
    mock: Arc<MockSandbox>,
}

fn test_server_with(config: MockSandboxConfig) -> TestServer {
    let dir = tempfile::Builder::new()
        .prefix("recast-test-api-")
        .tempdir()
        .expect("Failed to create test data dir");
    let base = dir.path().to_path_buf();
    // Keep temp dir alive for test process lifetime.
    std::mem::forget(dir);

    let db = Database::open(base.join("recast.db")).expect("Failed to open database");
    let trace_store = TraceStore::new(db.connection());
    let task_store = ReplayTaskStore::new(Some(db.connection()));
    let analysis = AnalysisManager::new(Some(AnalysisStore::new(db.connection())));

    let mock = Arc::new(MockSandbox::new(config));
    let gateway: Arc<dyn SandboxGateway> = mock.clone();
    let settings = ReplaySettings {
        poll_interval_ms: 10,
        watchdog_secs: 2,
        convert_timeout_secs: 30,
        rewrite_timeout_secs: 30,
        default_speed: 1.0,
    };
    let replay = ReplayManager::new(task_store, gateway, settings, "/tmp");

    let uploads_dir = base.join("uploads");
    std::fs::create_dir_all(&uploads_dir).expect("Failed to create uploads dir");

    let state = WebAppState::new(
        Config::default(),
        Some(trace_store),
        replay,
        analysis,
        uploads_dir.clone(),
    );
    TestServer {
        app: build_router(state, true),
        uploads_dir,
        mock,
    }
}

fn test_server() -> TestServer {
    test_server_with(MockSandboxConfig::default())
}

fn multipart_upload(filename: &str, payload: &[u8]) -> Request<Body> {
    let boundary = "recast-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/traces/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Poll a task endpoint until its status matches, with a bounded wait
async fn wait_task_status(app: &Router, uri: &str, wanted: &[&str]) -> Value {
    for _ in 0..500 {
        let (status, json) = send(app, get(uri)).await;
        assert_eq!(status, StatusCode::OK, "poll failed: {}", json);
        let current = json["status"].as_str().unwrap_or("").to_string();
        if wanted.contains(&current.as_str()) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("endpoint {} never reached {:?}", uri, wanted);
}

#[tokio::test]
async fn test_upload_replay_and_delete_lifecycle() {
    let server = test_server();

    // Upload a real three-packet capture
    let (status, trace) = send(
        &server.app,
        multipart_upload("incident.pcap", &captures::minimal_capture()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trace["filename"], "incident.pcap");
    assert_eq!(trace["total_packets"], 3);
    assert_eq!(trace["format"], "pcap");
    let file_id = trace["file_id"].as_str().unwrap().to_string();

    // Start a replay against it
    let (status, started) = send(
        &server.app,
        post_json("/api/replay/start", json!({ "file_id": file_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", started);
    assert_eq!(started["status"], "started");
    let task_id = started["task_id"].as_str().unwrap().to_string();

    // The scripted sandbox finishes the run
    let task_uri = format!("/api/replay/tasks/{}", task_id);
    let done = wait_task_status(&server.app, &task_uri, &["completed"]).await;
    assert_eq!(done["progress"], 100);
    assert_eq!(done["sent_packets"], done["total_packets"]);
    assert!(done["finished_at"].is_string());

    // The capture, runner and plan all went through the gateway
    assert_eq!(server.mock.uploads().len(), 3);

    // Delete the task record; a second delete still acks
    let (status, _) = send(&server.app, delete(&task_uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&server.app, get(&task_uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&server.app, delete(&task_uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_analysis_endpoints_serve_sections() {
    let server = test_server();

    let (status, trace) = send(
        &server.app,
        multipart_upload("scan.pcap", &captures::attack_capture()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let file_id = trace["file_id"].as_str().unwrap().to_string();

    // Kick off the background job and wait for it
    let (status, job) = send(
        &server.app,
        post_json("/api/analysis/analyze", json!({ "file_id": file_id })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = job["job_id"].as_str().unwrap().to_string();

    let job_uri = format!("/api/analysis/jobs/{}", job_id);
    let finished = wait_task_status(&server.app, &job_uri, &["completed", "failed"]).await;
    assert_eq!(finished["status"], "completed", "{}", finished);

    // Section endpoints serve from the stored snapshot
    let stats_uri = format!("/api/analysis/{}/statistics", file_id);
    let (status, stats) = send(&server.app, get(&stats_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_packets"], 10);
    assert_eq!(stats["top_talkers"][0]["ip"], "192.168.1.50");

    let graph_uri = format!("/api/analysis/{}/attack-path", file_id);
    let (status, graph) = send(&server.app, get(&graph_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 4);
    assert_eq!(graph["links"].as_array().unwrap().len(), 6);

    let timeline_uri = format!("/api/analysis/{}/timeline", file_id);
    let (status, timeline) = send(&server.app, get(&timeline_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(timeline.as_array().unwrap().len(), 7);

    // The per-trace breakdown is computed straight from the payload
    let details_uri = format!("/api/traces/{}/details", file_id);
    let (status, details) = send(&server.app, get(&details_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["protocols"]["IP"], 10);
    assert_eq!(details["protocols"]["TCP"], 8);
    assert_eq!(details["top_src_ips"][0]["ip"], "192.168.1.50");
}

#[tokio::test]
async fn test_stop_replay_through_api() {
    // Last scripted report repeats, so only a stop can end this replay
    let config = MockSandboxConfig::default().with_script(vec![
        ScriptedStatus::preparing(50),
        ScriptedStatus::running(10, 50),
        ScriptedStatus::running(25, 50),
    ]);
    let server = test_server_with(config);

    let (status, trace) = send(
        &server.app,
        multipart_upload("endless.pcap", &captures::minimal_capture()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let file_id = trace["file_id"].as_str().unwrap().to_string();

    let (_, started) = send(
        &server.app,
        post_json(
            "/api/replay/start",
            json!({ "file_id": file_id, "target_address": "10.0.0.99" }),
        ),
    )
    .await;
    let task_id = started["task_id"].as_str().unwrap().to_string();
    let task_uri = format!("/api/replay/tasks/{}", task_id);

    wait_task_status(&server.app, &task_uri, &["running"]).await;

    let stop_uri = format!("/api/replay/tasks/{}/stop", task_id);
    let (status, stopping) = send(&server.app, post_json(&stop_uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK, "{}", stopping);
    assert_eq!(stopping["stop_requested"], true);

    let done = wait_task_status(&server.app, &task_uri, &["stopped"]).await;
    assert_eq!(done["target_address"], "10.0.0.99");
    assert!(done["finished_at"].is_string());
    assert!(server.mock.stop_file_created());
}

#[tokio::test]
async fn test_delete_trace_removes_record_and_payload() {
    let server = test_server();

    let (status, trace) = send(
        &server.app,
        multipart_upload("ephemeral.pcap", &captures::minimal_capture()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let file_id = trace["file_id"].as_str().unwrap().to_string();

    // The payload landed under the uploads directory, named after its id
    let payload = server.uploads_dir.join(format!("{}.pcap", file_id));
    assert!(payload.exists());

    let trace_uri = format!("/api/traces/{}", file_id);
    let (status, _) = send(&server.app, delete(&trace_uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&server.app, get(&trace_uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!payload.exists(), "payload should be removed with the record");

    let (_, listed) = send(&server.app, get("/api/traces")).await;
    assert!(listed["traces"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_replay_start_validation() {
    let server = test_server();

    let (status, trace) = send(
        &server.app,
        multipart_upload("valid.pcap", &captures::minimal_capture()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let file_id = trace["file_id"].as_str().unwrap().to_string();

    // Zero and negative speeds are rejected before any task exists
    for speed in [0.0, -2.5] {
        let (status, body) = send(
            &server.app,
            post_json(
                "/api/replay/start",
                json!({ "file_id": file_id, "speed_multiplier": speed }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }

    // Direct (unsandboxed) execution is rejected
    let (status, body) = send(
        &server.app,
        post_json(
            "/api/replay/start",
            json!({ "file_id": file_id, "use_sandbox": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["details"].as_str().unwrap_or("").contains("sandbox"),
        "{}",
        body
    );

    let (_, tasks) = send(&server.app, get("/api/replay/tasks")).await;
    assert!(tasks["tasks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pcapng_upload_reports_format() {
    let server = test_server();

    let frame = captures::udp_frame([172, 16, 0, 1], [172, 16, 0, 2], 9999, 53);
    let bytes = captures::build_pcapng(&[frame.as_slice(), frame.as_slice()]);
    let (status, trace) = send(&server.app, multipart_upload("modern.pcapng", &bytes)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trace["format"], "pcapng");
    assert_eq!(trace["total_packets"], 2);
}
