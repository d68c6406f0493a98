//! End-to-end split flow over the HTTP surface, with a fake segmenter in
//! place of ffmpeg.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use vsplit_api::{create_router, ApiConfig, AppState};
use vsplit_engine::EngineConfig;
use vsplit_media::{EncodeProgress, MediaError, MediaResult, SegmentRequest, Segmenter};

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Segmenter that reports a fixed duration and writes stub fragments.
struct FakeSegmenter {
    duration: f64,
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
        if self.duration <= 0.0 {
            return Err(MediaError::InvalidVideo("no duration".into()));
        }
        Ok(self.duration)
    }

    async fn encode_segment(
        &self,
        request: &SegmentRequest,
        on_progress: Box<dyn Fn(EncodeProgress) + Send + 'static>,
    ) -> MediaResult<()> {
        on_progress(EncodeProgress {
            out_time_ms: ((request.end - request.start) * 1000.0) as i64,
            speed: 1.0,
            is_complete: true,
        });
        std::fs::write(&request.output, b"fragment-bytes")?;
        Ok(())
    }
}

/// Segmenter that never finishes probing; keeps a job running for as long
/// as a test needs a live stream.
struct StallingSegmenter;

#[async_trait]
impl Segmenter for StallingSegmenter {
    async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(0.0)
    }

    async fn encode_segment(
        &self,
        _request: &SegmentRequest,
        _on_progress: Box<dyn Fn(EncodeProgress) + Send + 'static>,
    ) -> MediaResult<()> {
        Ok(())
    }
}

fn test_app_with(root: &Path, segmenter: Arc<dyn Segmenter>) -> (Router, AppState) {
    let engine = EngineConfig {
        upload_root: root.join("uploads"),
        fragment_root: root.join("fragments"),
        ..Default::default()
    };
    let state = AppState::with_segmenter(ApiConfig::default(), engine, segmenter);
    (create_router(state.clone()), state)
}

fn test_app(root: &Path, duration: f64) -> (Router, AppState) {
    test_app_with(root, Arc::new(FakeSegmenter { duration }))
}

fn multipart_body(segment_duration: &str, file_bytes: &[u8]) -> Body {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"segment_duration\"\r\n\r\n\
             {segment_duration}\r\n\
             --{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"video\"; filename=\"clip.mp4\"\r\n\
             Content-Type: video/mp4\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file_bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn submit_request(segment_duration: &str, file_bytes: &[u8]) -> Request<Body> {
    Request::post("/api/split_video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart_body(segment_duration, file_bytes))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_full_split_flow() {
    let dir = tempfile::tempdir().unwrap();
    // 125s source at 60s fragments: 3 fragments, last one 5s
    let (app, _state) = test_app(dir.path(), 125.0);

    let response = app
        .clone()
        .oneshot(submit_request("60", b"not-really-a-video"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let submitted = json_body(response).await;
    let session_id = submitted["session_id"].as_str().unwrap().to_string();
    assert_eq!(
        submitted["progress_url"].as_str().unwrap(),
        format!("/api/progress/{session_id}")
    );

    // Drain the progress stream; it ends once the job is terminal
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stream = response.into_body().collect().await.unwrap().to_bytes();
    let stream = String::from_utf8_lossy(&stream);
    assert!(stream.contains("message: Processing fragment 1 of 3"));
    assert!(stream.contains("overall_progress: 100.0"));
    assert!(stream.contains("fragments: ["));
    assert!(stream.contains(&format!("/fragments/{session_id}/fragment_3.mp4")));
    assert!(!stream.contains("error:"));

    // A late reconnect gets the terminal state replayed, not a 409
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let replay = response.into_body().collect().await.unwrap().to_bytes();
    let replay = String::from_utf8_lossy(&replay);
    assert!(replay.contains("fragments: ["));
    assert!(replay.contains(&format!("/fragments/{session_id}/fragment_1.mp4")));

    // All three fragments are individually downloadable
    for index in 1..=3 {
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/fragments/{session_id}/fragment_{index}.mp4"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Snapshot reports the terminal state for late pollers
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/sessions/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let snapshot = json_body(response).await;
    assert_eq!(snapshot["status"], "succeeded");
    assert_eq!(snapshot["fragments"].as_array().unwrap().len(), 3);

    // Bulk download returns a zip of the requested fragments
    let files: Vec<String> = (1..=3)
        .map(|i| format!("{session_id}/fragment_{i}.mp4"))
        .collect();
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/download_all")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&serde_json::json!({ "files": files })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/zip"
    );

    // Cleanup removes everything; a second call has nothing left to do
    let response = app
        .clone()
        .oneshot(
            Request::post(format!("/api/cleanup/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let cleaned = json_body(response).await;
    assert_eq!(cleaned["cleaned"], true);

    let response = app
        .oneshot(
            Request::post(format!("/api/cleanup/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let cleaned = json_body(response).await;
    assert_eq!(cleaned["cleaned"], false);
}

#[tokio::test]
async fn test_probe_failure_streams_single_error() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path(), 0.0);

    let response = app
        .clone()
        .oneshot(submit_request("60", b"unreadable"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let stream = response.into_body().collect().await.unwrap().to_bytes();
    let stream = String::from_utf8_lossy(&stream);

    assert_eq!(stream.matches("error:").count(), 1);
    assert!(!stream.contains("fragments:"));

    // No fragment files were produced
    assert!(!state
        .engine
        .fragment_root
        .join(&session_id)
        .exists());
}

#[tokio::test]
async fn test_invalid_duration_creates_no_session() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path(), 125.0);

    for bad in ["0", "-5", "abc"] {
        let response = app
            .clone()
            .oneshot(submit_request(bad, b"data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    assert!(state.registry.is_empty().await);
    // The rejected uploads were removed from disk
    let leftovers = std::fs::read_dir(&state.engine.upload_root)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_resumes_stream() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _state) = test_app_with(dir.path(), Arc::new(StallingSegmenter));

    let response = app
        .clone()
        .oneshot(submit_request("60", b"data"))
        .await
        .unwrap();
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // First consumer connects, then drops the stream mid-job
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    drop(response);

    // The receiver is handed back asynchronously
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let response = app
        .oneshot(
            Request::get(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_removed_session_ends_stream_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app_with(dir.path(), Arc::new(StallingSegmenter));

    let response = app
        .clone()
        .oneshot(submit_request("60", b"data"))
        .await
        .unwrap();
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Evict the session shortly after the stream connects, as the reaper
    // or an explicit cleanup would
    {
        let registry = Arc::clone(&state.registry);
        let id: vsplit_models::SessionId = session_id.clone().into();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            registry.remove(&id).await;
        });
    }

    let response = app
        .oneshot(
            Request::get(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The stream must end with a single explicit error line, not hang
    let body = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        response.into_body().collect(),
    )
    .await
    .expect("stream did not end after the session was removed")
    .unwrap()
    .to_bytes();
    let stream = String::from_utf8_lossy(&body);

    assert_eq!(stream.matches("error:").count(), 1);
    assert!(!stream.contains("fragments:"));
}

#[tokio::test]
async fn test_second_live_consumer_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    // Keep the job running so the session cannot reach a terminal state
    let (app, state) = test_app_with(dir.path(), Arc::new(StallingSegmenter));

    let response = app
        .clone()
        .oneshot(submit_request("60", b"data"))
        .await
        .unwrap();
    let session_id = json_body(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Take the receiver directly, as a live stream would
    let _rx = state
        .registry
        .take_receiver(&session_id.clone().into())
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::get(format!("/api/progress/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
