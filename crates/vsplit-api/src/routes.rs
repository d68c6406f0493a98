//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    cleanup_session, download_all, download_fragment, get_session, health, progress_stream,
    split_video,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/split_video", post(split_video))
        .route("/progress/:session_id", get(progress_stream))
        .route("/download_all", post(download_all))
        .route("/cleanup/:session_id", post(cleanup_session))
        .route("/sessions/:session_id", get(get_session));

    Router::new()
        .nest("/api", api_routes)
        .route("/fragments/:session_id/:filename", get(download_fragment))
        .route("/health", get(health))
        // Uploads are large; both the default and the explicit limit must
        // allow the configured body size
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

/// CORS layer for the configured origins.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;
    use vsplit_engine::EngineConfig;
    use vsplit_media::{EncodeProgress, MediaResult, SegmentRequest, Segmenter};

    struct NullSegmenter;

    #[async_trait::async_trait]
    impl Segmenter for NullSegmenter {
        async fn probe_duration(&self, _path: &std::path::Path) -> MediaResult<f64> {
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

    fn test_state(root: &std::path::Path) -> AppState {
        let engine = EngineConfig {
            upload_root: root.join("uploads"),
            fragment_root: root.join("fragments"),
            ..Default::default()
        };
        AppState::with_segmenter(ApiConfig::default(), engine, Arc::new(NullSegmenter))
    }

    #[tokio::test]
    async fn test_health_route() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_session_routes() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/sessions/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/progress/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::get("/fragments/nope/fragment_1.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::post("/api/cleanup/never-existed")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_download_all_rejects_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::post("/api/download_all")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"files": []}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
