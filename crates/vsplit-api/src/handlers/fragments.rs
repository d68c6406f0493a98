//! Single fragment download.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;

use vsplit_models::SessionId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /fragments/{session_id}/{filename}`
pub async fn download_fragment(
    State(state): State<AppState>,
    Path((session_id, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let session_id = SessionId::from_string(session_id);
    if !session_id.is_path_safe() || !is_safe_filename(&filename) {
        return Err(ApiError::bad_request("Invalid fragment path"));
    }

    // A download counts as activity; keeps the session from being reaped
    state.registry.touch(&session_id).await;

    let path = state.engine.fragment_dir(session_id.as_str()).join(&filename);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::not_found("Fragment not found")
        } else {
            ApiError::Io(e)
        }
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&filename))
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{filename}\""),
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

/// Filenames never contain separators or parent references.
fn is_safe_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}

fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".mp4") || lower.ends_with(".m4v") {
        "video/mp4"
    } else if lower.ends_with(".webm") {
        "video/webm"
    } else if lower.ends_with(".mkv") {
        "video/x-matroska"
    } else if lower.ends_with(".avi") {
        "video/x-msvideo"
    } else if lower.ends_with(".mov") {
        "video/quicktime"
    } else {
        "application/octet-stream"
    }
}
