//! Session snapshot and explicit cleanup.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use vsplit_engine::purge_session_dirs;
use vsplit_models::{Fragment, SessionError, SessionId, SessionStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Point-in-time view of a session, for clients that lost the stream.
#[derive(Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub fragments: Vec<Fragment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
}

/// `GET /api/sessions/{session_id}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session_id = SessionId::from_string(session_id);
    let session = state
        .registry
        .snapshot(&session_id)
        .await
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    state.registry.touch(&session_id).await;

    Ok(Json(SessionSnapshot {
        session_id: session.id,
        status: session.status,
        fragments: session.fragments,
        error: session.last_error,
    }))
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub session_id: SessionId,
    pub cleaned: bool,
    pub message: String,
}

/// `POST /api/cleanup/{session_id}`
///
/// Idempotent: cleaning a session that never existed (or was already
/// cleaned) succeeds with a "nothing to clean" result.
pub async fn cleanup_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CleanupResponse>> {
    let session_id = SessionId::from_string(session_id);
    if !session_id.is_path_safe() {
        return Err(ApiError::bad_request("Invalid session id"));
    }

    let had_entry = state.registry.remove(&session_id).await.is_some();
    let had_dirs = dir_exists(&state.engine.upload_dir(session_id.as_str())).await
        || dir_exists(&state.engine.fragment_dir(session_id.as_str())).await;

    purge_session_dirs(&state.engine, &session_id).await;

    let cleaned = had_entry || had_dirs;
    if cleaned {
        info!(session_id = %session_id, "Session cleaned up on request");
    }

    Ok(Json(CleanupResponse {
        session_id,
        cleaned,
        message: if cleaned {
            "Session cleaned".to_string()
        } else {
            "Nothing to clean".to_string()
        },
    }))
}

async fn dir_exists(path: &std::path::Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
