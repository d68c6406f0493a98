//! Job submission handler.
//!
//! Accepts a multipart upload (`video` file + `segment_duration` text
//! field), validates synchronously, then registers the session and spawns
//! its worker. The response returns as soon as the job is queued; progress
//! is delivered over the stream endpoint.

use std::path::{Path, PathBuf};

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::info;

use vsplit_engine::spawn_job;
use vsplit_models::{Session, SessionId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response to an accepted split job.
#[derive(Serialize)]
pub struct SplitResponse {
    pub session_id: SessionId,
    pub progress_url: String,
}

/// `POST /api/split_video`
pub async fn split_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SplitResponse>)> {
    // The id names the upload directory, so it exists before the session
    let session_id = SessionId::new();

    let (source_path, segment_duration) =
        match receive_upload(&state, &session_id, multipart).await {
            Ok(parts) => parts,
            Err(e) => {
                // Validation failed: no session was registered, so only the
                // partially written upload needs removing.
                let _ = tokio::fs::remove_dir_all(state.engine.upload_dir(session_id.as_str()))
                    .await;
                return Err(e);
            }
        };

    let session = Session::with_id(session_id.clone(), segment_duration, &source_path);
    let progress = state.registry.create(session.clone()).await;
    spawn_job(state.job_context(), session, progress);

    info!(
        session_id = %session_id,
        source = %source_path.display(),
        segment_duration,
        "Split job accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SplitResponse {
            progress_url: format!("/api/progress/{session_id}"),
            session_id,
        }),
    ))
}

/// Consume the multipart body: save the video under the session's upload
/// directory and pick up the segment duration field.
async fn receive_upload(
    state: &AppState,
    session_id: &SessionId,
    mut multipart: Multipart,
) -> ApiResult<(PathBuf, f64)> {
    let upload_dir = state.engine.upload_dir(session_id.as_str());
    let mut source_path: Option<PathBuf> = None;
    let mut duration_raw: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("video") => {
                let filename = sanitize_filename(field.file_name());
                tokio::fs::create_dir_all(&upload_dir).await?;
                let path = upload_dir.join(&filename);

                let mut file = tokio::fs::File::create(&path).await?;
                let mut bytes_written: u64 = 0;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {e}")))?
                {
                    bytes_written += chunk.len() as u64;
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;

                if bytes_written == 0 {
                    return Err(ApiError::bad_request("Uploaded video file is empty"));
                }
                source_path = Some(path);
            }
            Some("segment_duration") => {
                duration_raw = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Unreadable segment_duration field: {e}"))
                })?);
            }
            // Unknown fields are ignored
            _ => {}
        }
    }

    let source = source_path.ok_or_else(|| ApiError::bad_request("Missing 'video' file field"))?;
    let duration = parse_segment_duration(duration_raw.as_deref())?;
    Ok((source, duration))
}

/// Parse and validate the requested fragment length.
fn parse_segment_duration(raw: Option<&str>) -> ApiResult<f64> {
    let raw = raw.ok_or_else(|| ApiError::bad_request("Missing 'segment_duration' field"))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("segment_duration must be a number: '{raw}'")))?;

    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::bad_request(
            "segment_duration must be greater than zero",
        ));
    }
    Ok(value)
}

/// Reduce a client-supplied filename to a safe final path component.
fn sanitize_filename(name: Option<&str>) -> String {
    name.map(Path::new)
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload.mp4".to_string())
}
