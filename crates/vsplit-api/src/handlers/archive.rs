//! Bulk fragment download as a zip archive.

use std::io::{Cursor, Write};
use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use vsplit_models::SessionId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Request body: session-qualified fragment paths, `<session>/<filename>`.
#[derive(Debug, Deserialize)]
pub struct DownloadAllRequest {
    pub files: Vec<String>,
}

/// `POST /api/download_all`
pub async fn download_all(
    State(state): State<AppState>,
    Json(request): Json<DownloadAllRequest>,
) -> ApiResult<Response> {
    if request.files.is_empty() {
        return Err(ApiError::bad_request("No files requested"));
    }

    let mut entries = Vec::with_capacity(request.files.len());
    for raw in &request.files {
        entries.push(parse_entry(raw)?);
    }

    // Archive assembly counts as activity for every touched session
    for (session, _) in &entries {
        state
            .registry
            .touch(&SessionId::from_string(session.clone()))
            .await;
    }

    let root = state.engine.fragment_root.clone();
    let (bytes, archived) = tokio::task::spawn_blocking(move || build_archive(&root, &entries))
        .await
        .map_err(|e| ApiError::internal(format!("Archive task failed: {e}")))??;

    if archived == 0 {
        return Err(ApiError::not_found("None of the requested files exist"));
    }

    info!(archived, size = bytes.len(), "Assembled fragment archive");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"fragments.zip\"",
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {e}")))
}

/// Split and validate one `<session>/<filename>` entry.
fn parse_entry(raw: &str) -> ApiResult<(String, String)> {
    let (session, filename) = raw
        .split_once('/')
        .ok_or_else(|| ApiError::bad_request(format!("Invalid file path: '{raw}'")))?;

    let component_ok = |s: &str| {
        !s.is_empty() && !s.contains("..") && !s.contains('/') && !s.contains('\\')
    };
    if !component_ok(session) || !component_ok(filename) {
        return Err(ApiError::bad_request(format!("Invalid file path: '{raw}'")));
    }

    Ok((session.to_string(), filename.to_string()))
}

/// Build the zip in memory. Missing files are skipped, not fatal; returns
/// the archive bytes and how many entries made it in.
fn build_archive(root: &FsPath, entries: &[(String, String)]) -> ApiResult<(Vec<u8>, usize)> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut archived = 0;
    for (session, filename) in entries {
        let path = root.join(session).join(filename);
        match std::fs::read(&path) {
            Ok(data) => {
                zip.start_file(format!("{session}/{filename}"), options)
                    .map_err(|e| ApiError::internal(format!("Zip write failed: {e}")))?;
                zip.write_all(&data)?;
                archived += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Requested fragment missing, skipping");
            }
            Err(e) => return Err(ApiError::Io(e)),
        }
    }

    let cursor = zip
        .finish()
        .map_err(|e| ApiError::internal(format!("Zip finalize failed: {e}")))?;
    Ok((cursor.into_inner(), archived))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            parse_entry("s1/fragment_1.mp4").unwrap(),
            ("s1".to_string(), "fragment_1.mp4".to_string())
        );

        assert!(parse_entry("no-slash").is_err());
        assert!(parse_entry("../evil/f.mp4").is_err());
        assert!(parse_entry("s1/../f.mp4").is_err());
        assert!(parse_entry("s1/a/b.mp4").is_err());
        assert!(parse_entry("/f.mp4").is_err());
        assert!(parse_entry("s1/").is_err());
    }

    #[test]
    fn test_archive_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("s1");
        std::fs::create_dir_all(&session_dir).unwrap();
        std::fs::write(session_dir.join("fragment_1.mp4"), b"first").unwrap();
        std::fs::write(session_dir.join("fragment_2.mp4"), b"second").unwrap();

        let entries = vec![
            ("s1".to_string(), "fragment_1.mp4".to_string()),
            ("s1".to_string(), "missing.mp4".to_string()),
            ("s1".to_string(), "fragment_2.mp4".to_string()),
        ];

        let (bytes, archived) = build_archive(dir.path(), &entries).unwrap();
        assert_eq!(archived, 2);

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 2);

        let mut content = String::new();
        zip.by_name("s1/fragment_1.mp4")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first");
    }

    #[test]
    fn test_archive_with_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![("ghost".to_string(), "f.mp4".to_string())];

        let (_, archived) = build_archive(dir.path(), &entries).unwrap();
        assert_eq!(archived, 0);
    }
}
