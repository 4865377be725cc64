//! Route handlers

use super::error::{detail, multipart_error, ApiError};
use super::AppState;
use crate::cache::{fingerprint_file, parse_artifact_file_name, Fingerprint, FingerprintBuilder};
use crate::config::schema::UploadConfig;
use crate::error::{PlygateError, PlygateResult};
use crate::image_info;
use crate::ledger::{TaskRecord, TaskStatus};
use crate::remote::{file_extension, ObjectRef};
use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::info;
use uuid::Uuid;

/// Multipart field carrying the image
const UPLOAD_FIELD: &str = "file";

/// Body of both generation endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub task_id: Uuid,
    pub ply_filename: String,
    pub status: TaskStatus,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub cached: bool,
}

#[derive(Debug, Deserialize)]
pub struct OssUrlRequest {
    #[serde(default)]
    pub url: String,
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "plygate is running" }))
}

/// POST /api/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, ApiError> {
    let limit = state.config.upload.max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let ext = file_extension(&file_name);
        check_extension(&state.config.upload, &ext)?;

        // Removed when this handler returns or is dropped
        let received = receive(field, &state.config.upload_dir(), &ext, limit).await?;
        info!(
            file_name = %file_name,
            size_bytes = received.bytes,
            fingerprint = %received.fingerprint.short(),
            "Received upload"
        );

        let dimensions = image_info::dimensions(&received.path).await;
        return process(&state, received.fingerprint, &received.path, dimensions).await;
    }

    Err(PlygateError::Validation(format!("multipart field \"{UPLOAD_FIELD}\" is required")).into())
}

/// POST /api/generate_from_oss_url
pub async fn generate_from_oss_url(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OssUrlRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload?;
    let object = ObjectRef::parse(&request.url)?;
    check_extension(&state.config.upload, &object.extension())?;

    let dir = state.config.oss_temp_dir();
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| PlygateError::io(format!("creating {}", dir.display()), e))?;
    let local = state.fetcher.fetch(&object.url, &dir).await?;

    let local_ext = local
        .file_name()
        .map(|n| file_extension(&n.to_string_lossy()))
        .unwrap_or_default();
    if let Err(e) = check_extension(&state.config.upload, &local_ext) {
        let _ = fs::remove_file(&local).await;
        return Err(e.into());
    }

    let fingerprint = fingerprint_file(&local).await?;
    let dimensions = image_info::dimensions(&local).await;
    process(&state, fingerprint, &local, dimensions).await
}

/// GET /api/ply/{filename}
pub async fn get_ply(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError(PlygateError::ArtifactNotFound(filename.clone()));

    let fingerprint = parse_artifact_file_name(&filename).ok_or_else(not_found)?;
    let artifact = state
        .coordinator
        .store()
        .lookup(&fingerprint)
        .await?
        .ok_or_else(not_found)?;

    let file = match fs::File::open(&artifact.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            return Err(PlygateError::io(format!("opening {}", artifact.path.display()), e).into())
        }
    };

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name()),
        ),
        (header::CONTENT_LENGTH, artifact.size_bytes.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// GET /api/status/{task_id}
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    UrlPath(task_id): UrlPath<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    Ok(Json(state.ledger.get(&task_id).await?))
}

/// Record a task, resolve the artifact, and record the outcome
async fn process(
    state: &AppState,
    fingerprint: Fingerprint,
    image: &Path,
    dimensions: Option<(u32, u32)>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let task_id = state.ledger.begin(dimensions).await;

    match state.coordinator.resolve(fingerprint, image).await {
        Ok(resolution) => {
            let ply_filename = resolution.artifact.file_name();
            state
                .ledger
                .complete(task_id, ply_filename.clone(), resolution.cached)
                .await;
            info!(task_id = %task_id, cached = resolution.cached, "Task completed");
            Ok(Json(GenerateResponse {
                task_id,
                ply_filename,
                status: TaskStatus::Completed,
                image_width: dimensions.map(|(w, _)| w),
                image_height: dimensions.map(|(_, h)| h),
                cached: resolution.cached,
            }))
        }
        Err(e) => {
            state.ledger.fail(task_id, detail(&e)).await;
            Err(e.into())
        }
    }
}

fn check_extension(upload: &UploadConfig, ext: &str) -> PlygateResult<()> {
    if upload.is_allowed(ext) {
        return Ok(());
    }
    Err(PlygateError::UnsupportedExtension {
        ext: if ext.is_empty() { "(none)".to_string() } else { ext.to_string() },
        allowed: upload.allowed_display(),
    })
}

/// An upload spooled to disk
struct Received {
    path: TempPath,
    fingerprint: Fingerprint,
    bytes: u64,
}

/// Stream a multipart field to a temp file, hashing as it goes
async fn receive(
    mut field: Field<'_>,
    dir: &Path,
    ext: &str,
    limit: u64,
) -> PlygateResult<Received> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| PlygateError::io(format!("creating {}", dir.display()), e))?;
    let (file, path) = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(ext)
        .tempfile_in(dir)
        .map_err(|e| PlygateError::io(format!("creating upload file in {}", dir.display()), e))?
        .into_parts();
    let mut file = fs::File::from_std(file);

    let mut hasher = FingerprintBuilder::new();
    let mut bytes: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        bytes += chunk.len() as u64;
        if bytes > limit {
            return Err(PlygateError::UploadTooLarge { limit });
        }
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|e| PlygateError::io("writing upload", e))?;
    }
    file.flush()
        .await
        .map_err(|e| PlygateError::io("writing upload", e))?;

    if bytes == 0 {
        return Err(PlygateError::Validation("Uploaded file is empty".to_string()));
    }

    Ok(Received {
        path,
        fingerprint: hasher.finish(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check() {
        let upload = UploadConfig::default();
        assert!(check_extension(&upload, ".JPG").is_ok());
        assert!(check_extension(&upload, ".webp").is_ok());

        match check_extension(&upload, ".txt").unwrap_err() {
            PlygateError::UnsupportedExtension { ext, allowed } => {
                assert_eq!(ext, ".txt");
                assert_eq!(allowed, ".jpg, .jpeg, .png, .webp");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            check_extension(&upload, "").unwrap_err(),
            PlygateError::UnsupportedExtension { ext, .. } if ext == "(none)"
        ));
    }

    #[test]
    fn response_shape() {
        let response = GenerateResponse {
            task_id: Uuid::nil(),
            ply_filename: "ab.ply".into(),
            status: TaskStatus::Completed,
            image_width: None,
            image_height: Some(10),
            cached: false,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json["image_width"].is_null());
        assert_eq!(json["image_height"], 10);
        assert_eq!(json["cached"], false);
    }
}
