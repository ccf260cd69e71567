use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::error;

use crate::dispatch::MAX_UPLOAD_BYTES;
use crate::error::PipelineError;
use crate::pipeline::{ModelSelector, StagedMedia};
use crate::utils::http::{download_video, HttpResponse};
use crate::{AppContext, STAGING_DIR};

pub fn video_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/video/upload", post(upload))
        .route("/video/upload/english", post(upload_english))
        .route("/video/url", post(submit_url))
        .route("/video/download", get(download_subtitle))
        .route("/video/download/text", get(download_text))
        // leave headroom over the limit so oversize payloads reach the
        // dispatcher's own validation message
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES as usize + 1024 * 1024))
        .with_state(ctx)
}

/// Submits an uploaded video for subtitle generation. Responds immediately
/// with the task id; the pipeline reports through the progress channel.
pub async fn upload(State(ctx): State<Arc<AppContext>>, multipart: Multipart) -> Response {
    let (staged, model_name) = match read_upload(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let Some(staged) = staged else {
        let response = HttpResponse::new(400, "Validation failed".to_string(), "no video file provided".to_string());
        return (StatusCode::BAD_REQUEST, Json(response)).into_response();
    };

    let model = match model_name {
        Some(name) => ModelSelector::Whisper { model: name },
        None => ModelSelector::default_whisper(),
    };
    submit_and_respond(&ctx, staged, model, "video uploaded, processing started...")
}

/// English path: embedded model, plain-text output.
pub async fn upload_english(State(ctx): State<Arc<AppContext>>, multipart: Multipart) -> Response {
    let (staged, _) = match read_upload(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let Some(staged) = staged else {
        let response = HttpResponse::new(400, "Validation failed".to_string(), "no video file provided".to_string());
        return (StatusCode::BAD_REQUEST, Json(response)).into_response();
    };

    submit_and_respond(&ctx, staged, ModelSelector::English, "english video uploaded, processing started...")
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UrlSubmitRequest {
    pub video_url: String,
    pub model: Option<String>,
}

/// Stages a remote video and submits it like an upload.
pub async fn submit_url(State(ctx): State<Arc<AppContext>>, Json(req): Json<UrlSubmitRequest>) -> Response {
    let staged = match download_video(&req.video_url, std::path::Path::new(STAGING_DIR.as_str())).await {
        Ok(staged) => staged,
        Err(e) => {
            error!("Failed to download video: {}", e);
            let response = HttpResponse::new(500, "Failed to download video".to_string(), e.to_string());
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response();
        }
    };

    let model = match req.model.filter(|m| !m.is_empty()) {
        Some(name) => ModelSelector::Whisper { model: name },
        None => ModelSelector::default_whisper(),
    };
    submit_and_respond(&ctx, staged, model, "video staged from url, processing started...")
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file_path: String,
}

pub async fn download_subtitle(Query(query): Query<DownloadQuery>) -> Response {
    serve_attachment(&query.file_path, "text/vtt").await
}

pub async fn download_text(Query(query): Query<DownloadQuery>) -> Response {
    serve_attachment(&query.file_path, "text/plain").await
}

async fn serve_attachment(file_path: &str, content_type: &'static str) -> Response {
    let path = PathBuf::from(file_path);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("download");
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    (headers, data).into_response()
}

/// Pulls the video payload and optional model name out of the multipart
/// form, staging the payload in the configured staging directory.
async fn read_upload(mut multipart: Multipart) -> Result<(Option<StagedMedia>, Option<String>), Response> {
    let mut staged: Option<StagedMedia> = None;
    let mut model_name: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let response = HttpResponse::new(400, "Malformed multipart payload".to_string(), e.to_string());
                return Err((StatusCode::BAD_REQUEST, Json(response)).into_response());
            }
        };

        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("videoFile") => {
                let content_type = field.content_type().unwrap_or("").to_string();
                match stage_stream(STAGING_DIR.as_str(), field, content_type).await {
                    Ok(media) => staged = Some(media),
                    Err(e) => {
                        error!("Failed to stage upload: {}", e);
                        let status = match &e {
                            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
                            _ => StatusCode::INTERNAL_SERVER_ERROR,
                        };
                        let response =
                            HttpResponse::new(status.as_u16(), "Failed to stage upload".to_string(), e.to_string());
                        return Err((status, Json(response)).into_response());
                    }
                }
            }
            Some("model") => {
                if let Ok(name) = field.text().await {
                    if !name.is_empty() {
                        model_name = Some(name);
                    }
                }
            }
            _ => {}
        }
    }

    Ok((staged, model_name))
}

/// Stages an upload under a unique name, streaming the payload to disk
/// chunk by chunk instead of buffering the whole file in memory.
async fn stage_stream<S, E>(dir: &str, stream: S, content_type: String) -> Result<StagedMedia, PipelineError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let file = tempfile::Builder::new()
        .prefix("uploaded_video_")
        .suffix(".mp4")
        .tempfile_in(dir)?;
    let path = file.into_temp_path().keep().map_err(|e| PipelineError::Io(e.error))?;

    match copy_stream(&path, stream).await {
        Ok(size_bytes) => Ok(StagedMedia {
            path,
            content_type,
            size_bytes,
        }),
        Err(e) => {
            // an aborted upload leaves nothing behind
            let _ = std::fs::remove_file(&path);
            Err(e)
        }
    }
}

async fn copy_stream<S, E>(path: &Path, stream: S) -> Result<u64, PipelineError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut out = tokio::fs::File::create(path).await?;
    let mut size_bytes = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| PipelineError::validation(format!("failed to read upload stream: {}", e)))?;
        out.write_all(&chunk).await?;
        size_bytes += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(size_bytes)
}

fn submit_and_respond(ctx: &AppContext, staged: StagedMedia, model: ModelSelector, ack: &str) -> Response {
    let staged_path = staged.path.clone();

    match ctx.dispatcher.submit(staged, model) {
        Ok(task_id) => {
            let response = HttpResponse::new(0, ack.to_string(), task_id);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            // a rejected submission never runs, so its staged file is ours to remove
            let _ = std::fs::remove_file(&staged_path);
            let status = match &e {
                PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
                PipelineError::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let response = HttpResponse::new(status.as_u16(), "Submission rejected".to_string(), e.to_string());
            (status, Json(response)).into_response()
        }
    }
}
