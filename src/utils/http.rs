use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::pipeline::StagedMedia;

#[derive(Debug, Deserialize, Serialize)]
pub struct HttpResponse<T> {
    pub code: u16,
    pub message: String,
    pub body: T,
}

impl<T> HttpResponse<T> {
    pub fn new(code: u16, message: String, body: T) -> Self {
        Self { code, message, body }
    }
}

/// Picks a unique staging path in `dest_dir`, keeping the extension of the
/// source filename. Concurrent downloads whose URLs end in the same name
/// must never share a path: each task deletes its own staged input.
fn staged_dest(dest_dir: &Path, source_name: &str) -> std::io::Result<PathBuf> {
    let suffix = Path::new(source_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix("url_video_")
        .suffix(&suffix)
        .tempfile_in(dest_dir)?;
    file.into_temp_path().keep().map_err(|e| e.error)
}

/// Stages a remote video in `dest_dir` and reports the metadata the
/// dispatcher validates against. The body is streamed to disk chunk by
/// chunk rather than buffered whole.
pub async fn download_video(url: &str, dest_dir: &Path) -> Result<StagedMedia> {
    info!("Starting download from URL: {}", url);

    let filename = url
        .split('/')
        .next_back()
        .and_then(|name| name.split('?').next())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid URL: no filename found"))?;

    if !dest_dir.exists() {
        fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create directory: {}", e))?;
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP request failed: {}", e))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "HTTP request failed with status: {}",
            response.status()
        ));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let dest_path = staged_dest(dest_dir, filename)
        .map_err(|e| anyhow::anyhow!("Failed to stage download target: {}", e))?;
    info!("Destination path: {:?}", dest_path);

    match stream_body(response, &dest_path).await {
        Ok(size_bytes) => {
            info!("Download completed, {} bytes staged", size_bytes);
            Ok(StagedMedia {
                path: dest_path,
                content_type,
                size_bytes,
            })
        }
        Err(e) => {
            // an interrupted transfer leaves nothing behind
            let _ = std::fs::remove_file(&dest_path);
            Err(e)
        }
    }
}

async fn stream_body(mut response: reqwest::Response, dest_path: &Path) -> Result<u64> {
    let mut out = fs::File::create(dest_path).await?;
    let mut size_bytes = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response: {}", e))?
    {
        out.write_all(&chunk).await?;
        size_bytes += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(size_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download_rejects_url_without_filename() {
        let dir = tempfile::tempdir().unwrap();
        let result = download_video("https://example.com/", dir.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_same_url_filename_stages_to_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();

        // two URLs ending in clip.mp4 must not stage over each other
        let a = staged_dest(dir.path(), "clip.mp4").unwrap();
        let b = staged_dest(dir.path(), "clip.mp4").unwrap();

        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "mp4");
        assert_eq!(b.extension().unwrap(), "mp4");
        assert!(a.exists());
        assert!(b.exists());
    }

    #[test]
    fn test_response_envelope_round_trips_through_json() {
        let response = HttpResponse::new(0, "video uploaded".to_string(), "task-123".to_string());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"code\":0"));

        let back: HttpResponse<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.body, "task-123");
        assert_eq!(back.message, "video uploaded");
    }
}
