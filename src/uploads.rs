//! On-disk storage for top-up slip images.

use std::path::PathBuf;

use crate::error::{AppError, Result};

/// Public URL prefix the stored files are served under.
pub const SLIP_URL_PREFIX: &str = "/uploads/slips";

#[derive(Debug, Clone)]
pub struct SlipStore {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

/// File extension for an accepted image, judged by both the declared content
/// type and the file name.
pub fn image_extension(file_name: Option<&str>, content_type: Option<&str>) -> Result<&'static str> {
    let from_type = match content_type {
        Some("image/png") => Some("png"),
        Some("image/jpeg") | Some("image/jpg") => Some("jpg"),
        _ => None,
    };
    let from_name = file_name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .and_then(|ext| match ext.as_str() {
            "png" => Some("png"),
            "jpg" | "jpeg" => Some("jpg"),
            _ => None,
        });

    match (from_type, from_name) {
        (Some(t), Some(n)) if t == n => Ok(t),
        _ => Err(AppError::BadRequest(
            "Slip must be a JPEG or PNG image".into(),
        )),
    }
}

impl SlipStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    /// Write a slip image and return the URL it will be served at.
    pub async fn save(&self, extension: &str, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Slip image is empty".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(AppError::BadRequest(format!(
                "Slip image exceeds {} bytes",
                self.max_bytes
            )));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;

        let file_name = format!("slip-{}.{}", uuid::Uuid::new_v4(), extension);
        tokio::fs::write(self.dir.join(&file_name), bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store slip: {}", e)))?;

        Ok(format!("{}/{}", SLIP_URL_PREFIX, file_name))
    }

    /// Best-effort removal of a stored slip, used when the intent insert fails.
    pub async fn discard(&self, url: &str) {
        let Some(file_name) = url.strip_prefix(SLIP_URL_PREFIX).map(|s| s.trim_start_matches('/')) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(self.dir.join(file_name)).await {
            tracing::warn!(error = %e, url, "Failed to remove orphaned slip");
        }
    }
}
