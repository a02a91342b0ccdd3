use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};

use super::{MediaHandle, Publisher};
use crate::error::StageFailure;

pub const DEFAULT_ENDPOINT: &str = "https://file.io";

/// Uploads the finished clip to a file.io-compatible endpoint.
pub struct FileIoPublisher {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl FileIoPublisher {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

/// A response only counts as published when it says so and carries a link.
fn link_from_response(response: UploadResponse) -> Result<String, StageFailure> {
    if !response.success {
        return Err(StageFailure::InvalidResponse(format!(
            "upload rejected: {}",
            response.message.as_deref().unwrap_or("no reason given")
        )));
    }
    match response.link.map(|l| l.trim().to_string()) {
        Some(link) if !link.is_empty() => Ok(link),
        _ => Err(StageFailure::InvalidResponse(
            "upload succeeded without a link".to_string(),
        )),
    }
}

#[async_trait]
impl Publisher for FileIoPublisher {
    async fn publish(&self, media: &MediaHandle) -> Result<String, StageFailure> {
        let bytes = tokio::fs::read(&media.path)
            .await
            .map_err(|e| StageFailure::Io {
                path: media.path.clone(),
                source: e,
            })?;
        let file_name = media
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip.mp4".to_string());
        let size = bytes.len();
        let form = Form::new().part(
            "file",
            Part::bytes(bytes).file_name(file_name).mime_str("video/mp4")?,
        );

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Upload rejected");
            return Err(StageFailure::InvalidResponse(format!(
                "upload endpoint returned {}",
                status
            )));
        }

        let link = link_from_response(response.json::<UploadResponse>().await?)?;
        info!(bytes = size, link = %link, "Published clip");
        Ok(link)
    }
}
