use crate::api::{ClipService, ClipTaskState};
use crate::config::Settings;
use crate::error::{ForgeError, Result};
use crate::job::GenerationParams;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Client for the hosted text-to-video service. Generation is
/// asynchronous on the service side: submit returns a task id, the task is
/// polled until it reports a downloadable clip.
#[derive(Debug, Clone)]
pub struct LtxClient {
    api_key: String,
    base: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    status: String,
    video_url: Option<String>,
    error: Option<String>,
}

impl LtxClient {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_key: settings.ltx_api_key.clone(),
            base: settings.ltx_api_base.clone(),
            client,
        }
    }
}

#[async_trait]
impl ClipService for LtxClient {
    async fn submit(
        &self,
        prompt: &str,
        duration_secs: u32,
        params: &GenerationParams,
    ) -> Result<String> {
        let request_body = json!({
            "prompt": prompt,
            "model": params.model,
            "duration": duration_secs,
            "resolution": params.resolution,
            "fps": params.fps,
            "generate_audio": false
        });

        let response = self
            .client
            .post(format!("{}/text-to-video", self.base))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ForgeError::ClipGeneration(error_text));
        }

        let submitted: SubmitResponse = response.json().await?;
        info!("Submitted clip task {}", submitted.id);
        Ok(submitted.id)
    }

    async fn poll(&self, task_id: &str) -> Result<ClipTaskState> {
        let response = self
            .client
            .get(format!("{}/text-to-video/{}", self.base, task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Transient status-endpoint hiccups are not task failures; the
            // caller's poll budget bounds how long we keep trying.
            let error_text = response.text().await.unwrap_or_default();
            warn!("Clip task {task_id} status query failed (HTTP {status}): {error_text}");
            return Ok(ClipTaskState::Pending);
        }

        let task: TaskResponse = response.json().await?;
        match task.status.as_str() {
            "completed" => match task.video_url {
                Some(url) => Ok(ClipTaskState::Ready(url)),
                None => Ok(ClipTaskState::Failed(
                    "task completed without a video url".to_string(),
                )),
            },
            "failed" => Ok(ClipTaskState::Failed(
                task.error.unwrap_or_else(|| "generation failed".to_string()),
            )),
            other => {
                info!("Clip task {task_id} status: {other}");
                Ok(ClipTaskState::Pending)
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading clip from {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ForgeError::ClipDownload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ForgeError::ClipDownload(format!(
                "HTTP {} fetching {url}",
                response.status()
            )));
        }

        // Clips run to hundreds of megabytes; stream to disk chunk by chunk.
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| ForgeError::ClipDownload(format!("{}: {e}", dest.display())))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ForgeError::ClipDownload(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ForgeError::ClipDownload(format!("{}: {e}", dest.display())))?;
        }
        file.flush()
            .await
            .map_err(|e| ForgeError::ClipDownload(format!("{}: {e}", dest.display())))?;

        info!("Clip saved to {}", dest.display());
        Ok(())
    }
}
