mod ltx;
mod openai;

pub use ltx::LtxClient;
pub use openai::OpenAiClient;

use crate::error::Result;
use crate::job::GenerationParams;
use crate::scene::ScenePlan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One timed span of transcribed speech. Timing is optional; a plain-text
/// transcription keeps a single untimed segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

/// Transcription result for a whole audio file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            segments: vec![TranscriptSegment {
                text: text.clone(),
                start: None,
                end: None,
            }],
            text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Speech-to-text upstream.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript>;
}

/// Transcript-to-storyboard upstream.
#[async_trait]
pub trait SceneWriter: Send + Sync {
    async fn write_scenes(
        &self,
        transcript: &Transcript,
        style: &str,
        audio_secs: f64,
    ) -> Result<ScenePlan>;
}

/// State of one remote clip-generation task.
#[derive(Debug, Clone)]
pub enum ClipTaskState {
    Pending,
    Ready(String),
    Failed(String),
}

/// Text-to-video upstream: submit a task, poll it, download the result.
/// The bounded poll loop itself lives in the pipeline so its budget is
/// enforced uniformly across implementations.
#[async_trait]
pub trait ClipService: Send + Sync {
    async fn submit(
        &self,
        prompt: &str,
        duration_secs: u32,
        params: &GenerationParams,
    ) -> Result<String>;

    async fn poll(&self, task_id: &str) -> Result<ClipTaskState>;

    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}
