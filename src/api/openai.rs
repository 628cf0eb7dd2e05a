use crate::api::{SceneWriter, Transcriber, Transcript, TranscriptSegment};
use crate::config::Settings;
use crate::error::{ForgeError, Result};
use crate::scene::{clip_count_for, snap_duration, strip_code_fences, Scene, ScenePlan, VALID_CLIP_SECS};
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Client for the hosted speech-to-text and chat-completion endpoints.
/// Implements both `Transcriber` and `SceneWriter`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    base: String,
    whisper_model: String,
    chat_model: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    segments: Vec<ApiSegment>,
}

#[derive(Debug, Deserialize)]
struct ApiSegment {
    text: String,
    start: Option<f64>,
    end: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawScene {
    prompt: String,
    duration: f64,
}

impl OpenAiClient {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            api_key: settings.openai_api_key.clone(),
            base: settings.openai_api_base.clone(),
            whisper_model: settings.whisper_model.clone(),
            chat_model: settings.chat_model.clone(),
            client,
        }
    }

    fn director_prompt(transcript: &str, style: &str, audio_secs: f64, num_clips: usize) -> String {
        format!(
            r#"Analyze this audio transcript and create {num_clips} video scene prompts for a visual accompaniment.

TRANSCRIPT:
{transcript}

REQUIREMENTS:
1. Create exactly {num_clips} scenes that flow with the content
2. Each scene duration must be one of: {valid:?} seconds
3. Total duration must be approximately {total} seconds (plus or minus 5 seconds is OK)
4. Visual style: {style}
5. Prompts should be detailed, cinematic descriptions for AI video generation
6. Include camera movements, lighting, mood, and specific visual details
7. Match scenes to the content being discussed at that point in the audio

OUTPUT FORMAT (JSON array only, no other text):
[
    {{"prompt": "Detailed scene description...", "duration": 12}},
    {{"prompt": "Next scene description...", "duration": 10}}
]"#,
            valid = VALID_CLIP_SECS,
            total = audio_secs.round() as u64,
        )
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        info!("Transcribing {} with {}", audio.display(), self.whisper_model);

        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.whisper_model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ForgeError::Transcription(error_text));
        }

        let result: VerboseTranscription = response.json().await?;
        let segments = result
            .segments
            .into_iter()
            .map(|s| TranscriptSegment {
                text: s.text,
                start: s.start,
                end: s.end,
            })
            .collect::<Vec<_>>();

        info!(
            "Transcribed {} characters in {} segments",
            result.text.len(),
            segments.len()
        );

        if segments.is_empty() {
            return Ok(Transcript::from_text(result.text));
        }
        Ok(Transcript {
            text: result.text,
            segments,
        })
    }
}

#[async_trait]
impl SceneWriter for OpenAiClient {
    async fn write_scenes(
        &self,
        transcript: &Transcript,
        style: &str,
        audio_secs: f64,
    ) -> Result<ScenePlan> {
        if transcript.is_empty() {
            return Err(ForgeError::SceneGeneration(
                "transcript is empty".to_string(),
            ));
        }

        let num_clips = clip_count_for(audio_secs);
        info!("Requesting {} scenes from {}", num_clips, self.chat_model);

        let request_body = json!({
            "model": self.chat_model,
            "messages": [
                {
                    "role": "user",
                    "content": Self::director_prompt(&transcript.text, style, audio_secs, num_clips)
                }
            ],
            "max_tokens": 4096
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ForgeError::SceneGeneration(error_text));
        }

        let response_json: serde_json::Value = response.json().await?;
        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ForgeError::SceneGeneration("no content in completion response".to_string())
            })?;

        let raw: Vec<RawScene> = serde_json::from_str(strip_code_fences(content))
            .map_err(|e| ForgeError::SceneGeneration(format!("failed to parse scene plan: {e}")))?;

        let scenes = raw
            .into_iter()
            .enumerate()
            .map(|(index, s)| Scene {
                index,
                prompt: s.prompt,
                duration_secs: snap_duration(s.duration.round() as u32),
            })
            .collect::<Vec<_>>();

        info!("Generated {} scenes", scenes.len());
        Ok(ScenePlan::new(scenes))
    }
}
