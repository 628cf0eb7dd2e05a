use crate::error::{ForgeError, Result};
use crate::job::{GenerationParams, JobStage};
use crate::pipeline::Pipeline;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// HTTP error envelope: `{"error": "..."}` with an appropriate status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ForgeError> for ApiError {
    fn from(e: ForgeError) -> Self {
        Self::internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Serialize)]
struct JobCreated {
    job_id: Uuid,
    status: JobStage,
    message: String,
}

#[derive(Serialize)]
struct StatusResponse {
    job_id: Uuid,
    status: JobStage,
    progress: u8,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/generate", post(generate))
        .route("/status/{job_id}", get(status))
        .route("/download/{job_id}", get(download))
        .route("/health", get(health))
        .with_state(pipeline)
}

pub async fn serve(pipeline: Arc<Pipeline>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on {bind}");
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn health(State(pipeline): State<Arc<Pipeline>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "jobs": pipeline.store().count().await,
    }))
}

/// Create a job from a multipart form. Audio arrives as a direct upload,
/// a URL to fetch, or a base64 payload; remaining fields tune generation.
async fn generate(
    State(pipeline): State<Arc<Pipeline>>,
    mut multipart: Multipart,
) -> std::result::Result<(StatusCode, Json<JobCreated>), ApiError> {
    let mut audio_bytes: Option<Vec<u8>> = None;
    let mut audio_ext = "mp3".to_string();
    let mut audio_url: Option<String> = None;
    let mut audio_base64: Option<String> = None;
    let mut params = GenerationParams::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                if let Some(ext) = field.file_name().and_then(audio_extension) {
                    audio_ext = ext.to_ascii_lowercase();
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                audio_bytes = Some(bytes.to_vec());
            }
            "audio_url" => audio_url = Some(read_text(field).await?),
            "audio_base64" => audio_base64 = Some(read_text(field).await?),
            "style" => params.style = read_text(field).await?,
            "style_notes" => params.style_notes = Some(read_text(field).await?),
            "prompt_override" => params.prompt_override = Some(read_text(field).await?),
            "model" => params.model = read_text(field).await?,
            "resolution" => params.resolution = read_text(field).await?,
            "fps" => {
                params.fps = read_text(field)
                    .await?
                    .parse()
                    .map_err(|_| ApiError::bad_request("fps must be an integer"))?;
            }
            _ => {}
        }
    }

    let audio_bytes = match (audio_bytes, audio_url, audio_base64) {
        (Some(bytes), _, _) => bytes,
        (None, Some(url), _) => fetch_audio(&url).await?,
        (None, None, Some(encoded)) => base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ApiError::bad_request(format!("invalid audio_base64: {e}")))?,
        (None, None, None) => {
            return Err(ApiError::bad_request(
                "must provide audio, audio_url, or audio_base64",
            ))
        }
    };
    if audio_bytes.is_empty() {
        return Err(ApiError::bad_request("audio payload is empty"));
    }
    if params.style.trim().is_empty() {
        return Err(ApiError::bad_request("style must not be empty"));
    }

    let uploads = pipeline.settings().work_root.join("uploads");
    tokio::fs::create_dir_all(&uploads)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let audio_path = uploads.join(format!("{}.{audio_ext}", Uuid::new_v4()));
    tokio::fs::write(&audio_path, &audio_bytes)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let job = pipeline.store().create(audio_path, params).await;
    info!("Created job {}", job.id);

    let runner = pipeline.clone();
    let job_id = job.id;
    tokio::spawn(async move { runner.run(job_id).await });

    Ok((
        StatusCode::ACCEPTED,
        Json(JobCreated {
            job_id: job.id,
            status: job.stage,
            message: job.message,
        }),
    ))
}

async fn status(
    State(pipeline): State<Arc<Pipeline>>,
    Path(job_id): Path<Uuid>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    let job = pipeline
        .store()
        .get(job_id)
        .await
        .ok_or_else(|| ApiError::not_found("job not found"))?;

    Ok(Json(StatusResponse {
        job_id: job.id,
        status: job.stage,
        progress: job.progress,
        message: job.message,
        error: job.error,
    }))
}

async fn download(
    State(pipeline): State<Arc<Pipeline>>,
    Path(job_id): Path<Uuid>,
) -> std::result::Result<Response, ApiError> {
    let job = pipeline
        .store()
        .get(job_id)
        .await
        .ok_or_else(|| ApiError::not_found("job not found"))?;

    if job.stage != JobStage::Done {
        return Err(ApiError::conflict(format!(
            "job not ready, status: {}",
            job.stage.as_str()
        )));
    }

    let output_path = job
        .output_path
        .ok_or_else(|| ApiError::internal("done job has no output file"))?;
    let file = tokio::fs::File::open(&output_path)
        .await
        .map_err(|_| ApiError::not_found("video file not found"))?;
    let stream = tokio_util::io::ReaderStream::new(file);

    Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"forge_{job_id}.mp4\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// File extension of an upload, only when the name actually carries one.
fn audio_extension(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> std::result::Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

async fn fetch_audio(url: &str) -> std::result::Result<Vec<u8>, ApiError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ApiError::bad_request(format!("cannot fetch audio_url: {e}")))?;
    if !response.status().is_success() {
        return Err(ApiError::bad_request(format!(
            "audio_url returned HTTP {}",
            response.status()
        )));
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| ApiError::bad_request(format!("cannot fetch audio_url: {e}")))
}
