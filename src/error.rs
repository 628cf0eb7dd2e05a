use thiserror::Error;

/// Pipeline error taxonomy. Each stage-specific variant terminates the
/// enclosing job and is recorded verbatim as the job's failure reason.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("scene generation failed: {0}")]
    SceneGeneration(String),

    #[error("clip generation failed: {0}")]
    ClipGeneration(String),

    #[error("clip generation timed out after {0}s")]
    ClipTimeout(u64),

    #[error("clip download failed: {0}")]
    ClipDownload(String),

    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
