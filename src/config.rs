use crate::error::{ForgeError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const LTX_API_BASE: &str = "https://api.ltx.video/v1";

pub const WHISPER_MODEL: &str = "whisper-1";
pub const CHAT_MODEL: &str = "gpt-4o";
pub const VIDEO_MODEL: &str = "ltx-2-fast";
pub const DEFAULT_RESOLUTION: &str = "1920x1080";
pub const DEFAULT_FPS: u32 = 25;

/// Runtime settings for the service. `from_env` is the canonical
/// constructor; `Default` fills the same tunables with empty credentials
/// for embedding and tests.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub ltx_api_key: String,
    pub openai_api_base: String,
    pub ltx_api_base: String,
    pub whisper_model: String,
    pub chat_model: String,
    /// Delay between successive status polls for one clip task.
    pub poll_interval: Duration,
    /// Maximum total wait for one clip task before giving up.
    pub max_poll: Duration,
    /// Upper bound on clip tasks in flight for a single job.
    pub clip_concurrency: usize,
    /// Wall-clock budget for a whole job; expiry marks it failed.
    pub job_timeout: Duration,
    /// Root directory for per-job working directories.
    pub work_root: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            ltx_api_key: String::new(),
            openai_api_base: OPENAI_API_BASE.to_string(),
            ltx_api_base: LTX_API_BASE.to_string(),
            whisper_model: WHISPER_MODEL.to_string(),
            chat_model: CHAT_MODEL.to_string(),
            poll_interval: Duration::from_secs(5),
            max_poll: Duration::from_secs(300),
            clip_concurrency: 3,
            job_timeout: Duration::from_secs(1800),
            work_root: std::env::temp_dir().join("forge"),
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to per-service
    /// secrets files for credentials. Missing credentials are a hard error.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self {
            openai_api_key: api_key("openai")?,
            ltx_api_key: api_key("ltx")?,
            ..Self::default()
        };

        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            settings.openai_api_base = base;
        }
        if let Ok(base) = std::env::var("LTX_API_BASE") {
            settings.ltx_api_base = base;
        }
        if let Ok(dir) = std::env::var("FORGE_WORK_DIR") {
            settings.work_root = PathBuf::from(dir);
        }
        if let Some(secs) = env_u64("FORGE_CLIP_POLL_INTERVAL_SECS") {
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FORGE_CLIP_MAX_POLL_SECS") {
            settings.max_poll = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("FORGE_CLIP_CONCURRENCY") {
            settings.clip_concurrency = (n as usize).max(1);
        }
        if let Some(secs) = env_u64("FORGE_JOB_TIMEOUT_SECS") {
            settings.job_timeout = Duration::from_secs(secs);
        }

        Ok(settings)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[derive(Deserialize)]
struct SecretsFile {
    api_key: String,
}

/// Resolve an API key for `service`: `{SERVICE}_API_KEY` from the
/// environment first, then `~/.secrets/{service}.json` or
/// `.secrets/{service}.json` with shape `{"api_key": "..."}`.
fn api_key(service: &str) -> Result<String> {
    let env_var = format!("{}_API_KEY", service.to_uppercase());
    if let Ok(key) = std::env::var(&env_var) {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".secrets").join(format!("{service}.json")));
    }
    candidates.push(PathBuf::from(".secrets").join(format!("{service}.json")));

    for path in candidates {
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let secrets: SecretsFile = serde_json::from_str(&raw).map_err(|e| {
                ForgeError::Configuration(format!("invalid secrets file {}: {e}", path.display()))
            })?;
            if !secrets.api_key.is_empty() {
                return Ok(secrets.api_key);
            }
        }
    }

    Err(ForgeError::Configuration(format!(
        "missing API key: set {env_var} or provide a .secrets/{service}.json file"
    )))
}

/// Verify that the external media tools are on PATH. Their absence is a
/// configuration error, not a pipeline bug.
pub fn ensure_external_tools() -> Result<()> {
    for tool in ["ffmpeg", "ffprobe"] {
        let status = Command::new(tool)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => {}
            Ok(s) => {
                return Err(ForgeError::Configuration(format!(
                    "{tool} exited with {s} during startup check"
                )))
            }
            Err(e) => {
                return Err(ForgeError::Configuration(format!(
                    "{tool} not found on PATH: {e}"
                )))
            }
        }
    }
    Ok(())
}
