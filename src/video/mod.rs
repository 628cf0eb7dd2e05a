mod assembler;

pub use assembler::FfmpegAssembler;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Seam over the external media tooling so the pipeline can be exercised
/// without ffmpeg on the host.
#[async_trait]
pub trait MediaAssembler: Send + Sync {
    /// Duration of an audio file in seconds.
    async fn probe_duration(&self, audio: &Path) -> Result<f64>;

    /// Concatenate `clips` in order and overlay `audio`, writing the
    /// merged video to `output`.
    async fn assemble(&self, clips: &[PathBuf], audio: &Path, output: &Path) -> Result<()>;
}
