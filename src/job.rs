use crate::config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Pipeline stages in execution order. The derived `Ord` follows that
/// order, which is what the store's monotonic-advance check relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStage {
    Queued,
    Transcribing,
    GeneratingScenes,
    GeneratingClips,
    Assembling,
    Done,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Transcribing => "transcribing",
            JobStage::GeneratingScenes => "generating-scenes",
            JobStage::GeneratingClips => "generating-clips",
            JobStage::Assembling => "assembling",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }
}

/// User-tunable knobs for one job, defaulted from the service presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub style: String,
    pub style_notes: Option<String>,
    /// When set, transcription and scene planning are skipped and this
    /// prompt drives a single clip covering the whole audio.
    pub prompt_override: Option<String>,
    pub model: String,
    pub resolution: String,
    pub fps: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            style: "Cinematic Stock Footage".to_string(),
            style_notes: None,
            prompt_override: None,
            model: config::VIDEO_MODEL.to_string(),
            resolution: config::DEFAULT_RESOLUTION.to_string(),
            fps: config::DEFAULT_FPS,
        }
    }
}

/// One end-to-end audio-to-video request and its tracked state.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub audio_path: PathBuf,
    pub params: GenerationParams,
    pub stage: JobStage,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory job registry shared between the HTTP surface and the
/// pipeline. Jobs live until process exit; there is no persistent store.
#[derive(Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, audio_path: PathBuf, params: GenerationParams) -> Job {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            audio_path,
            params,
            stage: JobStage::Queued,
            progress: 0,
            message: "Job queued".to_string(),
            error: None,
            output_path: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.write().await.insert(job.id, job.clone());
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Move a job forward. Regressions and writes to terminal jobs are
    /// dropped, which keeps finished statuses stable under late updates.
    pub async fn advance(&self, id: Uuid, stage: JobStage, progress: u8, message: impl Into<String>) {
        let mut jobs = self.inner.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.stage.is_terminal() || stage < job.stage {
                return;
            }
            job.stage = stage;
            job.progress = progress;
            job.message = message.into();
            job.updated_at = Utc::now();
        }
    }

    /// Record the job's terminal failure reason. The first failure wins.
    pub async fn fail(&self, id: Uuid, reason: impl Into<String>) {
        let mut jobs = self.inner.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.stage.is_terminal() {
                return;
            }
            let reason = reason.into();
            job.stage = JobStage::Failed;
            job.message = "Job failed".to_string();
            job.error = Some(reason);
            job.updated_at = Utc::now();
        }
    }

    /// Mark a job done. A job never reports done without an output file,
    /// so an empty path is recorded as a failure instead.
    pub async fn complete(&self, id: Uuid, output_path: PathBuf) {
        let mut jobs = self.inner.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.stage.is_terminal() {
                return;
            }
            if output_path.as_os_str().is_empty() {
                job.stage = JobStage::Failed;
                job.error = Some("pipeline finished without an output file".to_string());
            } else {
                job.stage = JobStage::Done;
                job.progress = 100;
                job.message = "Video ready".to_string();
                job.output_path = Some(output_path);
            }
            job.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stages_advance_monotonically() {
        let store = JobStore::new();
        let job = store.create("a.mp3".into(), GenerationParams::default()).await;

        store.advance(job.id, JobStage::Transcribing, 10, "t").await;
        store.advance(job.id, JobStage::GeneratingClips, 30, "c").await;
        // Regression attempt is dropped.
        store.advance(job.id, JobStage::Transcribing, 10, "late").await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.stage, JobStage::GeneratingClips);
        assert_eq!(job.message, "c");
    }

    #[tokio::test]
    async fn terminal_jobs_are_immutable() {
        let store = JobStore::new();
        let job = store.create("a.mp3".into(), GenerationParams::default()).await;

        store.fail(job.id, "upstream rejected").await;
        store.advance(job.id, JobStage::Assembling, 90, "late").await;
        store.complete(job.id, "out.mp4".into()).await;
        store.fail(job.id, "second failure").await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.stage, JobStage::Failed);
        assert_eq!(job.error.as_deref(), Some("upstream rejected"));
        assert!(job.output_path.is_none());
    }

    #[tokio::test]
    async fn done_requires_an_output_path() {
        let store = JobStore::new();
        let job = store.create("a.mp3".into(), GenerationParams::default()).await;

        store.complete(job.id, PathBuf::new()).await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.stage, JobStage::Failed);
    }

    #[tokio::test]
    async fn finished_status_reads_are_idempotent() {
        let store = JobStore::new();
        let job = store.create("a.mp3".into(), GenerationParams::default()).await;
        store.complete(job.id, "out.mp4".into()).await;

        let first = store.get(job.id).await.unwrap();
        let second = store.get(job.id).await.unwrap();
        assert_eq!(first.stage, JobStage::Done);
        assert_eq!(first.stage, second.stage);
        assert_eq!(first.updated_at, second.updated_at);
    }
}
