use crate::api::{ClipService, ClipTaskState, LtxClient, OpenAiClient, SceneWriter, Transcriber};
use crate::config::Settings;
use crate::error::{ForgeError, Result};
use crate::job::{GenerationParams, JobStage, JobStore};
use crate::scene::{expand_style, Scene, ScenePlan};
use crate::video::{FfmpegAssembler, MediaAssembler};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

/// Drives the four stages of a job in sequence: transcribe, plan scenes,
/// generate clips, assemble. Stage clients sit behind traits so the whole
/// orchestration is testable without upstream services.
pub struct Pipeline {
    settings: Settings,
    store: JobStore,
    transcriber: Arc<dyn Transcriber>,
    scene_writer: Arc<dyn SceneWriter>,
    clip_service: Arc<dyn ClipService>,
    assembler: Arc<dyn MediaAssembler>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        store: JobStore,
        transcriber: Arc<dyn Transcriber>,
        scene_writer: Arc<dyn SceneWriter>,
        clip_service: Arc<dyn ClipService>,
        assembler: Arc<dyn MediaAssembler>,
    ) -> Self {
        Self {
            settings,
            store,
            transcriber,
            scene_writer,
            clip_service,
            assembler,
        }
    }

    /// Wire up the hosted clients and the ffmpeg assembler.
    pub fn with_default_clients(settings: Settings, store: JobStore) -> Self {
        let openai = Arc::new(OpenAiClient::new(&settings));
        let ltx = Arc::new(LtxClient::new(&settings));
        Self::new(
            settings,
            store,
            openai.clone(),
            openai,
            ltx,
            Arc::new(FfmpegAssembler::new()),
        )
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a job to completion, recording its terminal state in the store.
    /// The whole run is bounded by the configured job timeout.
    pub async fn run(&self, job_id: Uuid) {
        let budget = self.settings.job_timeout;
        match tokio::time::timeout(budget, self.execute(job_id)).await {
            Ok(Ok(())) => info!("Job {job_id} completed"),
            Ok(Err(e)) => {
                error!("Job {job_id} failed: {e}");
                self.store.fail(job_id, e.to_string()).await;
            }
            Err(_) => {
                error!("Job {job_id} timed out after {}s", budget.as_secs());
                self.store
                    .fail(job_id, format!("job timed out after {}s", budget.as_secs()))
                    .await;
            }
        }
    }

    async fn execute(&self, job_id: Uuid) -> Result<()> {
        let job = self
            .store
            .get(job_id)
            .await
            .ok_or_else(|| ForgeError::Configuration(format!("unknown job {job_id}")))?;

        let work_dir = self.settings.work_root.join(job_id.to_string());
        tokio::fs::create_dir_all(&work_dir).await?;

        // An unreadable or unsupported upload is a transcription-stage
        // failure; only a missing ffprobe binary stays a configuration error.
        let audio_secs = self
            .assembler
            .probe_duration(&job.audio_path)
            .await
            .map_err(|e| match e {
                ForgeError::Assembly(msg) => ForgeError::Transcription(msg),
                other => other,
            })?;
        info!("Job {job_id}: audio duration {audio_secs:.1}s");

        let plan = if let Some(prompt) = &job.params.prompt_override {
            // Caller-supplied prompt skips transcription and planning.
            self.store
                .advance(
                    job_id,
                    JobStage::GeneratingScenes,
                    20,
                    "Using prompt override",
                )
                .await;
            ScenePlan::single(prompt.clone(), audio_secs)
        } else {
            self.store
                .advance(job_id, JobStage::Transcribing, 10, "Transcribing audio")
                .await;
            let transcript = self.transcriber.transcribe(&job.audio_path).await?;

            self.store
                .advance(
                    job_id,
                    JobStage::GeneratingScenes,
                    20,
                    "Generating scene descriptions",
                )
                .await;
            let style = expand_style(&job.params.style, job.params.style_notes.as_deref());
            self.scene_writer
                .write_scenes(&transcript, &style, audio_secs)
                .await?
        };

        if plan.is_empty() {
            return Err(ForgeError::SceneGeneration(
                "scene plan is empty".to_string(),
            ));
        }

        self.store
            .advance(
                job_id,
                JobStage::GeneratingClips,
                30,
                format!("Generating {} clips", plan.len()),
            )
            .await;
        let clips = self.generate_clips(job_id, &job.params, &plan, &work_dir).await?;

        self.store
            .advance(job_id, JobStage::Assembling, 85, "Assembling final video")
            .await;
        let output = work_dir.join("final.mp4");
        self.assembler
            .assemble(&clips, &job.audio_path, &output)
            .await?;

        self.store.complete(job_id, output).await;
        Ok(())
    }

    /// One clip task per scene, dispatched concurrently under a semaphore
    /// bound. Results are ordered by scene index before returning, so clip
    /// order in the final video always equals plan order.
    async fn generate_clips(
        &self,
        job_id: Uuid,
        params: &GenerationParams,
        plan: &ScenePlan,
        work_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.clip_concurrency.max(1)));
        let finished = Arc::new(AtomicUsize::new(0));
        let total = plan.len();

        let mut tasks: JoinSet<Result<(usize, PathBuf)>> = JoinSet::new();
        for scene in plan.scenes.clone() {
            let semaphore = semaphore.clone();
            let finished = finished.clone();
            let service = self.clip_service.clone();
            let store = self.store.clone();
            let params = params.clone();
            let dest = work_dir.join(format!("clip_{:03}.mp4", scene.index));
            let poll_interval = self.settings.poll_interval;
            let max_poll = self.settings.max_poll;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ForgeError::ClipGeneration("clip scheduler shut down".to_string()))?;

                generate_one_clip(&*service, &scene, &params, &dest, poll_interval, max_poll)
                    .await?;

                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                let progress = 30 + ((done * 50) / total) as u8;
                store
                    .advance(
                        job_id,
                        JobStage::GeneratingClips,
                        progress,
                        format!("Generated clip {done}/{total}"),
                    )
                    .await;

                Ok::<(usize, PathBuf), ForgeError>((scene.index, dest))
            });
        }

        // Dropping the set aborts clips still in flight: the first clip
        // failure returns early here, and a job timeout drops this future
        // mid-poll. Either way no task keeps polling the upstream.
        let mut clips = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| ForgeError::ClipGeneration(format!("clip task panicked: {e}")))?;
            clips.push(result?);
        }

        clips.sort_by_key(|(index, _)| *index);
        Ok(clips.into_iter().map(|(_, path)| path).collect())
    }
}

/// Submit one scene, poll its task within the poll budget, download the
/// finished clip. A task that never reports ready ends in `ClipTimeout`.
async fn generate_one_clip(
    service: &dyn ClipService,
    scene: &Scene,
    params: &GenerationParams,
    dest: &Path,
    poll_interval: Duration,
    max_poll: Duration,
) -> Result<()> {
    let task_id = service
        .submit(&scene.prompt, scene.duration_secs, params)
        .await?;

    let deadline = Instant::now() + max_poll;
    loop {
        tokio::time::sleep(poll_interval).await;
        if Instant::now() >= deadline {
            return Err(ForgeError::ClipTimeout(max_poll.as_secs()));
        }

        match service.poll(&task_id).await? {
            ClipTaskState::Ready(url) => {
                service.download(&url, dest).await?;
                return Ok(());
            }
            ClipTaskState::Failed(reason) => {
                return Err(ForgeError::ClipGeneration(reason));
            }
            ClipTaskState::Pending => {}
        }
    }
}
