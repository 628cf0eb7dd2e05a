use async_trait::async_trait;
use forge::api::{ClipService, ClipTaskState, SceneWriter, Transcriber, Transcript};
use forge::config::Settings;
use forge::error::{ForgeError, Result};
use forge::job::{GenerationParams, JobStage, JobStore};
use forge::pipeline::Pipeline;
use forge::scene::{Scene, ScenePlan};
use forge::video::MediaAssembler;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct MockTranscriber {
    fail: bool,
    calls: AtomicUsize,
}

impl MockTranscriber {
    fn ok() -> Arc<Self> {
        Arc::new(Self { fail: false, calls: AtomicUsize::new(0) })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ForgeError::Transcription("unsupported format".to_string()));
        }
        Ok(Transcript::from_text("a story about the sea"))
    }
}

struct MockSceneWriter {
    scenes: usize,
    calls: AtomicUsize,
}

impl MockSceneWriter {
    fn with_scenes(scenes: usize) -> Arc<Self> {
        Arc::new(Self { scenes, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl SceneWriter for MockSceneWriter {
    async fn write_scenes(
        &self,
        _transcript: &Transcript,
        _style: &str,
        _audio_secs: f64,
    ) -> Result<ScenePlan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scenes = (0..self.scenes)
            .map(|index| Scene {
                index,
                prompt: format!("scene {index}"),
                duration_secs: 8,
            })
            .collect();
        Ok(ScenePlan::new(scenes))
    }
}

/// Clip service whose tasks become ready after a per-task number of polls.
/// With `pending_polls` decreasing by scene index, later scenes finish
/// before earlier ones, which exercises result ordering.
struct MockClipService {
    submits: AtomicUsize,
    polls: AtomicUsize,
    never_ready: bool,
    remaining: Mutex<HashMap<String, usize>>,
}

impl MockClipService {
    fn ready_after_staggered_polls() -> Arc<Self> {
        Arc::new(Self {
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            never_ready: false,
            remaining: Mutex::new(HashMap::new()),
        })
    }

    fn never_ready() -> Arc<Self> {
        Arc::new(Self {
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            never_ready: true,
            remaining: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl ClipService for MockClipService {
    async fn submit(
        &self,
        prompt: &str,
        _duration_secs: u32,
        _params: &GenerationParams,
    ) -> Result<String> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let index: usize = prompt
            .rsplit(' ')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let task_id = format!("task-{index}");
        // Scene 0 waits the longest; the last scene is ready immediately.
        self.remaining
            .lock()
            .unwrap()
            .insert(task_id.clone(), 5usize.saturating_sub(index));
        Ok(task_id)
    }

    async fn poll(&self, task_id: &str) -> Result<ClipTaskState> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.never_ready {
            return Ok(ClipTaskState::Pending);
        }
        let mut remaining = self.remaining.lock().unwrap();
        let left = remaining.get_mut(task_id).expect("unknown task polled");
        if *left == 0 {
            Ok(ClipTaskState::Ready(format!("mock://{task_id}")))
        } else {
            *left -= 1;
            Ok(ClipTaskState::Pending)
        }
    }

    async fn download(&self, _url: &str, dest: &Path) -> Result<()> {
        tokio::fs::write(dest, b"clip").await?;
        Ok(())
    }
}

struct MockAssembler {
    probe_fails: bool,
    clips_seen: Mutex<Vec<PathBuf>>,
}

impl MockAssembler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            probe_fails: false,
            clips_seen: Mutex::new(Vec::new()),
        })
    }

    fn failing_probe() -> Arc<Self> {
        Arc::new(Self {
            probe_fails: true,
            clips_seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MediaAssembler for MockAssembler {
    async fn probe_duration(&self, audio: &Path) -> Result<f64> {
        if self.probe_fails {
            return Err(ForgeError::Assembly(format!(
                "unreadable duration for {}",
                audio.display()
            )));
        }
        Ok(120.0)
    }

    async fn assemble(&self, clips: &[PathBuf], _audio: &Path, output: &Path) -> Result<()> {
        *self.clips_seen.lock().unwrap() = clips.to_vec();
        tokio::fs::write(output, b"video").await?;
        Ok(())
    }
}

struct Harness {
    _work: tempfile::TempDir,
    store: JobStore,
    pipeline: Pipeline,
    transcriber: Arc<MockTranscriber>,
    scene_writer: Arc<MockSceneWriter>,
    clip_service: Arc<MockClipService>,
    assembler: Arc<MockAssembler>,
}

fn harness(
    transcriber: Arc<MockTranscriber>,
    scene_writer: Arc<MockSceneWriter>,
    clip_service: Arc<MockClipService>,
    assembler: Arc<MockAssembler>,
    max_poll: Duration,
    job_timeout: Duration,
) -> Harness {
    let work = tempfile::tempdir().unwrap();
    let settings = Settings {
        poll_interval: Duration::from_millis(1),
        max_poll,
        clip_concurrency: 2,
        job_timeout,
        work_root: work.path().to_path_buf(),
        ..Settings::default()
    };
    let store = JobStore::new();
    let pipeline = Pipeline::new(
        settings,
        store.clone(),
        transcriber.clone(),
        scene_writer.clone(),
        clip_service.clone(),
        assembler.clone(),
    );
    Harness {
        _work: work,
        store,
        pipeline,
        transcriber,
        scene_writer,
        clip_service,
        assembler,
    }
}

#[tokio::test]
async fn successful_run_ends_done_with_ordered_clips() {
    let h = harness(
        MockTranscriber::ok(),
        MockSceneWriter::with_scenes(5),
        MockClipService::ready_after_staggered_polls(),
        MockAssembler::new(),
        Duration::from_secs(5),
        Duration::from_secs(10),
    );

    let job = h.store.create("in.mp3".into(), GenerationParams::default()).await;
    h.pipeline.run(job.id).await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.stage, JobStage::Done);
    assert_eq!(job.progress, 100);
    let output = job.output_path.expect("done job must carry an output file");
    assert!(output.exists());

    // Clip order equals scene order even though later scenes finished first.
    let clips = h.assembler.clips_seen.lock().unwrap().clone();
    assert_eq!(clips.len(), 5);
    for (i, clip) in clips.iter().enumerate() {
        let name = clip.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("clip_{i:03}.mp4"));
        assert!(clip.exists());
    }
}

#[tokio::test]
async fn transcription_failure_never_reaches_scene_generation() {
    let h = harness(
        MockTranscriber::failing(),
        MockSceneWriter::with_scenes(5),
        MockClipService::ready_after_staggered_polls(),
        MockAssembler::new(),
        Duration::from_secs(5),
        Duration::from_secs(10),
    );

    let job = h.store.create("in.mp3".into(), GenerationParams::default()).await;
    h.pipeline.run(job.id).await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.error.unwrap().contains("transcription failed"));
    assert_eq!(h.scene_writer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.clip_service.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_scene_plan_is_rejected_before_any_clip_request() {
    let h = harness(
        MockTranscriber::ok(),
        MockSceneWriter::with_scenes(0),
        MockClipService::ready_after_staggered_polls(),
        MockAssembler::new(),
        Duration::from_secs(5),
        Duration::from_secs(10),
    );

    let job = h.store.create("in.mp3".into(), GenerationParams::default()).await;
    h.pipeline.run(job.id).await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.error.unwrap().contains("scene plan is empty"));
    assert_eq!(h.clip_service.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn never_ready_clip_task_fails_with_timeout() {
    let h = harness(
        MockTranscriber::ok(),
        MockSceneWriter::with_scenes(2),
        MockClipService::never_ready(),
        MockAssembler::new(),
        Duration::from_millis(20),
        Duration::from_secs(10),
    );

    let job = h.store.create("in.mp3".into(), GenerationParams::default()).await;
    h.pipeline.run(job.id).await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn terminal_status_is_stable_under_late_updates() {
    let h = harness(
        MockTranscriber::ok(),
        MockSceneWriter::with_scenes(4),
        MockClipService::ready_after_staggered_polls(),
        MockAssembler::new(),
        Duration::from_secs(5),
        Duration::from_secs(10),
    );

    let job = h.store.create("in.mp3".into(), GenerationParams::default()).await;
    h.pipeline.run(job.id).await;

    let first = h.store.get(job.id).await.unwrap();
    assert_eq!(first.stage, JobStage::Done);

    // A straggling stage update and a late failure must both be ignored.
    h.store
        .advance(job.id, JobStage::GeneratingClips, 50, "late update")
        .await;
    h.store.fail(job.id, "late failure").await;

    let second = h.store.get(job.id).await.unwrap();
    assert_eq!(second.stage, JobStage::Done);
    assert!(second.error.is_none());
    assert_eq!(first.updated_at, second.updated_at);
}

#[tokio::test]
async fn prompt_override_skips_transcription_and_planning() {
    let h = harness(
        MockTranscriber::ok(),
        MockSceneWriter::with_scenes(5),
        MockClipService::ready_after_staggered_polls(),
        MockAssembler::new(),
        Duration::from_secs(5),
        Duration::from_secs(10),
    );

    let params = GenerationParams {
        prompt_override: Some("scene 0".to_string()),
        ..GenerationParams::default()
    };
    let job = h.store.create("in.mp3".into(), params).await;
    h.pipeline.run(job.id).await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.stage, JobStage::Done);
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.scene_writer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.clip_service.submits.load(Ordering::SeqCst), 1);
    assert_eq!(h.assembler.clips_seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn job_timeout_abandons_clip_polling() {
    // Per-clip poll budget far beyond the job budget: only the job timeout
    // can end this run, and ending it must stop the in-flight poll loops.
    let h = harness(
        MockTranscriber::ok(),
        MockSceneWriter::with_scenes(3),
        MockClipService::never_ready(),
        MockAssembler::new(),
        Duration::from_secs(5),
        Duration::from_millis(50),
    );

    let job = h.store.create("in.mp3".into(), GenerationParams::default()).await;
    h.pipeline.run(job.id).await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.error.unwrap().contains("timed out"));

    // Let the aborts land, then verify polling has stopped for good.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let settled = h.clip_service.polls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.clip_service.polls.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn unreadable_audio_fails_as_a_transcription_error() {
    let h = harness(
        MockTranscriber::ok(),
        MockSceneWriter::with_scenes(3),
        MockClipService::ready_after_staggered_polls(),
        MockAssembler::failing_probe(),
        Duration::from_secs(5),
        Duration::from_secs(10),
    );

    let job = h.store.create("corrupt.mp3".into(), GenerationParams::default()).await;
    h.pipeline.run(job.id).await;

    let job = h.store.get(job.id).await.unwrap();
    assert_eq!(job.stage, JobStage::Failed);
    let error = job.error.unwrap();
    assert!(error.contains("transcription failed"));
    assert!(!error.contains("assembly failed"));
    assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.clip_service.submits.load(Ordering::SeqCst), 0);
}
