use anyhow::Context;
use clap::{Parser, Subcommand};
use forge::config::{ensure_external_tools, Settings};
use forge::job::{GenerationParams, JobStage, JobStore};
use forge::pipeline::Pipeline;
use forge::server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(about = "Audio-to-video generation service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST API and web UI
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
    },
    /// Generate one video in the foreground
    Run {
        /// Input audio file
        #[arg(short, long)]
        audio: PathBuf,

        /// Style preset name or free-text style description
        #[arg(short, long, default_value = "Cinematic Stock Footage")]
        style: String,

        /// Extra style notes appended to the style description
        #[arg(long)]
        style_notes: Option<String>,

        /// Skip transcription and use this prompt for a single clip
        #[arg(long)]
        prompt_override: Option<String>,

        /// Video generation model
        #[arg(long)]
        model: Option<String>,

        /// Clip resolution, e.g. 1920x1080
        #[arg(long)]
        resolution: Option<String>,

        /// Clip frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Output video file path
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = Settings::from_env().context("failed to load configuration")?;
    ensure_external_tools().context("external media tools unavailable")?;
    tokio::fs::create_dir_all(&settings.work_root)
        .await
        .context("failed to create work directory")?;

    match cli.command {
        Command::Serve { bind } => {
            let pipeline = Arc::new(Pipeline::with_default_clients(settings, JobStore::new()));
            server::serve(pipeline, &bind).await?;
        }
        Command::Run {
            audio,
            style,
            style_notes,
            prompt_override,
            model,
            resolution,
            fps,
            output,
        } => {
            let mut params = GenerationParams {
                style,
                style_notes,
                prompt_override,
                ..GenerationParams::default()
            };
            if let Some(model) = model {
                params.model = model;
            }
            if let Some(resolution) = resolution {
                params.resolution = resolution;
            }
            if let Some(fps) = fps {
                params.fps = fps;
            }

            run_once(settings, audio, params, output).await?;
        }
    }

    Ok(())
}

async fn run_once(
    settings: Settings,
    audio: PathBuf,
    params: GenerationParams,
    output: PathBuf,
) -> anyhow::Result<()> {
    let audio = audio
        .canonicalize()
        .with_context(|| format!("cannot read audio file {}", audio.display()))?;

    let store = JobStore::new();
    let pipeline = Pipeline::with_default_clients(settings, store.clone());

    let job = store.create(audio, params).await;
    info!("Starting job {}", job.id);
    pipeline.run(job.id).await;

    let job = store
        .get(job.id)
        .await
        .context("job vanished from the store")?;
    match job.stage {
        JobStage::Done => {
            let produced = job.output_path.context("done job has no output file")?;
            tokio::fs::copy(&produced, &output)
                .await
                .with_context(|| format!("failed to copy result to {}", output.display()))?;
            info!("Video written to {}", output.display());
            Ok(())
        }
        _ => anyhow::bail!(
            "generation failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}
