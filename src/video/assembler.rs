use crate::error::{ForgeError, Result};
use crate::video::MediaAssembler;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

/// Assembles the final video by shelling out to ffmpeg/ffprobe: concat
/// demuxer over the ordered clip list, then an audio merge trimmed to the
/// shorter stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegAssembler;

impl FfmpegAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Concat-demuxer input list: one absolute path per line.
    fn concat_list(clips: &[PathBuf]) -> Result<String> {
        let mut content = String::new();
        for clip in clips {
            let abs = clip.canonicalize().map_err(|e| {
                ForgeError::Assembly(format!("cannot resolve clip {}: {e}", clip.display()))
            })?;
            content.push_str(&format!("file '{}'\n", abs.display()));
        }
        Ok(content)
    }

    async fn run(tool: &str, args: &[&str], what: &str) -> Result<Vec<u8>> {
        let output = Command::new(tool).args(args).output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ForgeError::Configuration(format!("{tool} not found on PATH"))
            } else {
                ForgeError::Assembly(format!("failed to run {tool}: {e}"))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForgeError::Assembly(format!("{what} failed: {stderr}")));
        }
        Ok(output.stdout)
    }

    async fn concat(&self, list_file: &Path, output: &Path) -> Result<()> {
        info!("Concatenating clips into {}", output.display());
        let list = list_file.to_string_lossy().into_owned();
        let out = output.to_string_lossy().into_owned();
        Self::run(
            "ffmpeg",
            &["-y", "-f", "concat", "-safe", "0", "-i", &list, "-c", "copy", &out],
            "concat",
        )
        .await?;
        Ok(())
    }

    async fn merge_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        info!("Merging audio track into {}", output.display());
        let video = video.to_string_lossy().into_owned();
        let audio = audio.to_string_lossy().into_owned();
        let out = output.to_string_lossy().into_owned();
        Self::run(
            "ffmpeg",
            &[
                "-y", "-i", &video, "-i", &audio, "-map", "0:v:0", "-map", "1:a:0", "-c:v",
                "copy", "-c:a", "aac", "-shortest", &out,
            ],
            "audio merge",
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MediaAssembler for FfmpegAssembler {
    async fn probe_duration(&self, audio: &Path) -> Result<f64> {
        let path = audio.to_string_lossy().into_owned();
        let stdout = Self::run(
            "ffprobe",
            &[
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                &path,
            ],
            "ffprobe",
        )
        .await?;

        String::from_utf8_lossy(&stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| {
                ForgeError::Assembly(format!("unreadable duration for {}: {e}", audio.display()))
            })
    }

    async fn assemble(&self, clips: &[PathBuf], audio: &Path, output: &Path) -> Result<()> {
        if clips.is_empty() {
            return Err(ForgeError::Assembly("no clips to assemble".to_string()));
        }

        let work_dir = output
            .parent()
            .ok_or_else(|| ForgeError::Assembly("output path has no parent".to_string()))?;
        let list_file = work_dir.join("concat_list.txt");
        let merged = work_dir.join("concatenated.mp4");

        tokio::fs::write(&list_file, Self::concat_list(clips)?).await?;
        self.concat(&list_file, &merged).await?;
        self.merge_audio(&merged, audio, output).await?;

        info!("Assembly complete: {}", output.display());

        tokio::fs::remove_file(&list_file).await.ok();
        tokio::fs::remove_file(&merged).await.ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_list_preserves_clip_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut clips = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("clip_{i:03}.mp4"));
            std::fs::write(&path, b"x").unwrap();
            clips.push(path);
        }

        let list = FfmpegAssembler::concat_list(&clips).unwrap();
        let lines: Vec<&str> = list.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("clip_000.mp4"));
        assert!(lines[1].contains("clip_001.mp4"));
        assert!(lines[2].contains("clip_002.mp4"));
        assert!(lines.iter().all(|l| l.starts_with("file '")));
    }

    #[test]
    fn concat_list_rejects_missing_clips() {
        let clips = vec![PathBuf::from("/definitely/not/here.mp4")];
        let err = FfmpegAssembler::concat_list(&clips).unwrap_err();
        assert!(matches!(err, ForgeError::Assembly(_)));
    }
}
