use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::StrategyError;
use crate::transcribe::VideoMetadata;
use crate::utils::sanitize_filename;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Result of a successful audio download: the file on disk plus the
/// metadata probed from the source. The caller owns the file's lifetime.
#[derive(Debug)]
pub struct DownloadedAudio {
    pub path: PathBuf,
    pub metadata: VideoMetadata,
}

/// Audio acquisition collaborator for video sources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Probe video metadata without downloading anything.
    async fn probe(&self, video_id: &str) -> Result<VideoMetadata, StrategyError>;

    /// Download the best available audio for the video into `dest_dir`.
    async fn download_audio(
        &self,
        video_id: &str,
        dest_dir: &Path,
    ) -> Result<DownloadedAudio, StrategyError>;
}

/// Downloader backed by the yt-dlp CLI, with ffmpeg-assisted conversion
/// to mp3 when ffmpeg is present and a native-container fallback when
/// it is not.
pub struct YtDlpDownloader;

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self
    }

    /// Check that yt-dlp is installed and runnable.
    pub async fn check_availability() -> bool {
        Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn run_yt_dlp(args: &[&str]) -> Result<Vec<u8>, StrategyError> {
        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .map_err(|e| StrategyError::Download(format!("failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StrategyError::Download(format!(
                "yt-dlp failed: {}",
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn probe(&self, video_id: &str) -> Result<VideoMetadata, StrategyError> {
        let url = format!("{WATCH_URL}{video_id}");
        tracing::debug!("Probing video metadata: {}", url);

        let stdout =
            Self::run_yt_dlp(&["--dump-json", "--no-playlist", "--no-warnings", &url]).await?;

        let info: Value = serde_json::from_slice(&stdout)
            .map_err(|e| StrategyError::Download(format!("invalid yt-dlp metadata: {e}")))?;

        Ok(parse_metadata(&info, video_id))
    }

    async fn download_audio(
        &self,
        video_id: &str,
        dest_dir: &Path,
    ) -> Result<DownloadedAudio, StrategyError> {
        let metadata = self.probe(video_id).await?;

        let url = format!("{WATCH_URL}{video_id}");
        let stem = sanitize_filename(&metadata.title);
        let template = dest_dir.join(format!("{stem}.%(ext)s"));
        let template = template.to_string_lossy().to_string();

        let ffmpeg = Self::ffmpeg_available().await;
        if ffmpeg {
            tracing::info!("Downloading audio (mp3): {}", metadata.title);
            Self::run_yt_dlp(&[
                "-f",
                "bestaudio",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--no-playlist",
                "--no-warnings",
                "-o",
                &template,
                &url,
            ])
            .await?;
        } else {
            // Without ffmpeg we keep whatever container the source offers.
            tracing::warn!("ffmpeg not found, downloading audio in native format");
            Self::run_yt_dlp(&[
                "-f",
                "bestaudio",
                "--no-playlist",
                "--no-warnings",
                "-o",
                &template,
                &url,
            ])
            .await?;
        }

        let path = find_downloaded(dest_dir, &stem).ok_or_else(|| {
            StrategyError::Download(format!(
                "yt-dlp reported success but no file matching '{stem}' exists in {}",
                dest_dir.display()
            ))
        })?;

        Ok(DownloadedAudio { path, metadata })
    }
}

/// Build metadata from a yt-dlp `--dump-json` document. Missing fields
/// degrade to sensible defaults rather than failing the download.
fn parse_metadata(info: &Value, video_id: &str) -> VideoMetadata {
    VideoMetadata {
        video_id: video_id.to_string(),
        title: info["title"]
            .as_str()
            .unwrap_or("Unknown Title")
            .to_string(),
        duration_secs: info["duration"].as_f64(),
        uploader: info["uploader"].as_str().map(str::to_string),
        upload_date: info["upload_date"].as_str().map(str::to_string),
    }
}

/// Locate the file yt-dlp produced. The extension depends on whether
/// ffmpeg converted the audio, so match on the sanitized stem.
fn find_downloaded(dest_dir: &Path, stem: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dest_dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s == stem)
                    .unwrap_or(false)
        })
}
