pub mod captions;
pub mod download;
pub mod local;
pub mod remote;
pub mod resolver;

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::config::{Config, OPENAI_API_KEY_ENV};
use crate::error::{AggregatedFailure, AttemptFailure, Strategy, StrategyError, TranscribeError};
use crate::utils::{check_file_accessible, ScopedDir};

use captions::{join_fragments, CaptionProvider, YoutubeCaptionProvider};
use download::{MediaDownloader, YtDlpDownloader};
use local::{LocalTranscriber, SpeechEngine, WhisperRuntime};
use remote::{OpenAiSpeechClient, RemoteSpeech};

pub use resolver::extract_video_id;

/// Which strategy actually produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    CaptionApi,
    LocalModel,
    RemoteApi,
}

/// Source metadata probed alongside a download.
#[derive(Debug, Clone, Serialize)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub duration_secs: Option<f64>,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
}

/// A completed transcription. `provenance` always names the strategy that
/// produced `text`; metadata is present only when the source was probed.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub provenance: Provenance,
    pub metadata: Option<VideoMetadata>,
}

/// Orchestrates transcript acquisition over the fallback chain. Each
/// applicable strategy is attempted at most once, cheapest first; the
/// first success wins and later strategies are never touched.
pub struct TranscriptionPipeline {
    captions: Arc<dyn CaptionProvider>,
    downloader: Arc<dyn MediaDownloader>,
    local: Arc<dyn SpeechEngine>,
    remote: Arc<dyn RemoteSpeech>,
    caption_timeout: Duration,
    languages: Vec<String>,
    temp_dir: TempDir,
}

impl TranscriptionPipeline {
    pub fn new(config: &Config) -> crate::Result<Self> {
        let model_path = config.whisper_model_path()?;
        let language = config
            .transcription
            .languages
            .first()
            .cloned()
            .unwrap_or_else(|| "en".to_string());

        Self::with_parts(
            Arc::new(YoutubeCaptionProvider::new()),
            Arc::new(YtDlpDownloader::new()),
            Arc::new(LocalTranscriber::new(WhisperRuntime, model_path, language)),
            Arc::new(OpenAiSpeechClient::new(
                config.openai.api_key.clone(),
                config.openai.endpoint.clone(),
                config.openai.speech_model.clone(),
            )),
            Duration::from_secs(config.transcription.caption_timeout_secs),
            config.transcription.languages.clone(),
        )
    }

    /// Assemble a pipeline from explicit collaborators.
    pub fn with_parts(
        captions: Arc<dyn CaptionProvider>,
        downloader: Arc<dyn MediaDownloader>,
        local: Arc<dyn SpeechEngine>,
        remote: Arc<dyn RemoteSpeech>,
        caption_timeout: Duration,
        languages: Vec<String>,
    ) -> crate::Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self {
            captions,
            downloader,
            local,
            remote,
            caption_timeout,
            languages,
            temp_dir,
        })
    }

    /// Transcribe a video URL: caption API first, then audio download fed
    /// to the local model. A malformed URL fails before any strategy runs.
    pub async fn transcribe_from_video_url(
        &self,
        url: &str,
    ) -> Result<TranscriptionResult, TranscribeError> {
        let video_id = resolver::extract_video_id(url)?;
        let mut attempts = Vec::new();

        // Cheapest first: the caption fetch runs under a hard deadline so a
        // hung provider cannot stall the whole request. Only our wait is
        // cancelled on expiry; the provider-side call may still complete.
        let fetch = self.captions.fetch(&video_id, &self.languages);
        match tokio::time::timeout(self.caption_timeout, fetch).await {
            Ok(Ok(fragments)) if !fragments.is_empty() => {
                tracing::info!(video_id = %video_id, "Transcript acquired from caption API");
                return Ok(TranscriptionResult {
                    text: join_fragments(&fragments),
                    provenance: Provenance::CaptionApi,
                    metadata: None,
                });
            }
            Ok(Ok(_)) => attempts.push(AttemptFailure {
                strategy: Strategy::CaptionApi,
                error: StrategyError::CaptionsUnavailable(
                    "provider returned an empty caption track".to_string(),
                ),
            }),
            Ok(Err(error)) => {
                tracing::debug!(video_id = %video_id, %error, "Caption strategy failed, falling back");
                attempts.push(AttemptFailure {
                    strategy: Strategy::CaptionApi,
                    error,
                });
            }
            Err(_) => {
                let secs = self.caption_timeout.as_secs();
                tracing::debug!(video_id = %video_id, "Caption fetch timed out after {}s", secs);
                attempts.push(AttemptFailure {
                    strategy: Strategy::CaptionApi,
                    error: StrategyError::CaptionTimeout(secs),
                });
            }
        }

        // Each request downloads into its own directory: two concurrent
        // requests for the same video must not share or overwrite files.
        // The directory and everything in it go away with the guard.
        let workdir = ScopedDir::new(
            self.temp_dir
                .path()
                .join(uuid::Uuid::new_v4().to_string()),
        );
        if let Err(e) = fs_err::create_dir_all(workdir.path()) {
            attempts.push(AttemptFailure {
                strategy: Strategy::LocalModel,
                error: StrategyError::Download(format!("cannot create work directory: {e}")),
            });
            return Err(AggregatedFailure::new(attempts).into());
        }

        match self
            .downloader
            .download_audio(&video_id, workdir.path())
            .await
        {
            Ok(downloaded) => {
                match self.local.transcribe(&downloaded.path).await {
                    Ok(text) => {
                        tracing::info!(video_id = %video_id, "Transcript acquired from local model");
                        return Ok(TranscriptionResult {
                            text,
                            provenance: Provenance::LocalModel,
                            metadata: Some(downloaded.metadata),
                        });
                    }
                    Err(error) => attempts.push(AttemptFailure {
                        strategy: Strategy::LocalModel,
                        error,
                    }),
                }
            }
            Err(error) => attempts.push(AttemptFailure {
                strategy: Strategy::LocalModel,
                error,
            }),
        }

        Err(AggregatedFailure::new(attempts).into())
    }

    /// Transcribe an uploaded audio file: local model first, then the
    /// remote API. The remote credential is checked before any upload so
    /// a configuration gap surfaces as such, not as a transport failure.
    pub async fn transcribe_from_audio_file(
        &self,
        audio: &Path,
    ) -> Result<TranscriptionResult, TranscribeError> {
        check_file_accessible(audio)
            .map_err(|e| TranscribeError::UnreadableInput(e.to_string()))?;

        let mut attempts = Vec::new();

        match self.local.transcribe(audio).await {
            Ok(text) => {
                tracing::info!(path = %audio.display(), "Transcript acquired from local model");
                return Ok(TranscriptionResult {
                    text,
                    provenance: Provenance::LocalModel,
                    metadata: None,
                });
            }
            Err(error) => {
                tracing::debug!(path = %audio.display(), %error, "Local strategy failed, falling back");
                attempts.push(AttemptFailure {
                    strategy: Strategy::LocalModel,
                    error,
                });
            }
        }

        if !self.remote.is_configured() {
            return Err(TranscribeError::MissingCredential(OPENAI_API_KEY_ENV));
        }

        match self.remote.transcribe(audio).await {
            Ok(text) => {
                tracing::info!(path = %audio.display(), "Transcript acquired from remote API");
                Ok(TranscriptionResult {
                    text,
                    provenance: Provenance::RemoteApi,
                    metadata: None,
                })
            }
            Err(error) => {
                attempts.push(AttemptFailure {
                    strategy: Strategy::RemoteApi,
                    error,
                });
                Err(AggregatedFailure::new(attempts).into())
            }
        }
    }
}
