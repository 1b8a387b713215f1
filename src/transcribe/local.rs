use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::OnceCell;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::StrategyError;

const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Local speech-to-text collaborator as seen by the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Transcribe an audio file with the local model.
    async fn transcribe(&self, audio: &Path) -> Result<String, StrategyError>;
}

/// A loaded speech model. Construction is expensive (reads the full model
/// from disk), so exactly one handle is built per process and shared.
pub struct SpeechModelHandle {
    model_name: String,
    context: Option<WhisperContext>,
}

impl SpeechModelHandle {
    fn from_context(model_name: String, context: WhisperContext) -> Self {
        Self {
            model_name,
            context: Some(context),
        }
    }

    /// Name of the model this handle was built from.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[cfg(test)]
    pub fn stub(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            context: None,
        }
    }
}

/// Blocking model runtime: loads a model file and runs inference over
/// decoded samples. Callers run these on a blocking thread.
#[cfg_attr(test, mockall::automock)]
pub trait ModelRuntime: Send + Sync + 'static {
    fn load(&self, model_path: &Path) -> Result<SpeechModelHandle, StrategyError>;

    fn infer(
        &self,
        handle: &SpeechModelHandle,
        samples: &[f32],
        language: &str,
    ) -> Result<String, StrategyError>;
}

/// whisper.cpp runtime via whisper-rs.
pub struct WhisperRuntime;

impl ModelRuntime for WhisperRuntime {
    fn load(&self, model_path: &Path) -> Result<SpeechModelHandle, StrategyError> {
        let path_str = model_path.to_string_lossy();
        tracing::info!("Loading speech model: {}", path_str);

        let context = WhisperContext::new_with_params(&path_str, WhisperContextParameters::default())
            .map_err(|e| {
                StrategyError::ModelLoad(format!("cannot load model {path_str}: {e}"))
            })?;

        let model_name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(SpeechModelHandle::from_context(model_name, context))
    }

    fn infer(
        &self,
        handle: &SpeechModelHandle,
        samples: &[f32],
        language: &str,
    ) -> Result<String, StrategyError> {
        let context = handle
            .context
            .as_ref()
            .ok_or_else(|| StrategyError::Inference("model handle has no context".to_string()))?;

        let mut state = context
            .create_state()
            .map_err(|e| StrategyError::Inference(format!("cannot create decode state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| StrategyError::Inference(format!("decoding failed: {e}")))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| StrategyError::Inference(format!("cannot read segments: {e}")))?;

        let mut text = String::new();
        for i in 0..num_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| StrategyError::Inference(format!("cannot read segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }
}

/// Local transcription strategy. The model is loaded lazily on first use
/// and shared across requests; concurrent first calls synchronize on one
/// load. The model name is pinned by whichever call loads first, even if
/// configuration changes afterwards.
pub struct LocalTranscriber<R: ModelRuntime> {
    runtime: Arc<R>,
    model_path: PathBuf,
    language: String,
    handle: OnceCell<Arc<SpeechModelHandle>>,
}

impl<R: ModelRuntime> LocalTranscriber<R> {
    pub fn new(runtime: R, model_path: PathBuf, language: String) -> Self {
        Self {
            runtime: Arc::new(runtime),
            model_path,
            language,
            handle: OnceCell::new(),
        }
    }

    /// Get the shared model handle, loading it on first call. A failed
    /// load leaves the cell empty so a later request can retry.
    async fn model(&self) -> Result<Arc<SpeechModelHandle>, StrategyError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                let runtime = Arc::clone(&self.runtime);
                let path = self.model_path.clone();
                let loaded = tokio::task::spawn_blocking(move || runtime.load(&path))
                    .await
                    .map_err(|e| {
                        StrategyError::ModelLoad(format!("model load task failed: {e}"))
                    })??;
                Ok::<_, StrategyError>(Arc::new(loaded))
            })
            .await?;

        Ok(Arc::clone(handle))
    }
}

#[async_trait]
impl<R: ModelRuntime> SpeechEngine for LocalTranscriber<R> {
    async fn transcribe(&self, audio: &Path) -> Result<String, StrategyError> {
        let handle = self.model().await?;
        tracing::debug!(
            "Transcribing {} with local model '{}'",
            audio.display(),
            handle.model_name()
        );

        let samples = decode_samples(audio).await?;

        let runtime = Arc::clone(&self.runtime);
        let language = self.language.clone();
        tokio::task::spawn_blocking(move || runtime.infer(&handle, &samples, &language))
            .await
            .map_err(|e| StrategyError::Inference(format!("inference task failed: {e}")))?
    }
}

/// Decode an audio file into 16kHz mono f32 samples. Files already in
/// that shape are read directly; anything else goes through ffmpeg.
async fn decode_samples(audio: &Path) -> Result<Vec<f32>, StrategyError> {
    let direct = {
        let path = audio.to_path_buf();
        tokio::task::spawn_blocking(move || read_wav_if_native(&path))
            .await
            .map_err(|e| StrategyError::Inference(format!("decode task failed: {e}")))?
    };

    if let Some(samples) = direct {
        return Ok(samples);
    }

    let converted = convert_to_wav(audio).await?;
    let path = converted.to_path_buf();
    let samples = tokio::task::spawn_blocking(move || read_wav_f32(&path))
        .await
        .map_err(|e| StrategyError::Inference(format!("decode task failed: {e}")))??;

    // converted drops here, removing the intermediate wav
    Ok(samples)
}

/// Fast path: returns samples only if the file is already a 16kHz mono
/// wav that hound can read.
fn read_wav_if_native(path: &Path) -> Option<Vec<f32>> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate != TARGET_SAMPLE_RATE || spec.channels != 1 {
        return None;
    }
    read_wav_f32(path).ok()
}

fn read_wav_f32(path: &Path) -> Result<Vec<f32>, StrategyError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| StrategyError::Inference(format!("cannot read wav: {e}")))?;
    let spec = reader.spec();

    if spec.sample_rate != TARGET_SAMPLE_RATE || spec.channels != 1 {
        return Err(StrategyError::Inference(format!(
            "unexpected sample spec: {}Hz, {} channel(s)",
            spec.sample_rate, spec.channels
        )));
    }

    match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StrategyError::Inference(format!("corrupt wav data: {e}"))),
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StrategyError::Inference(format!("corrupt wav data: {e}"))),
    }
}

/// Convert arbitrary audio to 16kHz mono pcm wav via ffmpeg. The returned
/// path deletes its file on drop.
async fn convert_to_wav(input: &Path) -> Result<tempfile::TempPath, StrategyError> {
    let temp = tempfile::Builder::new()
        .suffix(".wav")
        .tempfile()
        .map_err(|e| StrategyError::Inference(format!("cannot create temp wav: {e}")))?
        .into_temp_path();

    let output = Command::new("ffmpeg")
        .args([
            "-y",
            "-i",
            &input.to_string_lossy(),
            "-ar",
            "16000",
            "-ac",
            "1",
            "-acodec",
            "pcm_s16le",
            &temp.to_string_lossy(),
        ])
        .output()
        .await
        .map_err(|e| StrategyError::Inference(format!("failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StrategyError::Inference(format!(
            "ffmpeg conversion failed: {}",
            stderr.trim()
        )));
    }

    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..800u32 {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn concurrent_first_calls_load_the_model_once() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("lecture.wav");
        write_test_wav(&audio, TARGET_SAMPLE_RATE, 1);

        let mut runtime = MockModelRuntime::new();
        runtime
            .expect_load()
            .times(1)
            .returning(|_| Ok(SpeechModelHandle::stub("base.en")));
        runtime
            .expect_infer()
            .times(2)
            .returning(|_, _, _| Ok("hello from the model".to_string()));

        let transcriber = Arc::new(LocalTranscriber::new(
            runtime,
            PathBuf::from("/models/ggml-base.en.bin"),
            "en".to_string(),
        ));

        let a = Arc::clone(&transcriber);
        let b = Arc::clone(&transcriber);
        let audio_a = audio.clone();
        let audio_b = audio.clone();

        let (first, second) = tokio::join!(
            async move { a.transcribe(&audio_a).await },
            async move { b.transcribe(&audio_b).await },
        );

        assert_eq!(first.unwrap(), "hello from the model");
        assert_eq!(second.unwrap(), "hello from the model");
    }

    #[tokio::test]
    async fn failed_load_leaves_cell_empty_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("lecture.wav");
        write_test_wav(&audio, TARGET_SAMPLE_RATE, 1);

        let mut runtime = MockModelRuntime::new();
        let mut loads = 0;
        runtime.expect_load().times(2).returning(move |_| {
            loads += 1;
            if loads == 1 {
                Err(StrategyError::ModelLoad("file missing".to_string()))
            } else {
                Ok(SpeechModelHandle::stub("base.en"))
            }
        });
        runtime
            .expect_infer()
            .times(1)
            .returning(|_, _, _| Ok("recovered".to_string()));

        let transcriber = LocalTranscriber::new(
            runtime,
            PathBuf::from("/models/ggml-base.en.bin"),
            "en".to_string(),
        );

        let err = transcriber.transcribe(&audio).await.unwrap_err();
        assert!(matches!(err, StrategyError::ModelLoad(_)));

        assert_eq!(transcriber.transcribe(&audio).await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn inference_errors_surface_as_inference() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("lecture.wav");
        write_test_wav(&audio, TARGET_SAMPLE_RATE, 1);

        let mut runtime = MockModelRuntime::new();
        runtime
            .expect_load()
            .returning(|_| Ok(SpeechModelHandle::stub("base.en")));
        runtime
            .expect_infer()
            .returning(|_, _, _| Err(StrategyError::Inference("garbled audio".to_string())));

        let transcriber = LocalTranscriber::new(
            runtime,
            PathBuf::from("/models/ggml-base.en.bin"),
            "en".to_string(),
        );

        let err = transcriber.transcribe(&audio).await.unwrap_err();
        assert!(matches!(err, StrategyError::Inference(_)));
    }

    #[test]
    fn native_wav_fast_path_requires_target_spec() {
        let dir = tempfile::tempdir().unwrap();

        let native = dir.path().join("native.wav");
        write_test_wav(&native, TARGET_SAMPLE_RATE, 1);
        assert!(read_wav_if_native(&native).is_some());

        let stereo = dir.path().join("stereo.wav");
        write_test_wav(&stereo, TARGET_SAMPLE_RATE, 2);
        assert!(read_wav_if_native(&stereo).is_none());

        let wrong_rate = dir.path().join("cd.wav");
        write_test_wav(&wrong_rate, 44_100, 1);
        assert!(read_wav_if_native(&wrong_rate).is_none());
    }

    #[test]
    fn int_samples_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("norm.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(i16::MIN).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        let samples = read_wav_f32(&path).unwrap();
        assert_eq!(samples, vec![-1.0, 0.0]);
    }
}
