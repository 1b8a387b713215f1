use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;

use crate::error::StrategyError;

/// Remote speech-to-text collaborator. Configuration is checkable without
/// a network call so the orchestrator can fail fast on a missing
/// credential instead of attempting a doomed request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSpeech: Send + Sync {
    /// Whether a credential is present.
    fn is_configured(&self) -> bool;

    /// Upload the audio file and return its transcript.
    async fn transcribe(&self, audio: &Path) -> Result<String, StrategyError>;
}

/// OpenAI transcription endpoint client.
pub struct OpenAiSpeechClient {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl OpenAiSpeechClient {
    pub fn new(api_key: Option<String>, endpoint: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint,
            model,
        }
    }
}

#[async_trait]
impl RemoteSpeech for OpenAiSpeechClient {
    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, StrategyError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| StrategyError::RemoteAuth("no API credential configured".to_string()))?;

        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| StrategyError::RemoteTransport(format!("cannot read audio file: {e}")))?;

        let filename = audio
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("audio")
            .to_string();

        tracing::debug!(
            "Uploading {} ({} bytes) for remote transcription",
            filename,
            bytes.len()
        );

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "text");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.endpoint))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StrategyError::RemoteTransport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StrategyError::RemoteTransport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        Ok(body.trim().to_string())
    }
}

/// Map an unsuccessful HTTP status onto the strategy error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> StrategyError {
    let detail = format!("{status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StrategyError::RemoteAuth(detail),
        StatusCode::TOO_MANY_REQUESTS => StrategyError::RemoteQuota(detail),
        _ => StrategyError::RemoteTransport(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_only_with_nonempty_key() {
        let client = OpenAiSpeechClient::new(
            Some("sk-test".to_string()),
            "https://api.openai.com/v1".to_string(),
            "whisper-1".to_string(),
        );
        assert!(client.is_configured());

        let unset = OpenAiSpeechClient::new(
            None,
            "https://api.openai.com/v1".to_string(),
            "whisper-1".to_string(),
        );
        assert!(!unset.is_configured());

        let empty = OpenAiSpeechClient::new(
            Some(String::new()),
            "https://api.openai.com/v1".to_string(),
            "whisper-1".to_string(),
        );
        assert!(!empty.is_configured());
    }

    #[test]
    fn status_codes_map_to_the_taxonomy() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            StrategyError::RemoteAuth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "denied"),
            StrategyError::RemoteAuth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            StrategyError::RemoteQuota(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            StrategyError::RemoteTransport(_)
        ));
    }

    #[tokio::test]
    async fn unconfigured_client_refuses_without_io() {
        let client = OpenAiSpeechClient::new(
            None,
            "https://api.openai.com/v1".to_string(),
            "whisper-1".to_string(),
        );
        let err = client
            .transcribe(Path::new("/no/such/audio.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::RemoteAuth(_)));
    }
}
