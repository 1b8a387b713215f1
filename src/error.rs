use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// One transcript-acquisition method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CaptionApi,
    LocalModel,
    RemoteApi,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CaptionApi => write!(f, "caption API"),
            Strategy::LocalModel => write!(f, "local model"),
            Strategy::RemoteApi => write!(f, "remote API"),
        }
    }
}

/// Failure of a single strategy attempt. These never reach API clients
/// directly; the orchestrator records them and either falls back or folds
/// them into an [`AggregatedFailure`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StrategyError {
    /// The provider has no captions in any requested language. Expected and
    /// non-fatal; always triggers fallback.
    #[error("no captions available: {0}")]
    CaptionsUnavailable(String),

    /// The caption fetch exceeded its deadline. Only the local wait is
    /// cancelled; the provider-side request may still complete.
    #[error("caption fetch timed out after {0}s")]
    CaptionTimeout(u64),

    /// Caption track resolution or transport failed for another reason.
    #[error("caption fetch failed: {0}")]
    CaptionFetch(String),

    /// Audio download collaborator failed.
    #[error("audio download failed: {0}")]
    Download(String),

    /// The speech model could not be loaded at all.
    #[error("speech model failed to load: {0}")]
    ModelLoad(String),

    /// The model loaded but this particular audio could not be processed.
    #[error("local transcription failed: {0}")]
    Inference(String),

    /// Remote API rejected the credential.
    #[error("remote transcription auth failure: {0}")]
    RemoteAuth(String),

    /// Remote API reported quota exhaustion.
    #[error("remote transcription quota exhausted: {0}")]
    RemoteQuota(String),

    /// Remote API transport or server failure.
    #[error("remote transcription transport failure: {0}")]
    RemoteTransport(String),
}

/// One failed strategy attempt, as recorded in an [`AggregatedFailure`].
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub strategy: Strategy,
    pub error: StrategyError,
}

/// Every applicable strategy was attempted and failed. This is the only
/// error shape a fully-exhausted transcription request surfaces: one
/// human-readable message enumerating what was tried and why it failed,
/// never a raw provider error.
#[derive(Debug, Clone)]
pub struct AggregatedFailure {
    pub attempts: Vec<AttemptFailure>,
}

impl AggregatedFailure {
    pub fn new(attempts: Vec<AttemptFailure>) -> Self {
        Self { attempts }
    }

    /// Strategies attempted, in order.
    pub fn strategies(&self) -> Vec<Strategy> {
        self.attempts.iter().map(|a| a.strategy).collect()
    }
}

impl fmt::Display for AggregatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transcription failed after {} attempt(s)",
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(f, "; {}: {}", attempt.strategy, attempt.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedFailure {}

/// Errors the transcription pipeline exposes to its callers. Everything
/// strategy-level is caught inside the orchestrator; only a bad input, a
/// checkable configuration gap, or total exhaustion escapes.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    /// The URL matches no recognized video form. Not retryable by any
    /// strategy; no network activity happens.
    #[error("not a recognized video URL: {0}")]
    MalformedSourceUrl(String),

    /// The submitted audio file does not exist or cannot be read.
    #[error("audio file is not readable: {0}")]
    UnreadableInput(String),

    /// The remote strategy would be needed but its credential is absent.
    /// Detected before any network call is made.
    #[error("remote transcription is not configured: set {0}")]
    MissingCredential(&'static str),

    /// All applicable strategies were attempted and failed.
    #[error(transparent)]
    Exhausted(#[from] AggregatedFailure),
}

/// Errors returned from HTTP handlers, mapped onto status codes and a
/// consistent JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg.clone()),
            ApiError::NotImplemented(msg) => (
                StatusCode::NOT_IMPLEMENTED,
                "not_implemented",
                msg.clone(),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }))
    }
}

impl From<TranscribeError> for ApiError {
    fn from(err: TranscribeError) -> Self {
        match err {
            TranscribeError::MalformedSourceUrl(_) | TranscribeError::UnreadableInput(_) => {
                ApiError::BadRequest(err.to_string())
            }
            TranscribeError::MissingCredential(_) => ApiError::Config(err.to_string()),
            TranscribeError::Exhausted(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
