use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt as _;
use serde::Deserialize;
use tokio::io::AsyncWriteExt as _;

use crate::error::ApiError;
use crate::state::AppState;
use crate::utils::{sanitize_filename, ScopedFile};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/transcription")
            .route("/youtube", web::post().to(youtube))
            .route("/upload", web::post().to(upload))
            .route("/summarize", web::post().to(summarize))
            .route("/live", web::post().to(live)),
    );
}

#[derive(Debug, Deserialize)]
struct YoutubeRequest {
    url: String,
}

/// Transcribe a video by URL through the fallback chain.
async fn youtube(
    state: web::Data<AppState>,
    request: web::Json<YoutubeRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = state
        .pipeline
        .transcribe_from_video_url(&request.url)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// Transcribe an uploaded audio file. The upload is spooled to disk under
/// a request-scoped guard, so it is removed whatever the outcome.
async fn upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut saved: Option<ScopedFile> = None;

    while let Some(item) = payload.next().await {
        let mut field = item
            .map_err(|e| ApiError::BadRequest(format!("invalid multipart payload: {e}")))?;

        let filename = {
            let Some(disposition) = field.content_disposition() else {
                continue;
            };
            if disposition.get_name() != Some("file") {
                continue;
            }
            disposition
                .get_filename()
                .map(sanitize_filename)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "upload".to_string())
        };

        let dest = state
            .config
            .app
            .upload_dir
            .join(format!("{}-{}", uuid::Uuid::new_v4(), filename));
        let guard = ScopedFile::new(dest.clone());

        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot create upload file: {e}")))?;

        let limit = state.config.app.max_upload_bytes;
        let mut written: u64 = 0;
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| ApiError::BadRequest(format!("upload stream failed: {e}")))?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(ApiError::BadRequest(format!(
                    "upload exceeds the {limit} byte limit"
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::Internal(format!("cannot write upload: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::Internal(format!("cannot write upload: {e}")))?;

        saved = Some(guard);
        break;
    }

    let audio = saved
        .ok_or_else(|| ApiError::BadRequest("multipart field 'file' is required".to_string()))?;

    let result = state
        .pipeline
        .transcribe_from_audio_file(audio.path())
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    transcript: String,
    max_words: Option<usize>,
}

async fn summarize(
    state: web::Data<AppState>,
    request: web::Json<SummarizeRequest>,
) -> Result<HttpResponse, ApiError> {
    let summary = state
        .generator
        .summarize(&request.transcript, request.max_words)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "summary": summary })))
}

async fn live() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotImplemented(
        "live transcription is not available".to_string(),
    ))
}
