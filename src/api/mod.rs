pub mod study;
pub mod transcription;
pub mod tutor;

use actix_web::{web, HttpResponse};

/// Mount the full API surface under /api/v1.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health))
            .configure(transcription::configure)
            .configure(study::configure)
            .configure(tutor::configure),
    );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "lecture-scribe",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
