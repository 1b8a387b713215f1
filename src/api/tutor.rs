use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tutor")
            .route("/ask", web::post().to(ask))
            .route("/explain", web::post().to(explain))
            .route("/study-plan", web::post().to(study_plan))
            .route("/recommend-resources", web::post().to(recommend_resources))
            .route("/history/{session_id}", web::get().to(history))
            .route("/history/{session_id}", web::delete().to(clear_history)),
    );
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    session_id: String,
    question: String,
    context: Option<String>,
    learning_style: Option<String>,
}

async fn ask(
    state: web::Data<AppState>,
    request: web::Json<AskRequest>,
) -> Result<HttpResponse, ApiError> {
    let answer = state
        .tutor
        .ask(
            &request.session_id,
            &request.question,
            request.context.as_deref(),
            request.learning_style.as_deref(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": request.session_id,
        "answer": answer,
    })))
}

#[derive(Debug, Deserialize)]
struct ExplainRequest {
    concept: String,
    level: Option<String>,
}

async fn explain(
    state: web::Data<AppState>,
    request: web::Json<ExplainRequest>,
) -> Result<HttpResponse, ApiError> {
    let explanation = state
        .tutor
        .explain(&request.concept, request.level.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "explanation": explanation })))
}

#[derive(Debug, Deserialize)]
struct StudyPlanRequest {
    topic: String,
    days: Option<u32>,
}

async fn study_plan(
    state: web::Data<AppState>,
    request: web::Json<StudyPlanRequest>,
) -> Result<HttpResponse, ApiError> {
    let days = request.days.unwrap_or(7);
    let plan = state.tutor.study_plan(&request.topic, days).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "plan": plan })))
}

#[derive(Debug, Deserialize)]
struct RecommendRequest {
    topic: String,
    level: Option<String>,
}

async fn recommend_resources(
    state: web::Data<AppState>,
    request: web::Json<RecommendRequest>,
) -> Result<HttpResponse, ApiError> {
    let resources = state
        .tutor
        .recommend_resources(&request.topic, request.level.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "resources": resources })))
}

async fn history(
    state: web::Data<AppState>,
    session_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let exchanges = state.tutor.history(&session_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": session_id.as_str(),
        "exchanges": exchanges,
    })))
}

async fn clear_history(
    state: web::Data<AppState>,
    session_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let cleared = state.tutor.clear(&session_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": session_id.as_str(),
        "cleared": cleared,
    })))
}
