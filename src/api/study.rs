use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::ApiError;
use crate::generate::{evaluate_attempt, QuizQuestion};
use crate::state::AppState;

const DEFAULT_FLASHCARD_COUNT: usize = 10;
const DEFAULT_QUIZ_COUNT: usize = 5;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/notes/generate", web::post().to(generate_notes))
        .route("/concepts/extract", web::post().to(extract_concepts))
        .route("/flashcards/generate", web::post().to(generate_flashcards))
        .route("/quizzes/generate", web::post().to(generate_quiz))
        .route("/quizzes/adaptive", web::post().to(adaptive_quiz))
        .route("/quizzes/evaluate", web::post().to(evaluate_quiz))
        .route("/quizzes/explain", web::post().to(explain_answer));
}

#[derive(Debug, Deserialize)]
struct TranscriptRequest {
    transcript: String,
    subject: Option<String>,
    count: Option<usize>,
    difficulty: Option<String>,
}

async fn generate_notes(
    state: web::Data<AppState>,
    request: web::Json<TranscriptRequest>,
) -> Result<HttpResponse, ApiError> {
    let notes = state
        .generator
        .generate_notes(&request.transcript, request.subject.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "notes": notes })))
}

async fn extract_concepts(
    state: web::Data<AppState>,
    request: web::Json<TranscriptRequest>,
) -> Result<HttpResponse, ApiError> {
    let concepts = state
        .generator
        .extract_key_concepts(&request.transcript)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "concepts": concepts })))
}

async fn generate_flashcards(
    state: web::Data<AppState>,
    request: web::Json<TranscriptRequest>,
) -> Result<HttpResponse, ApiError> {
    let count = request.count.unwrap_or(DEFAULT_FLASHCARD_COUNT);
    let flashcards = state
        .generator
        .generate_flashcards(&request.transcript, count)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "flashcards": flashcards })))
}

async fn generate_quiz(
    state: web::Data<AppState>,
    request: web::Json<TranscriptRequest>,
) -> Result<HttpResponse, ApiError> {
    let count = request.count.unwrap_or(DEFAULT_QUIZ_COUNT);
    let questions = state
        .generator
        .generate_quiz(&request.transcript, count, request.difficulty.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "questions": questions })))
}

#[derive(Debug, Deserialize)]
struct AdaptiveQuizRequest {
    transcript: String,
    count: Option<usize>,
    #[serde(default)]
    weak_areas: Vec<String>,
}

/// Generate a follow-up quiz biased toward previously missed material.
async fn adaptive_quiz(
    state: web::Data<AppState>,
    request: web::Json<AdaptiveQuizRequest>,
) -> Result<HttpResponse, ApiError> {
    let count = request.count.unwrap_or(DEFAULT_QUIZ_COUNT);
    let questions = state
        .generator
        .generate_adaptive_quiz(&request.transcript, count, &request.weak_areas)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "questions": questions })))
}

#[derive(Debug, Deserialize)]
struct ExplainAnswerRequest {
    question: String,
    correct_answer: String,
    submitted: Option<String>,
}

async fn explain_answer(
    state: web::Data<AppState>,
    request: web::Json<ExplainAnswerRequest>,
) -> Result<HttpResponse, ApiError> {
    let explanation = state
        .generator
        .explain_answer(
            &request.question,
            &request.correct_answer,
            request.submitted.as_deref(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "explanation": explanation })))
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    questions: Vec<QuizQuestion>,
    answers: Vec<String>,
}

/// Grade a quiz attempt. Pure server-side computation, no AI involved.
async fn evaluate_quiz(request: web::Json<EvaluateRequest>) -> Result<HttpResponse, ApiError> {
    let evaluation = evaluate_attempt(&request.questions, &request.answers);
    Ok(HttpResponse::Ok().json(evaluation))
}
