pub mod tutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::OPENAI_API_KEY_ENV;
use crate::error::ApiError;

/// Quiz score at or above this fraction counts as mastered material.
pub const MASTERY_THRESHOLD: f64 = 0.7;

/// Quiz score at or above this fraction (but below mastery) counts as
/// developing; anything lower needs review.
pub const PASSING_THRESHOLD: f64 = 0.6;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// No AI credential is present. Detected before any network call.
    #[error("AI generation is not configured: set {0}")]
    NotConfigured(&'static str),

    /// The provider request failed.
    #[error("AI provider request failed: {0}")]
    Upstream(String),

    /// The provider answered but not in the shape we asked for.
    #[error("AI provider returned an unusable response: {0}")]
    Malformed(String),
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::NotConfigured(_) => ApiError::Config(err.to_string()),
            GenerateError::Upstream(_) | GenerateError::Malformed(_) => {
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

/// One message in a chat exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion collaborator shared by the generators and the tutor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Whether a credential is present.
    fn is_configured(&self) -> bool;

    /// Run a completion and return the assistant text.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerateError>;

    /// Run a completion constrained to emit a JSON object.
    async fn complete_json(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerateError>;
}

/// OpenAI chat completions client.
pub struct OpenAiChatClient {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(api_key: Option<String>, endpoint: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint,
            model,
        }
    }

    async fn request(
        &self,
        system: &str,
        messages: &[ChatMessage],
        json_mode: bool,
    ) -> Result<String, GenerateError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(GenerateError::NotConfigured(OPENAI_API_KEY_ENV))?;

        let mut all_messages = vec![serde_json::json!({
            "role": "system",
            "content": system,
        })];
        for message in messages {
            all_messages.push(serde_json::json!({
                "role": message.role,
                "content": message.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": all_messages,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Upstream(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| GenerateError::Upstream(e.to_string()))?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown provider error");
            return Err(GenerateError::Upstream(format!("{status}: {detail}")));
        }

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GenerateError::Malformed("completion has no content".to_string()))
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerateError> {
        self.request(system, messages, false).await
    }

    async fn complete_json(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerateError> {
        self.request(system, messages, true).await
    }
}

/// A question/answer study card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

/// One quiz question. `options` is empty for short-answer questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Graded outcome of one submitted answer.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub question: String,
    pub submitted: String,
    pub correct_answer: String,
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mastery {
    Mastered,
    Developing,
    NeedsReview,
}

/// Graded quiz attempt. `weak_areas` lists the questions answered wrong,
/// for targeted review.
#[derive(Debug, Clone, Serialize)]
pub struct QuizEvaluation {
    pub total: usize,
    pub correct: usize,
    pub score: f64,
    pub mastery: Mastery,
    pub weak_areas: Vec<String>,
    pub results: Vec<QuestionResult>,
}

/// Grade a quiz attempt. Pure: answers are compared to the stored correct
/// answers case-insensitively after trimming; missing answers count wrong.
pub fn evaluate_attempt(questions: &[QuizQuestion], answers: &[String]) -> QuizEvaluation {
    let results: Vec<QuestionResult> = questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let submitted = answers.get(i).cloned().unwrap_or_default();
            let correct =
                submitted.trim().eq_ignore_ascii_case(q.correct_answer.trim());
            QuestionResult {
                question: q.question.clone(),
                submitted,
                correct_answer: q.correct_answer.clone(),
                correct,
                explanation: q.explanation.clone(),
            }
        })
        .collect();

    let total = results.len();
    let correct = results.iter().filter(|r| r.correct).count();
    let score = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };

    let mastery = if score >= MASTERY_THRESHOLD {
        Mastery::Mastered
    } else if score >= PASSING_THRESHOLD {
        Mastery::Developing
    } else {
        Mastery::NeedsReview
    };

    let weak_areas = results
        .iter()
        .filter(|r| !r.correct)
        .map(|r| r.question.clone())
        .collect();

    QuizEvaluation {
        total,
        correct,
        score,
        mastery,
        weak_areas,
        results,
    }
}

const NOTES_SYSTEM: &str = "You are an expert academic note-taker. Produce clear, \
well-organized study notes in Markdown: a short overview, the key concepts with \
definitions, and a bulleted summary of the main arguments. Base everything strictly \
on the provided transcript.";

const SUMMARY_SYSTEM: &str = "You are an expert at distilling lectures. Produce a \
concise summary of the transcript in a few paragraphs, followed by a short list of \
key takeaways. Base everything strictly on the provided transcript.";

const FLASHCARD_SYSTEM: &str = "You create study flashcards from lecture material. \
Respond with a JSON object of the form {\"flashcards\": [{\"question\": \"...\", \
\"answer\": \"...\"}]}. Questions test understanding of the material, not trivia.";

const CONCEPTS_SYSTEM: &str = "You identify the key concepts in lecture material. \
Respond with only a comma-separated list of concept names, most important first. \
No numbering, no commentary.";

const ANSWER_SYSTEM: &str = "You explain quiz answers to a student. In plain \
language, explain why the correct answer is right; if the student answered \
differently, also explain the misconception behind their answer.";

const QUIZ_SYSTEM: &str = "You create quizzes from lecture material. Respond with \
a JSON object of the form {\"questions\": [{\"question\": \"...\", \"options\": \
[\"...\"], \"correct_answer\": \"...\", \"question_type\": \
\"multiple_choice|true_false|short_answer\", \"difficulty\": \"...\", \
\"explanation\": \"...\"}]}. For multiple_choice and true_false the \
correct_answer must appear verbatim in the options list; short_answer \
questions have an empty options list.";

/// Generates study artifacts (notes, summaries, flashcards, quizzes) from
/// a transcript via the chat collaborator.
pub struct StudyGenerator {
    chat: Arc<dyn ChatClient>,
}

impl StudyGenerator {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    fn ensure_configured(&self) -> Result<(), GenerateError> {
        if self.chat.is_configured() {
            Ok(())
        } else {
            Err(GenerateError::NotConfigured(OPENAI_API_KEY_ENV))
        }
    }

    pub async fn generate_notes(
        &self,
        transcript: &str,
        subject: Option<&str>,
    ) -> Result<String, GenerateError> {
        self.ensure_configured()?;
        let prompt = match subject {
            Some(subject) => format!("Subject: {subject}\n\nTranscript:\n{transcript}"),
            None => transcript.to_string(),
        };
        self.chat
            .complete(NOTES_SYSTEM, &[ChatMessage::user(prompt)])
            .await
    }

    pub async fn summarize(
        &self,
        transcript: &str,
        max_words: Option<usize>,
    ) -> Result<String, GenerateError> {
        self.ensure_configured()?;
        let prompt = match max_words {
            Some(cap) => format!("Summarize in at most {cap} words:\n\n{transcript}"),
            None => transcript.to_string(),
        };
        self.chat
            .complete(SUMMARY_SYSTEM, &[ChatMessage::user(prompt)])
            .await
    }

    pub async fn extract_key_concepts(
        &self,
        transcript: &str,
    ) -> Result<Vec<String>, GenerateError> {
        self.ensure_configured()?;
        let raw = self
            .chat
            .complete(CONCEPTS_SYSTEM, &[ChatMessage::user(transcript)])
            .await?;
        let concepts = parse_concept_list(&raw);
        if concepts.is_empty() {
            return Err(GenerateError::Malformed(
                "no concepts in completion".to_string(),
            ));
        }
        Ok(concepts)
    }

    pub async fn generate_flashcards(
        &self,
        transcript: &str,
        count: usize,
    ) -> Result<Vec<Flashcard>, GenerateError> {
        self.ensure_configured()?;
        let prompt = format!("Create {count} flashcards from this transcript:\n\n{transcript}");
        let raw = self
            .chat
            .complete_json(FLASHCARD_SYSTEM, &[ChatMessage::user(prompt)])
            .await?;
        parse_flashcards(&raw)
    }

    pub async fn generate_quiz(
        &self,
        transcript: &str,
        count: usize,
        difficulty: Option<&str>,
    ) -> Result<Vec<QuizQuestion>, GenerateError> {
        self.ensure_configured()?;
        let difficulty = difficulty.unwrap_or("medium");
        let prompt = format!(
            "Create a {count}-question quiz at {difficulty} difficulty from this \
             transcript:\n\n{transcript}"
        );
        let raw = self
            .chat
            .complete_json(QUIZ_SYSTEM, &[ChatMessage::user(prompt)])
            .await?;
        parse_quiz(&raw)
    }

    /// Generate a follow-up quiz targeting the areas a previous attempt
    /// showed weakness in.
    pub async fn generate_adaptive_quiz(
        &self,
        transcript: &str,
        count: usize,
        weak_areas: &[String],
    ) -> Result<Vec<QuizQuestion>, GenerateError> {
        self.ensure_configured()?;
        let focus = if weak_areas.is_empty() {
            String::new()
        } else {
            format!(
                " Concentrate on the areas the student struggled with: {}.",
                weak_areas.join("; ")
            )
        };
        let prompt = format!(
            "Create a {count}-question quiz from this transcript.{focus}\n\n{transcript}"
        );
        let raw = self
            .chat
            .complete_json(QUIZ_SYSTEM, &[ChatMessage::user(prompt)])
            .await?;
        parse_quiz(&raw)
    }

    /// Explain why a quiz answer is correct, and where the student's own
    /// answer went wrong if they submitted one.
    pub async fn explain_answer(
        &self,
        question: &str,
        correct_answer: &str,
        submitted: Option<&str>,
    ) -> Result<String, GenerateError> {
        self.ensure_configured()?;
        let prompt = match submitted {
            Some(submitted) => format!(
                "Question: {question}\nCorrect answer: {correct_answer}\n\
                 Student answered: {submitted}\n\nExplain."
            ),
            None => format!(
                "Question: {question}\nCorrect answer: {correct_answer}\n\n\
                 Explain why this is correct."
            ),
        };
        self.chat
            .complete(ANSWER_SYSTEM, &[ChatMessage::user(prompt)])
            .await
    }
}

/// Parse a comma-separated concept list, dropping empties and whitespace.
pub fn parse_concept_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the flashcard JSON shape; tolerates a bare array as well as the
/// requested wrapper object.
pub fn parse_flashcards(raw: &str) -> Result<Vec<Flashcard>, GenerateError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| GenerateError::Malformed(format!("invalid flashcard JSON: {e}")))?;

    let items = value["flashcards"]
        .as_array()
        .or_else(|| value.as_array())
        .ok_or_else(|| GenerateError::Malformed("no flashcards array".to_string()))?;

    let cards: Vec<Flashcard> = items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();

    if cards.is_empty() {
        return Err(GenerateError::Malformed(
            "flashcard array was empty or unusable".to_string(),
        ));
    }
    Ok(cards)
}

/// Parse the quiz JSON shape. Questions with options whose correct answer
/// is not among them are dropped; option-less (short-answer) questions
/// are kept as-is.
pub fn parse_quiz(raw: &str) -> Result<Vec<QuizQuestion>, GenerateError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| GenerateError::Malformed(format!("invalid quiz JSON: {e}")))?;

    let items = value["questions"]
        .as_array()
        .or_else(|| value.as_array())
        .ok_or_else(|| GenerateError::Malformed("no questions array".to_string()))?;

    let questions: Vec<QuizQuestion> = items
        .iter()
        .filter_map(|item| serde_json::from_value::<QuizQuestion>(item.clone()).ok())
        .filter(|q| q.options.is_empty() || q.options.iter().any(|o| o == &q.correct_answer))
        .collect();

    if questions.is_empty() {
        return Err(GenerateError::Malformed(
            "question array was empty or unusable".to_string(),
        ));
    }
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, correct: &str) -> QuizQuestion {
        QuizQuestion {
            question: text.to_string(),
            options: vec!["A".to_string(), "B".to_string(), correct.to_string()],
            correct_answer: correct.to_string(),
            question_type: Some("multiple_choice".to_string()),
            difficulty: None,
            explanation: Some("because".to_string()),
        }
    }

    #[test]
    fn perfect_attempt_is_mastered() {
        let questions = vec![question("q1", "C"), question("q2", "D")];
        let answers = vec!["C".to_string(), "D".to_string()];
        let eval = evaluate_attempt(&questions, &answers);
        assert_eq!(eval.correct, 2);
        assert_eq!(eval.score, 1.0);
        assert_eq!(eval.mastery, Mastery::Mastered);
    }

    #[test]
    fn grading_ignores_case_and_whitespace() {
        let questions = vec![question("q1", "Photosynthesis")];
        let answers = vec!["  photosynthesis ".to_string()];
        let eval = evaluate_attempt(&questions, &answers);
        assert_eq!(eval.correct, 1);
    }

    #[test]
    fn missing_answers_count_wrong() {
        let questions = vec![question("q1", "C"), question("q2", "D")];
        let answers = vec!["C".to_string()];
        let eval = evaluate_attempt(&questions, &answers);
        assert_eq!(eval.correct, 1);
        assert!(!eval.results[1].correct);
        assert_eq!(eval.results[1].submitted, "");
        assert_eq!(eval.weak_areas, vec!["q2".to_string()]);
    }

    #[test]
    fn mastery_bands_follow_the_thresholds() {
        let questions: Vec<QuizQuestion> =
            (0..10).map(|i| question(&format!("q{i}"), "C")).collect();

        let grade = |right: usize| {
            let answers: Vec<String> = (0..10)
                .map(|i| if i < right { "C" } else { "A" }.to_string())
                .collect();
            evaluate_attempt(&questions, &answers).mastery
        };

        assert_eq!(grade(7), Mastery::Mastered);
        assert_eq!(grade(6), Mastery::Developing);
        assert_eq!(grade(5), Mastery::NeedsReview);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        let eval = evaluate_attempt(&[], &[]);
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.mastery, Mastery::NeedsReview);
    }

    #[test]
    fn parses_wrapped_and_bare_flashcard_shapes() {
        let wrapped = r#"{"flashcards": [{"question": "Q", "answer": "A"}]}"#;
        assert_eq!(parse_flashcards(wrapped).unwrap().len(), 1);

        let bare = r#"[{"question": "Q", "answer": "A"}]"#;
        assert_eq!(parse_flashcards(bare).unwrap().len(), 1);
    }

    #[test]
    fn rejects_unusable_flashcard_payloads() {
        assert!(parse_flashcards("not json").is_err());
        assert!(parse_flashcards(r#"{"flashcards": []}"#).is_err());
        assert!(parse_flashcards(r#"{"flashcards": [{"nope": 1}]}"#).is_err());
    }

    #[test]
    fn quiz_parsing_drops_questions_with_detached_answers() {
        let raw = r#"{"questions": [
            {"question": "ok", "options": ["A", "B"], "correct_answer": "A"},
            {"question": "bad", "options": ["A", "B"], "correct_answer": "Z"}
        ]}"#;
        let questions = parse_quiz(raw).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "ok");
    }

    #[test]
    fn short_answer_questions_need_no_options() {
        let raw = r#"{"questions": [
            {"question": "Define entropy.", "correct_answer": "a measure of disorder",
             "question_type": "short_answer"}
        ]}"#;
        let questions = parse_quiz(raw).unwrap();
        assert_eq!(questions.len(), 1);
        assert!(questions[0].options.is_empty());
        assert_eq!(questions[0].question_type.as_deref(), Some("short_answer"));
    }

    #[test]
    fn concept_lists_are_split_and_trimmed() {
        let concepts = parse_concept_list("entropy, enthalpy , free energy,,");
        assert_eq!(concepts, vec!["entropy", "enthalpy", "free energy"]);
        assert!(parse_concept_list("   ").is_empty());
    }

    #[tokio::test]
    async fn generator_refuses_without_credential() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(false);
        chat.expect_complete().never();

        let generator = StudyGenerator::new(Arc::new(chat));
        let err = generator
            .generate_notes("transcript", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::NotConfigured("OPENAI_API_KEY")));
    }

    #[tokio::test]
    async fn flashcard_generation_parses_the_completion() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete_json().times(1).returning(|_, _| {
            Ok(r#"{"flashcards": [
                {"question": "What is entropy?", "answer": "A measure of disorder."},
                {"question": "State the first law.", "answer": "Energy is conserved."}
            ]}"#
            .to_string())
        });

        let generator = StudyGenerator::new(Arc::new(chat));
        let cards = generator.generate_flashcards("transcript", 2).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].question, "What is entropy?");
    }

    #[tokio::test]
    async fn quiz_generation_surfaces_malformed_completions() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete_json()
            .returning(|_, _| Ok("I cannot do that".to_string()));

        let generator = StudyGenerator::new(Arc::new(chat));
        let err = generator
            .generate_quiz("transcript", 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Malformed(_)));
    }

    #[tokio::test]
    async fn adaptive_quiz_targets_the_weak_areas() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete_json().times(1).returning(|_, messages| {
            let prompt = &messages.last().unwrap().content;
            assert!(prompt.contains("entropy"));
            assert!(prompt.contains("free energy"));
            Ok(r#"{"questions": [
                {"question": "Define entropy.", "options": ["A", "B"], "correct_answer": "A"}
            ]}"#
            .to_string())
        });

        let generator = StudyGenerator::new(Arc::new(chat));
        let weak_areas = vec!["entropy".to_string(), "free energy".to_string()];
        let questions = generator
            .generate_adaptive_quiz("transcript", 3, &weak_areas)
            .await
            .unwrap();
        assert_eq!(questions.len(), 1);
    }

    #[tokio::test]
    async fn answer_explanation_includes_the_student_answer() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete().times(1).returning(|_, messages| {
            let prompt = &messages.last().unwrap().content;
            assert!(prompt.contains("Student answered: B"));
            Ok("B confuses heat with temperature.".to_string())
        });

        let generator = StudyGenerator::new(Arc::new(chat));
        let explanation = generator
            .explain_answer("What is heat?", "A", Some("B"))
            .await
            .unwrap();
        assert!(explanation.contains("confuses"));
    }

    #[tokio::test]
    async fn concept_extraction_parses_the_comma_list() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete()
            .times(1)
            .returning(|_, _| Ok("entropy, enthalpy, free energy".to_string()));

        let generator = StudyGenerator::new(Arc::new(chat));
        let concepts = generator.extract_key_concepts("transcript").await.unwrap();
        assert_eq!(concepts, vec!["entropy", "enthalpy", "free energy"]);
    }
}
