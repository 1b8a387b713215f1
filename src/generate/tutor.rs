use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{ChatClient, ChatMessage, GenerateError};
use crate::config::OPENAI_API_KEY_ENV;

const TUTOR_SYSTEM: &str = "You are a patient, encouraging tutor. Answer the \
student's questions about their lecture material: explain step by step, check \
understanding, and prefer guiding questions over giving everything away at once. \
When lecture context is provided, ground your answers in it.";

const PLAN_SYSTEM: &str = "You are a study coach. Produce a realistic day-by-day \
study plan in Markdown for the requested topic and time frame, with concrete \
activities and brief self-check questions per day.";

const RESOURCES_SYSTEM: &str = "You recommend study resources. Suggest a short \
Markdown list of resource types and well-known titles (textbooks, lecture series, \
practice problem sets, reference sites) suited to the requested topic and level, \
with one line on why each helps.";

/// One completed question/answer turn in a tutoring session.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Conversational tutor over the chat collaborator. Each session keeps a
/// bounded window of recent exchanges; older turns are evicted so memory
/// cannot grow without limit however long a session runs.
pub struct TutorService {
    chat: Arc<dyn ChatClient>,
    window: usize,
    sessions: Mutex<HashMap<String, VecDeque<Exchange>>>,
}

impl TutorService {
    pub fn new(chat: Arc<dyn ChatClient>, window: usize) -> Self {
        Self {
            chat,
            window,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn ensure_configured(&self) -> Result<(), GenerateError> {
        if self.chat.is_configured() {
            Ok(())
        } else {
            Err(GenerateError::NotConfigured(OPENAI_API_KEY_ENV))
        }
    }

    /// Ask a question within a session. The session's recent exchanges are
    /// replayed into the completion so follow-ups stay coherent; an optional
    /// learning style tunes how the tutor explains.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &str,
        context: Option<&str>,
        learning_style: Option<&str>,
    ) -> Result<String, GenerateError> {
        self.ensure_configured()?;

        let mut messages = Vec::new();
        {
            let sessions = self.sessions.lock().expect("tutor session lock poisoned");
            if let Some(history) = sessions.get(session_id) {
                for exchange in history {
                    messages.push(ChatMessage::user(exchange.question.clone()));
                    messages.push(ChatMessage::assistant(exchange.answer.clone()));
                }
            }
        }

        let content = match context {
            Some(ctx) => format!("Lecture context:\n{ctx}\n\nQuestion: {question}"),
            None => question.to_string(),
        };
        messages.push(ChatMessage::user(content));

        let system = match learning_style {
            Some(style) => {
                format!("{TUTOR_SYSTEM} Adapt your explanations for a {style} learner.")
            }
            None => TUTOR_SYSTEM.to_string(),
        };

        let answer = self.chat.complete(&system, &messages).await?;

        let mut sessions = self.sessions.lock().expect("tutor session lock poisoned");
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push_back(Exchange {
            question: question.to_string(),
            answer: answer.clone(),
        });
        while history.len() > self.window {
            history.pop_front();
        }

        Ok(answer)
    }

    /// One-shot concept explanation, outside any session.
    pub async fn explain(
        &self,
        concept: &str,
        level: Option<&str>,
    ) -> Result<String, GenerateError> {
        self.ensure_configured()?;
        let prompt = match level {
            Some(level) => format!("Explain '{concept}' at a {level} level."),
            None => format!("Explain '{concept}'."),
        };
        self.chat
            .complete(TUTOR_SYSTEM, &[ChatMessage::user(prompt)])
            .await
    }

    /// Produce a day-by-day study plan for a topic.
    pub async fn study_plan(&self, topic: &str, days: u32) -> Result<String, GenerateError> {
        self.ensure_configured()?;
        let prompt = format!("Create a {days}-day study plan for: {topic}");
        self.chat
            .complete(PLAN_SYSTEM, &[ChatMessage::user(prompt)])
            .await
    }

    /// Recommend study resources for a topic.
    pub async fn recommend_resources(
        &self,
        topic: &str,
        level: Option<&str>,
    ) -> Result<String, GenerateError> {
        self.ensure_configured()?;
        let prompt = match level {
            Some(level) => format!("Recommend study resources for '{topic}' at a {level} level."),
            None => format!("Recommend study resources for '{topic}'."),
        };
        self.chat
            .complete(RESOURCES_SYSTEM, &[ChatMessage::user(prompt)])
            .await
    }

    /// Snapshot of a session's retained exchanges, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<Exchange> {
        let sessions = self.sessions.lock().expect("tutor session lock poisoned");
        sessions
            .get(session_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a session entirely. Returns whether it existed.
    pub fn clear(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().expect("tutor session lock poisoned");
        sessions.remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::MockChatClient;

    fn echo_chat() -> MockChatClient {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete().returning(|_, messages| {
            Ok(format!("answer to: {}", messages.last().unwrap().content))
        });
        chat
    }

    #[tokio::test]
    async fn history_window_evicts_oldest_exchanges() {
        let tutor = TutorService::new(Arc::new(echo_chat()), 2);

        tutor.ask("s1", "first", None, None).await.unwrap();
        tutor.ask("s1", "second", None, None).await.unwrap();
        tutor.ask("s1", "third", None, None).await.unwrap();

        let history = tutor.history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "second");
        assert_eq!(history[1].question, "third");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let tutor = TutorService::new(Arc::new(echo_chat()), 10);

        tutor.ask("alice", "what is torque?", None, None).await.unwrap();
        tutor.ask("bob", "what is entropy?", None, None).await.unwrap();

        assert_eq!(tutor.history("alice").len(), 1);
        assert_eq!(tutor.history("bob").len(), 1);
        assert_eq!(tutor.history("alice")[0].question, "what is torque?");
    }

    #[tokio::test]
    async fn prior_exchanges_are_replayed_into_the_completion() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete()
            .times(2)
            .returning(|_, messages| Ok(format!("{} message(s) seen", messages.len())));

        let tutor = TutorService::new(Arc::new(chat), 10);
        assert_eq!(tutor.ask("s1", "first", None, None).await.unwrap(), "1 message(s) seen");
        // prior user + assistant turn, plus the new question
        assert_eq!(tutor.ask("s1", "second", None, None).await.unwrap(), "3 message(s) seen");
    }

    #[tokio::test]
    async fn context_is_folded_into_the_question() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete().returning(|_, messages| {
            let content = &messages.last().unwrap().content;
            assert!(content.contains("Lecture context:"));
            assert!(content.contains("thermodynamics"));
            Ok("ok".to_string())
        });

        let tutor = TutorService::new(Arc::new(chat), 10);
        tutor
            .ask("s1", "what did the lecturer mean?", Some("thermodynamics lecture"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resource_recommendations_carry_topic_and_level() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete().times(1).returning(|_, messages| {
            let prompt = &messages.last().unwrap().content;
            assert!(prompt.contains("linear algebra"));
            assert!(prompt.contains("beginner"));
            Ok("- Strang's lectures".to_string())
        });

        let tutor = TutorService::new(Arc::new(chat), 10);
        let resources = tutor
            .recommend_resources("linear algebra", Some("beginner"))
            .await
            .unwrap();
        assert!(resources.contains("Strang"));
    }

    #[tokio::test]
    async fn learning_style_shapes_the_system_prompt() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(true);
        chat.expect_complete().returning(|system, _| {
            assert!(system.contains("visual learner"));
            Ok("ok".to_string())
        });

        let tutor = TutorService::new(Arc::new(chat), 10);
        tutor
            .ask("s1", "what is a phase diagram?", None, Some("visual"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn clear_reports_whether_the_session_existed() {
        let tutor = TutorService::new(Arc::new(echo_chat()), 10);
        tutor.ask("s1", "hello", None, None).await.unwrap();

        assert!(tutor.clear("s1"));
        assert!(!tutor.clear("s1"));
        assert!(tutor.history("s1").is_empty());
    }

    #[tokio::test]
    async fn unconfigured_tutor_refuses_without_state_changes() {
        let mut chat = MockChatClient::new();
        chat.expect_is_configured().return_const(false);
        chat.expect_complete().never();

        let tutor = TutorService::new(Arc::new(chat), 10);
        let err = tutor.ask("s1", "hello", None, None).await.unwrap_err();
        assert!(matches!(err, GenerateError::NotConfigured(_)));
        assert!(tutor.history("s1").is_empty());
    }
}
