use anyhow::Context;
use std::sync::Arc;

use crate::config::Config;
use crate::generate::tutor::TutorService;
use crate::generate::{ChatClient, OpenAiChatClient, StudyGenerator};
use crate::transcribe::TranscriptionPipeline;

/// Shared application state handed to every handler. The pipeline, the
/// generator, and the tutor all live for the whole process.
pub struct AppState {
    pub config: Config,
    pub pipeline: TranscriptionPipeline,
    pub generator: StudyGenerator,
    pub tutor: TutorService,
}

impl AppState {
    pub fn new(config: Config) -> crate::Result<Self> {
        fs_err::create_dir_all(&config.app.upload_dir)
            .context("Failed to create upload directory")?;

        let pipeline = TranscriptionPipeline::new(&config)?;

        let chat: Arc<dyn ChatClient> = Arc::new(OpenAiChatClient::new(
            config.openai.api_key.clone(),
            config.openai.endpoint.clone(),
            config.openai.chat_model.clone(),
        ));
        let generator = StudyGenerator::new(Arc::clone(&chat));
        let tutor = TutorService::new(chat, config.app.history_window);

        Ok(Self {
            config,
            pipeline,
            generator,
            tutor,
        })
    }
}
