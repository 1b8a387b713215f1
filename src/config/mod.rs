use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the configured OpenAI credential.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Transcription pipeline settings
    pub transcription: TranscriptionConfig,

    /// OpenAI credential and model selection
    pub openai: OpenAiConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Hard deadline for one caption fetch, in seconds
    pub caption_timeout_secs: u64,

    /// Ordered caption language preference
    pub languages: Vec<String>,

    /// Whisper model name (e.g. "base.en", "small")
    pub whisper_model: String,

    /// Directory holding ggml model files; defaults under the data dir
    pub model_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API credential; absent means the remote strategy and all generation
    /// endpoints are unconfigured (a state, not an error)
    pub api_key: Option<String>,

    /// Chat model for notes, flashcards, quizzes, and tutoring
    pub chat_model: String,

    /// Speech-to-text model for the remote fallback
    pub speech_model: String,

    /// API base URL
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where uploaded files land before transcription
    pub upload_dir: PathBuf,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,

    /// Tutoring history window: exchanges kept per session
    pub history_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            transcription: TranscriptionConfig {
                caption_timeout_secs: 30,
                languages: vec!["en".to_string()],
                whisper_model: "base.en".to_string(),
                model_dir: None,
            },
            openai: OpenAiConfig {
                api_key: None,
                chat_model: "gpt-4-turbo-preview".to_string(),
                speech_model: "whisper-1".to_string(),
                endpoint: "https://api.openai.com/v1".to_string(),
            },
            app: AppConfig {
                upload_dir: PathBuf::from("./uploads"),
                max_upload_bytes: 100 * 1024 * 1024,
                history_window: 10,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            serde_yaml::from_str(&content).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save()?;
            config
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("lecture-scribe").join("config.yaml"))
    }

    /// Environment overrides; secrets never live in the config file
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(OPENAI_API_KEY_ENV) {
            if !key.is_empty() {
                self.openai.api_key = Some(key);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be non-zero");
        }

        if self.transcription.caption_timeout_secs == 0 {
            anyhow::bail!("Caption timeout must be non-zero");
        }

        if self.transcription.languages.is_empty() {
            anyhow::bail!("At least one caption language must be configured");
        }

        if self.app.history_window == 0 {
            anyhow::bail!("Tutor history window must be non-zero");
        }

        Ok(())
    }

    /// Path to the ggml model file for the configured whisper model
    pub fn whisper_model_path(&self) -> Result<PathBuf> {
        let dir = match &self.transcription.model_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .context("Could not determine data directory")?
                .join("lecture-scribe")
                .join("models"),
        };

        Ok(dir.join(format!("ggml-{}.bin", self.transcription.whisper_model)))
    }
}
