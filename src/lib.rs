//! Lecture Scribe - a backend that turns lecture content into study artifacts
//!
//! Students submit a YouTube link or an audio/video upload and get back a
//! transcript plus AI-generated notes, summaries, flashcards, quizzes, and
//! tutoring dialogue. Transcripts are acquired through a cascading fallback
//! pipeline: YouTube captions first, then a local Whisper model, then a
//! remote speech-to-text API.

pub mod api;
pub mod config;
pub mod error;
pub mod generate;
pub mod state;
pub mod transcribe;
pub mod utils;

pub use config::Config;
pub use error::{AggregatedFailure, ApiError, Strategy, StrategyError, TranscribeError};
pub use transcribe::{Provenance, TranscriptionPipeline, TranscriptionResult, VideoMetadata};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
