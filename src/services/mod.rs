//! # External Service Collaborators
//!
//! Thin clients for the external services the interview session depends on.
//! Only their request/response shapes and failure modes live here; each one
//! degrades per the session error policy instead of aborting the interview.
//!
//! ## Collaborators:
//! - **InterviewCoach** (`completion.rs`): chat-completion service — question
//!   generation, realtime coaching, answer improvement
//! - **TranscriptionService** (`transcription.rs`): speech-to-text upload
//! - **SpeechSynthesizer** (`synthesis.rs`): streaming text-to-speech client
//! - **VoiceDirectory** (`voices.rs`): voice catalog lookup behind a TTL cache
//! - **SessionStore** (`store.rs`): append-only record of finished interviews
//!
//! Every collaborator is a trait object so session logic can be exercised in
//! tests with deterministic in-memory implementations.

pub mod completion;
pub mod store;
pub mod synthesis;
pub mod transcription;
pub mod voices;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::pipeline::transcoder::{FfmpegTranscoder, Transcoder};
use std::sync::Arc;

pub use completion::{ImprovedAnswer, InterviewCoach, OpenAiCoach};
pub use store::{InterviewRecord, JsonlSessionStore, SessionStore};
pub use synthesis::{MurfStreamingSynthesis, SpeechSynthesizer, VoiceSelection};
pub use transcription::{TranscriptionService, WhisperTranscription};
pub use voices::{MurfVoiceDirectory, VoiceDirectory};

/// The full set of collaborators a session worker needs, wired once at
/// startup and shared across connections (all implementations are stateless
/// or internally synchronized).
#[derive(Clone)]
pub struct Collaborators {
    pub coach: Arc<dyn InterviewCoach>,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub transcoder: Arc<dyn Transcoder>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub voices: Arc<dyn VoiceDirectory>,
    pub store: Arc<dyn SessionStore>,
}

impl Collaborators {
    /// Wire production implementations from configuration and environment.
    ///
    /// API keys come from the environment only: `OPENAI_API_KEY` for the
    /// completion and transcription services, `MURF_API_KEY` for synthesis
    /// and the voice catalog.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let openai_key = require_env("OPENAI_API_KEY")?;
        let murf_key = require_env("MURF_API_KEY")?;

        Ok(Self {
            coach: Arc::new(OpenAiCoach::new(
                openai_key.clone(),
                &config.services,
                config.interview.min_summary_transcript_len,
            )),
            transcriber: Arc::new(WhisperTranscription::new(openai_key, &config.services)),
            transcoder: Arc::new(FfmpegTranscoder::new(&config.audio)),
            synthesizer: Arc::new(MurfStreamingSynthesis::new(
                murf_key.clone(),
                &config.services,
                config.interview.synthesis_sample_rate,
            )),
            voices: Arc::new(MurfVoiceDirectory::new(murf_key, &config.services)),
            store: Arc::new(JsonlSessionStore::new(&config.services.session_store_path)),
        })
    }
}

fn require_env(name: &str) -> AppResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(crate::error::AppError::ConfigError(format!(
            "environment variable {} is not set",
            name
        ))),
    }
}
