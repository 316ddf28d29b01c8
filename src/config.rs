//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! API keys are deliberately NOT part of this configuration. They are read
//! from the environment (`OPENAI_API_KEY`, `MURF_API_KEY`) when the external
//! service clients are constructed, so they never end up in config files or
//! the `/api/v1/config` response.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, services, audio,
/// interview, performance) makes it easier to understand and maintain as
/// the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub audio: AudioConfig,
    pub interview: InterviewConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Endpoints and timeouts for the external language and speech services.
///
/// ## Fields:
/// - `completion_url` / `completion_model`: chat-completion service used for
///   question generation, realtime coaching, and answer improvement
/// - `transcription_url` / `transcription_model`: speech-to-text service
/// - `synthesis_ws_url`: streaming text-to-speech WebSocket endpoint
/// - `voices_url`: voice catalog listing endpoint
/// - `request_timeout_secs`: deadline for a single completion/transcription call
/// - `synthesis_deadline_secs`: overall deadline for one synthesis job
/// - `synthesis_inactivity_secs`: finalize a synthesis job with partial audio
///   after this long without a message from the service
/// - `voice_cache_ttl_secs`: how long the voice catalog is cached
/// - `default_voice_id` / `default_voice_style`: fallback when the voice
///   catalog cannot be reached
/// - `session_store_path`: append-only file for finished interview records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub completion_url: String,
    pub completion_model: String,
    pub transcription_url: String,
    pub transcription_model: String,
    pub synthesis_ws_url: String,
    pub voices_url: String,
    pub request_timeout_secs: u64,
    pub synthesis_deadline_secs: u64,
    pub synthesis_inactivity_secs: u64,
    pub voice_cache_ttl_secs: u64,
    pub default_voice_id: String,
    pub default_voice_style: String,
    pub session_store_path: String,
}

/// Audio pipeline configuration.
///
/// ## Fields:
/// - `sample_rate` / `channels` / `bit_depth`: the fixed PCM format every
///   inbound chunk is transcoded to (16kHz mono 16-bit)
/// - `speech_threshold`: normalized RMS above which a chunk counts as speech
/// - `pause_threshold`: normalized RMS below which a chunk counts toward a pause
/// - `min_utterance_secs`: minimum buffered audio before transcription fires
/// - `ffmpeg_path`: path to the ffmpeg binary used for transcoding
/// - `artifact_dir`: directory for temporary question audio files
/// - `transcode_timeout_secs`: deadline for one ffmpeg invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub bit_depth: u8,
    pub speech_threshold: f32,
    pub pause_threshold: f32,
    pub min_utterance_secs: f64,
    pub ffmpeg_path: String,
    pub artifact_dir: String,
    pub transcode_timeout_secs: u64,
}

/// Interview session behavior.
///
/// ## Fields:
/// - `question_count`: how many questions to generate per interview
/// - `feedback_interval_ms`: minimum gap between coaching requests
/// - `min_feedback_transcript_len`: skip coaching for shorter transcripts
/// - `min_summary_transcript_len`: transcripts shorter than this get the
///   canned improvement instead of a completion-service call
/// - `synthesis_sample_rate`: sample rate requested from the voice service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    pub question_count: usize,
    pub feedback_interval_ms: u64,
    pub min_feedback_transcript_len: usize,
    pub min_summary_transcript_len: usize,
    pub synthesis_sample_rate: u32,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5100,
            },
            services: ServicesConfig {
                completion_url: "https://api.openai.com/v1/chat/completions".to_string(),
                completion_model: "gpt-4o-mini".to_string(),
                transcription_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                transcription_model: "whisper-1".to_string(),
                synthesis_ws_url: "wss://api.murf.ai/v1/speech/stream-input".to_string(),
                voices_url: "https://api.murf.ai/v1/speech/voices".to_string(),
                request_timeout_secs: 30,
                synthesis_deadline_secs: 40,
                synthesis_inactivity_secs: 15,
                voice_cache_ttl_secs: 24 * 60 * 60,
                default_voice_id: "en-US-cooper".to_string(),
                default_voice_style: "Conversational".to_string(),
                session_store_path: "sessions.jsonl".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 16000,      // 16kHz - what the transcription service expects
                channels: 1,             // Mono audio
                bit_depth: 16,           // 16-bit PCM
                speech_threshold: 0.01,
                pause_threshold: 0.005,
                min_utterance_secs: 2.0,
                ffmpeg_path: "ffmpeg".to_string(),
                artifact_dir: "uploads".to_string(),
                transcode_timeout_secs: 10,
            },
            interview: InterviewConfig {
                question_count: 3,
                feedback_interval_ms: 20_000,
                min_feedback_transcript_len: 10,
                min_summary_transcript_len: 5,
                synthesis_sample_rate: 44100,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## Why validate:
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.interview.question_count == 0 {
            return Err(anyhow::anyhow!("Question count must be greater than 0"));
        }

        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return Err(anyhow::anyhow!(
                "Audio sample rate and channels must be greater than 0"
            ));
        }

        if self.audio.speech_threshold <= self.audio.pause_threshold {
            return Err(anyhow::anyhow!(
                "Speech threshold must be greater than the pause threshold"
            ));
        }

        if self.audio.min_utterance_secs <= 0.0 {
            return Err(anyhow::anyhow!("Minimum utterance duration must be positive"));
        }

        if self.services.request_timeout_secs == 0
            || self.services.synthesis_deadline_secs == 0
            || self.services.synthesis_inactivity_secs == 0
        {
            return Err(anyhow::anyhow!("Service timeouts must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// This method allows updating only some fields, not the entire
    /// configuration. For example, you can send just
    /// `{"interview": {"question_count": 5}}` to change only that value.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(services) = partial_config.get("services") {
            if let Some(model) = services.get("completion_model").and_then(|v| v.as_str()) {
                self.services.completion_model = model.to_string();
            }
            if let Some(model) = services.get("transcription_model").and_then(|v| v.as_str()) {
                self.services.transcription_model = model.to_string();
            }
            if let Some(timeout) = services.get("request_timeout_secs").and_then(|v| v.as_u64()) {
                self.services.request_timeout_secs = timeout;
            }
            if let Some(voice) = services.get("default_voice_id").and_then(|v| v.as_str()) {
                self.services.default_voice_id = voice.to_string();
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(threshold) = audio.get("speech_threshold").and_then(|v| v.as_f64()) {
                self.audio.speech_threshold = threshold as f32;
            }
            if let Some(threshold) = audio.get("pause_threshold").and_then(|v| v.as_f64()) {
                self.audio.pause_threshold = threshold as f32;
            }
            if let Some(secs) = audio.get("min_utterance_secs").and_then(|v| v.as_f64()) {
                self.audio.min_utterance_secs = secs;
            }
        }

        if let Some(interview) = partial_config.get("interview") {
            if let Some(count) = interview.get("question_count").and_then(|v| v.as_u64()) {
                self.interview.question_count = count as usize;
            }
            if let Some(interval) = interview.get("feedback_interval_ms").and_then(|v| v.as_u64()) {
                self.interview.feedback_interval_ms = interval;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5100);
        assert_eq!(config.interview.question_count, 3);
        assert_eq!(config.interview.feedback_interval_ms, 20_000);
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.speech_threshold = 0.001; // below the pause threshold
        assert!(config.validate().is_err());
    }

    /// Test that runtime configuration updates work correctly.
    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"interview": {"question_count": 5}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.interview.question_count, 5);
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"interview": {"question_count": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
