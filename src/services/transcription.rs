//! # Transcription Collaborator
//!
//! Speech-to-text over the OpenAI audio transcriptions endpoint: the
//! pipeline's utterance buffer is wrapped as a WAV file and uploaded as
//! multipart form data with a language hint and a domain prompt.

use crate::config::ServicesConfig;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Contract for the transcription collaborator.
///
/// The `wav` parameter is a complete WAV file (16-bit PCM mono at the
/// pipeline sample rate). Returns the transcribed text, which may be empty
/// when no speech was recognized.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(
        &self,
        wav: Vec<u8>,
        language: &str,
        prompt: Option<&str>,
    ) -> SessionResult<String>;
}

/// OpenAI Whisper API implementation of [`TranscriptionService`].
pub struct WhisperTranscription {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
}

impl WhisperTranscription {
    pub fn new(api_key: String, services: &ServicesConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(services.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            url: services.transcription_url.clone(),
            model: services.transcription_model.clone(),
        }
    }
}

#[async_trait]
impl TranscriptionService for WhisperTranscription {
    async fn transcribe(
        &self,
        wav: Vec<u8>,
        language: &str,
        prompt: Option<&str>,
    ) -> SessionResult<String> {
        debug!(
            model = %self.model,
            language = %language,
            audio_bytes = wav.len(),
            "sending audio to transcription service"
        );

        let file_part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SessionError::Service(format!("failed to create multipart: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "text");

        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt.to_string());
        }

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SessionError::from_request(e, "transcription service"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SessionError::Service(format!(
                "transcription service returned {}: {}",
                status, error_body
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SessionError::from_request(e, "transcription service"))?;

        Ok(text.trim().to_string())
    }
}

/// Wrap raw little-endian 16-bit PCM in a WAV container.
///
/// The transcription service needs a proper file, not a bare sample stream;
/// this produces a minimal mono WAV entirely in memory.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> SessionResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec)
            .map_err(|e| SessionError::Internal(format!("failed to start WAV writer: {}", e)))?;

        let mut cursor = Cursor::new(pcm);
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            writer
                .write_sample(sample)
                .map_err(|e| SessionError::Internal(format!("failed to write WAV sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| SessionError::Internal(format!("failed to finalize WAV: {}", e)))?;
    }

    Ok(buffer.into_inner())
}
