//! # Streaming Speech-Synthesis Client
//!
//! One synthesis job per question: a persistent bidirectional WebSocket
//! connection to the voice service, used once and closed.
//!
//! ## Protocol:
//! 1. Connect with api-key, sample rate, channel layout and output format as
//!    query parameters.
//! 2. Send the voice configuration message first — the service buffers no
//!    audio until this handshake completes.
//! 3. Send the question text in a single message marked as the final text
//!    unit for this context.
//! 4. Receive zero or more base64 audio fragments; accumulate in arrival
//!    order.
//! 5. Terminate on the service's explicit final-audio signal OR a local
//!    inactivity timeout, whichever comes first. On timeout the job finalizes
//!    with whatever fragments have arrived — a partial result is acceptable,
//!    silence is not retried at this layer.
//!
//! An overall deadline wraps the whole job (handshake + text + streaming);
//! exceeding it yields `SessionError::ServiceTimeout`, which the orchestrator
//! treats as a failed artifact without aborting the question batch.

use crate::config::ServicesConfig;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use tracing::{debug, warn};

/// Voice identity and speaking style for one synthesis job.
#[derive(Debug, Clone)]
pub struct VoiceSelection {
    pub voice_id: String,
    pub style: String,
}

/// Contract for the speech-synthesis collaborator.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` as audio with the given voice. Returns the complete
    /// audio payload (WAV bytes).
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> SessionResult<Vec<u8>>;
}

/// Accumulates base64 audio fragments in arrival order and produces the
/// final binary payload.
pub struct FragmentAssembler {
    fragments: Vec<String>,
}

impl FragmentAssembler {
    pub fn new() -> Self {
        Self { fragments: Vec::new() }
    }

    pub fn push(&mut self, fragment_b64: &str) {
        self.fragments.push(fragment_b64.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Decode and concatenate all fragments in arrival order.
    ///
    /// An empty fragment set is an error: an interview question with silent
    /// audio is worse than the text-only fallback the orchestrator provides.
    pub fn finalize(self) -> SessionResult<Vec<u8>> {
        if self.fragments.is_empty() {
            return Err(SessionError::Service(
                "synthesis produced no audio fragments".to_string(),
            ));
        }

        let mut audio = Vec::new();
        for fragment in &self.fragments {
            let bytes = BASE64
                .decode(fragment.as_bytes())
                .map_err(|e| SessionError::Service(format!("invalid audio fragment: {}", e)))?;
            audio.extend_from_slice(&bytes);
        }

        Ok(audio)
    }
}

impl Default for FragmentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Murf streaming API implementation of [`SpeechSynthesizer`].
///
/// The connection is single-context: one instance of the protocol run per
/// synthesis job, which is why the orchestrator synthesizes questions
/// sequentially rather than in parallel.
pub struct MurfStreamingSynthesis {
    api_key: String,
    ws_url: String,
    sample_rate: u32,
    overall_deadline: Duration,
    inactivity_timeout: Duration,
}

impl MurfStreamingSynthesis {
    pub fn new(api_key: String, services: &ServicesConfig, sample_rate: u32) -> Self {
        Self::with_timeouts(
            api_key,
            services.synthesis_ws_url.clone(),
            sample_rate,
            Duration::from_secs(services.synthesis_deadline_secs),
            Duration::from_secs(services.synthesis_inactivity_secs),
        )
    }

    pub fn with_timeouts(
        api_key: String,
        ws_url: String,
        sample_rate: u32,
        overall_deadline: Duration,
        inactivity_timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            ws_url,
            sample_rate,
            overall_deadline,
            inactivity_timeout,
        }
    }

    /// One full protocol run: handshake, text, fragment accumulation,
    /// finalize.
    async fn run_job(&self, text: &str, voice: &VoiceSelection) -> SessionResult<Vec<u8>> {
        let mut url = Url::parse(&self.ws_url)
            .map_err(|e| SessionError::Service(format!("invalid synthesis URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("api-key", &self.api_key)
            .append_pair("sample_rate", &self.sample_rate.to_string())
            .append_pair("channel_type", "MONO")
            .append_pair("format", "WAV");

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SessionError::Service(format!("synthesis connection failed: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        // Voice configuration must arrive before any text.
        let voice_config = json!({
            "voice_config": {
                "voiceId": voice.voice_id,
                "style": voice.style,
                "rate": 0,
                "pitch": 0,
                "variation": 1,
                "sampleRate": self.sample_rate,
                "format": "WAV",
                "channelType": "MONO"
            }
        });
        write
            .send(Message::Text(voice_config.to_string().into()))
            .await
            .map_err(|e| SessionError::Service(format!("failed to send voice config: {}", e)))?;

        // The question is one text unit, marked final for this context.
        let text_message = json!({ "text": text, "end": true });
        write
            .send(Message::Text(text_message.to_string().into()))
            .await
            .map_err(|e| SessionError::Service(format!("failed to send text: {}", e)))?;

        let mut assembler = FragmentAssembler::new();

        loop {
            match tokio::time::timeout(self.inactivity_timeout, read.next()).await {
                Err(_) => {
                    warn!(
                        fragments = assembler.len(),
                        "synthesis inactivity timeout, finalizing with received audio"
                    );
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    if assembler.is_empty() {
                        return Err(SessionError::Service(format!(
                            "synthesis stream failed: {}",
                            e
                        )));
                    }
                    warn!(error = %e, "synthesis stream failed mid-job, finalizing partial audio");
                    break;
                }
                Ok(Some(Ok(Message::Text(payload)))) => {
                    let message: serde_json::Value = match serde_json::from_str(&payload) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(error = %e, "ignoring non-JSON synthesis message");
                            continue;
                        }
                    };

                    if let Some(error) = message.get("error") {
                        return Err(SessionError::Service(format!(
                            "synthesis service error: {}",
                            error
                        )));
                    }

                    if let Some(fragment) = message.get("audio").and_then(|a| a.as_str()) {
                        assembler.push(fragment);
                    }

                    let is_final = message.get("final").and_then(|v| v.as_bool()).unwrap_or(false)
                        || message
                            .get("isFinalAudio")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                    if is_final {
                        debug!(fragments = assembler.len(), "received final audio signal");
                        break;
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) => break,
                Ok(Some(Ok(_))) => {
                    // Ping/pong frames are answered by the library
                }
            }
        }

        let _ = write.close().await;
        assembler.finalize()
    }
}

#[async_trait]
impl SpeechSynthesizer for MurfStreamingSynthesis {
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> SessionResult<Vec<u8>> {
        match tokio::time::timeout(self.overall_deadline, self.run_job(text, voice)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ServiceTimeout("speech synthesis".to_string())),
        }
    }
}
