//! # Vocal Response Pipeline
//!
//! Everything that happens to one inbound candidate audio chunk:
//!
//! 1. **Transcode** (`transcoder`): compressed chunk → fixed-format PCM.
//! 2. **Analyze** (`analyzer`): volume, pitch, speech/pause classification.
//!    Non-speech chunks stop here — no transcription call is spent on
//!    silence.
//! 3. **Accumulate** (`accumulator`): speaking chunks buffer until the
//!    minimum utterance duration is reached, then the buffer is transcribed
//!    as one utterance and recorded in the transcript history.
//! 4. **Coach** (`throttle` + the completion collaborator): a transcript may
//!    trigger one rate-limited realtime feedback request.
//!
//! At interview completion, `summary()` flushes any buffered-but-
//! untranscribed audio and produces one summary item per history entry.
//!
//! The pipeline instance is exclusively owned by one session worker and is
//! reset in place when the session resets.

pub mod accumulator;
pub mod analyzer;
pub mod throttle;
pub mod transcoder;

use crate::config::AppConfig;
use crate::error::SessionResult;
use crate::services::completion::InterviewCoach;
use crate::services::transcription::{pcm_to_wav, TranscriptionService};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use accumulator::{TranscriptEntry, UtteranceBuffer};
pub use analyzer::{AnalysisSnapshot, SignalAnalyzer};
pub use throttle::FeedbackThrottle;
pub use transcoder::Transcoder;

/// Fixed language hint for the transcription collaborator.
const LANGUAGE_HINT: &str = "en";

/// Domain prompt that biases transcription toward interview speech.
const DOMAIN_PROMPT: &str = "This is an interview response. Transcribe clearly.";

/// Fallback question label when buffered audio outlives its question context.
const UNKNOWN_QUESTION: &str = "(Unknown question)";

/// Result of pushing one chunk through the pipeline.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub analysis: AnalysisSnapshot,
    /// Present only when this chunk completed an utterance that transcribed
    /// successfully.
    pub transcript: Option<String>,
}

/// One entry of the final interview summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryItem {
    pub question: String,
    pub your_response: String,
    pub suggested_response: String,
    pub points_to_change: Vec<String>,
}

/// The per-session audio processing pipeline.
pub struct VocalResponsePipeline {
    transcoder: Arc<dyn Transcoder>,
    transcriber: Arc<dyn TranscriptionService>,
    coach: Arc<dyn InterviewCoach>,
    analyzer: SignalAnalyzer,
    buffer: UtteranceBuffer,
    history: Vec<TranscriptEntry>,
    throttle: FeedbackThrottle,
    /// Question text associated with the audio currently in the buffer.
    pending_question: Option<String>,
    sample_rate: u32,
    channels: u16,
}

impl VocalResponsePipeline {
    pub fn new(
        config: &AppConfig,
        transcoder: Arc<dyn Transcoder>,
        transcriber: Arc<dyn TranscriptionService>,
        coach: Arc<dyn InterviewCoach>,
    ) -> Self {
        Self {
            transcoder,
            transcriber,
            coach,
            analyzer: SignalAnalyzer::new(
                config.audio.speech_threshold,
                config.audio.pause_threshold,
                config.audio.sample_rate,
            ),
            buffer: UtteranceBuffer::new(config.audio.sample_rate, config.audio.min_utterance_secs),
            history: Vec::new(),
            throttle: FeedbackThrottle::new(
                Duration::from_millis(config.interview.feedback_interval_ms),
                config.interview.min_feedback_transcript_len,
            ),
            pending_question: None,
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels as u16,
        }
    }

    /// Process one inbound audio chunk for the given question.
    ///
    /// ## Failure modes:
    /// - `SessionError::Decode`: the chunk was undecodable; the caller logs
    ///   and drops it, the session continues.
    /// - `SessionError::Internal`: local resource failure; fatal to the
    ///   session.
    /// Transcription failures are NOT errors here — the buffer is kept and
    /// retried on a later chunk.
    pub async fn process_response(
        &mut self,
        encoded: &[u8],
        question: &str,
    ) -> SessionResult<ChunkOutcome> {
        let pcm = self.transcoder.decode_to_pcm(encoded).await?;
        let analysis = self.analyzer.analyze(&pcm);

        if !analysis.is_speaking {
            return Ok(ChunkOutcome {
                analysis,
                transcript: None,
            });
        }

        self.buffer.append(&pcm);
        self.pending_question = Some(question.to_string());

        if !self.buffer.is_ready() {
            return Ok(ChunkOutcome {
                analysis,
                transcript: None,
            });
        }

        let transcript = self.transcribe_buffer(question).await?;
        Ok(ChunkOutcome {
            analysis,
            transcript,
        })
    }

    /// Transcribe the whole utterance buffer.
    ///
    /// On success the buffer is cleared and the transcript recorded; on
    /// provider failure the buffer is kept so a later chunk can retry.
    async fn transcribe_buffer(&mut self, question: &str) -> SessionResult<Option<String>> {
        let wav = pcm_to_wav(self.buffer.as_bytes(), self.sample_rate, self.channels)?;

        match self
            .transcriber
            .transcribe(wav, LANGUAGE_HINT, Some(DOMAIN_PROMPT))
            .await
        {
            Ok(text) => {
                self.buffer.clear();
                self.pending_question = None;

                if text.is_empty() {
                    return Ok(None);
                }

                debug!(chars = text.len(), "utterance transcribed");
                self.history.push(TranscriptEntry {
                    question: question.to_string(),
                    transcript: text.clone(),
                });
                Ok(Some(text))
            }
            Err(e) => {
                warn!(error = %e, "transcription failed, keeping buffer for retry");
                Ok(None)
            }
        }
    }

    /// Issue a rate-limited coaching request for a fresh transcript.
    ///
    /// Returns `None` when the throttle rejects the request or the
    /// collaborator fails (coaching is optional, the session continues).
    pub async fn maybe_feedback(&mut self, question: &str, transcript: &str) -> Option<String> {
        if !self.throttle.admit(transcript, Instant::now()) {
            debug!("coaching request throttled");
            return None;
        }

        match self.coach.realtime_feedback(question, transcript).await {
            Ok(feedback) if !feedback.is_empty() => Some(feedback),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "realtime feedback request failed");
                None
            }
        }
    }

    /// Build the final summary: flush buffered audio first, then one item
    /// per transcript-history entry in arrival order.
    ///
    /// Idempotent for a deterministic completion collaborator: calling it
    /// twice without new audio yields the same items.
    pub async fn summary(&mut self) -> SessionResult<Vec<SummaryItem>> {
        if !self.buffer.is_empty() {
            let question = self
                .pending_question
                .clone()
                .unwrap_or_else(|| UNKNOWN_QUESTION.to_string());
            debug!("flushing unflushed audio buffer before summarizing");
            self.transcribe_buffer(&question).await?;
        }

        let mut items = Vec::with_capacity(self.history.len());
        for entry in &self.history {
            let improved = self.coach.improve_answer(&entry.question, &entry.transcript).await;
            items.push(SummaryItem {
                question: entry.question.clone(),
                your_response: entry.transcript.clone(),
                suggested_response: improved.suggested,
                points_to_change: improved.points,
            });
        }

        Ok(items)
    }

    /// The transcript history in arrival order.
    pub fn history(&self) -> &[TranscriptEntry] {
        &self.history
    }

    /// Reset all pipeline state in place (session reuse).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.history.clear();
        self.throttle.reset();
        self.analyzer.reset();
        self.pending_question = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::services::completion::ImprovedAnswer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands the "compressed" bytes straight through as PCM, so tests can
    /// feed synthetic waveforms without an ffmpeg binary.
    struct PassthroughTranscoder;

    #[async_trait]
    impl Transcoder for PassthroughTranscoder {
        async fn decode_to_pcm(&self, encoded: &[u8]) -> SessionResult<Vec<u8>> {
            Ok(encoded.to_vec())
        }
    }

    struct CountingTranscriber {
        reply: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingTranscriber {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl crate::services::transcription::TranscriptionService for CountingTranscriber {
        async fn transcribe(
            &self,
            _wav: Vec<u8>,
            _language: &str,
            _prompt: Option<&str>,
        ) -> SessionResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SessionError::Service("transcription unavailable".into()))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    struct DeterministicCoach {
        improve_calls: AtomicUsize,
    }

    impl DeterministicCoach {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                improve_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InterviewCoach for DeterministicCoach {
        async fn generate_questions(&self, _role: &str, count: usize) -> SessionResult<Vec<String>> {
            Ok((0..count).map(|i| format!("Question {}?", i + 1)).collect())
        }

        async fn realtime_feedback(
            &self,
            _question: &str,
            _transcript: &str,
        ) -> SessionResult<String> {
            Ok("Good pacing, add a concrete example.".to_string())
        }

        async fn improve_answer(&self, _question: &str, transcript: &str) -> ImprovedAnswer {
            self.improve_calls.fetch_add(1, Ordering::SeqCst);
            ImprovedAnswer {
                points: vec!["Quantify the impact".to_string()],
                suggested: format!("Polished: {}", transcript),
            }
        }
    }

    fn pipeline_with(
        transcriber: Arc<CountingTranscriber>,
        coach: Arc<DeterministicCoach>,
    ) -> VocalResponsePipeline {
        let config = AppConfig::default();
        VocalResponsePipeline::new(
            &config,
            Arc::new(PassthroughTranscoder),
            transcriber,
            coach,
        )
    }

    /// 16kHz s16le sine wave of the given duration, loud enough to count as
    /// speech.
    fn speaking_pcm(secs: f64) -> Vec<u8> {
        let count = (16000.0 * secs) as usize;
        let mut pcm = Vec::with_capacity(count * 2);
        for i in 0..count {
            let t = i as f32 / 16000.0;
            let sample = ((t * 150.0 * 2.0 * std::f32::consts::PI).sin() * 0.3 * 32767.0) as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        pcm
    }

    fn silent_pcm(secs: f64) -> Vec<u8> {
        vec![0u8; (16000.0 * secs) as usize * 2]
    }

    #[tokio::test]
    async fn test_silent_chunks_never_reach_the_transcriber() {
        let transcriber = CountingTranscriber::replying("should not appear");
        let mut pipeline = pipeline_with(transcriber.clone(), DeterministicCoach::new());

        for _ in 0..5 {
            let outcome = pipeline
                .process_response(&silent_pcm(3.0), "Tell me about yourself")
                .await
                .unwrap();
            assert!(!outcome.analysis.is_speaking);
            assert!(outcome.transcript.is_none());
        }

        assert_eq!(transcriber.call_count(), 0);
        assert!(pipeline.history().is_empty());
    }

    #[tokio::test]
    async fn test_speaking_chunk_past_threshold_is_transcribed() {
        let transcriber = CountingTranscriber::replying("I enjoy solving hard problems.");
        let mut pipeline = pipeline_with(transcriber.clone(), DeterministicCoach::new());

        let outcome = pipeline
            .process_response(&speaking_pcm(2.5), "Tell me about yourself")
            .await
            .unwrap();

        assert!(outcome.analysis.is_speaking);
        assert_eq!(outcome.transcript.as_deref(), Some("I enjoy solving hard problems."));
        assert_eq!(transcriber.call_count(), 1);
        assert_eq!(pipeline.history().len(), 1);
        assert_eq!(pipeline.history()[0].question, "Tell me about yourself");
    }

    #[tokio::test]
    async fn test_short_utterance_accumulates_until_threshold() {
        let transcriber = CountingTranscriber::replying("Accumulated answer.");
        let mut pipeline = pipeline_with(transcriber.clone(), DeterministicCoach::new());

        // 1.2s: below the 2s minimum, buffered but not transcribed
        let outcome = pipeline
            .process_response(&speaking_pcm(1.2), "Question one?")
            .await
            .unwrap();
        assert!(outcome.transcript.is_none());
        assert_eq!(transcriber.call_count(), 0);

        // Another 1.2s crosses the threshold
        let outcome = pipeline
            .process_response(&speaking_pcm(1.2), "Question one?")
            .await
            .unwrap();
        assert_eq!(outcome.transcript.as_deref(), Some("Accumulated answer."));
        assert_eq!(transcriber.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_transcription_keeps_buffer_for_retry() {
        let transcriber = CountingTranscriber::failing();
        let mut pipeline = pipeline_with(transcriber.clone(), DeterministicCoach::new());

        let outcome = pipeline
            .process_response(&speaking_pcm(2.5), "Question one?")
            .await
            .unwrap();
        assert!(outcome.transcript.is_none());
        assert_eq!(transcriber.call_count(), 1);

        // The buffer survived the failure and retries with the next chunk
        let _ = pipeline
            .process_response(&speaking_pcm(0.5), "Question one?")
            .await
            .unwrap();
        assert_eq!(transcriber.call_count(), 2);
    }

    #[tokio::test]
    async fn test_summary_flushes_buffered_audio_first() {
        let transcriber = CountingTranscriber::replying("A short buffered answer.");
        let coach = DeterministicCoach::new();
        let mut pipeline = pipeline_with(transcriber.clone(), coach.clone());

        // Below the threshold: stays in the buffer
        let _ = pipeline
            .process_response(&speaking_pcm(1.0), "Question one?")
            .await
            .unwrap();
        assert_eq!(transcriber.call_count(), 0);

        let summary = pipeline.summary().await.unwrap();
        assert_eq!(transcriber.call_count(), 1);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].question, "Question one?");
        assert_eq!(summary[0].your_response, "A short buffered answer.");
        assert_eq!(summary[0].suggested_response, "Polished: A short buffered answer.");
    }

    #[tokio::test]
    async fn test_summary_is_idempotent_without_new_audio() {
        let transcriber = CountingTranscriber::replying("I led a platform migration.");
        let coach = DeterministicCoach::new();
        let mut pipeline = pipeline_with(transcriber.clone(), coach.clone());

        let _ = pipeline
            .process_response(&speaking_pcm(2.5), "Question one?")
            .await
            .unwrap();

        let first = pipeline.summary().await.unwrap();
        let second = pipeline.summary().await.unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].question, second[0].question);
        assert_eq!(first[0].your_response, second[0].your_response);
        assert_eq!(first[0].suggested_response, second[0].suggested_response);
        assert_eq!(first[0].points_to_change, second[0].points_to_change);
    }

    #[tokio::test]
    async fn test_summary_uses_canned_suggestion_for_tiny_transcript() {
        // Real coach pointed at a closed port: any external call would fail,
        // so the canned result also proves no request was attempted.
        let mut services = AppConfig::default().services;
        services.completion_url = "http://127.0.0.1:1/v1/chat/completions".to_string();
        services.request_timeout_secs = 1;
        let coach = Arc::new(crate::services::completion::OpenAiCoach::new(
            "test-key".to_string(),
            &services,
            5,
        ));

        let transcriber = CountingTranscriber::replying("Yes");
        let config = AppConfig::default();
        let mut pipeline = VocalResponsePipeline::new(
            &config,
            Arc::new(PassthroughTranscoder),
            transcriber,
            coach,
        );

        let _ = pipeline
            .process_response(&speaking_pcm(2.5), "Question one?")
            .await
            .unwrap();
        assert_eq!(pipeline.history().len(), 1);
        assert_eq!(pipeline.history()[0].transcript, "Yes");

        let summary = pipeline.summary().await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(
            summary[0].points_to_change,
            vec!["Answer too short, expand with more detail.".to_string()]
        );
        assert_eq!(
            summary[0].suggested_response,
            "Try elaborating more clearly on your experience."
        );
    }

    #[tokio::test]
    async fn test_reset_clears_history_and_buffer() {
        let transcriber = CountingTranscriber::replying("Some answer.");
        let mut pipeline = pipeline_with(transcriber.clone(), DeterministicCoach::new());

        let _ = pipeline
            .process_response(&speaking_pcm(2.5), "Question one?")
            .await
            .unwrap();
        assert_eq!(pipeline.history().len(), 1);

        pipeline.reset();
        assert!(pipeline.history().is_empty());
        let summary = pipeline.summary().await.unwrap();
        assert!(summary.is_empty());
    }
}
