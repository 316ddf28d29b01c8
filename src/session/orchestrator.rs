//! # Session Orchestrator
//!
//! The per-connection worker task. The WebSocket actor forwards parsed
//! client messages as [`SessionCommand`]s through an mpsc queue; the worker
//! processes them strictly in arrival order (session state is mutated in
//! place with no internal locking) and emits [`ServerMessage`] notices back
//! through an unbounded channel the actor pumps to the socket. Notice order
//! per connection is therefore generation order.
//!
//! ## Command handling:
//! - `Setup`: generate questions, then synthesize audio per question
//!   sequentially (the synthesis service is single-context per connection).
//!   A synthesis failure marks that question's artifact failed and moves on.
//! - `RequestQuestion`: deliver a question's audio, or the completion notice
//!   once the index runs past the last question.
//! - `AudioResponse`: push the chunk through the vocal pipeline; a fresh
//!   transcript notice is always emitted before its coaching notice.
//! - `Complete`: summary, persistence, artifact cleanup, in-place reset.
//!
//! Closing the connection closes the command channel; the worker drains,
//! cleans up artifacts, and exits. In-flight external calls complete and
//! their results are discarded.

use crate::config::AppConfig;
use crate::error::SessionError;
use crate::pipeline::VocalResponsePipeline;
use crate::services::{Collaborators, InterviewRecord, VoiceSelection};
use crate::session::machine::SessionPhase;
use crate::session::record::{
    cleanup_artifacts, store_artifact, ArtifactState, QuestionRecord,
};
use crate::state::AppState;
use crate::websocket::{FeedbackPayload, ServerMessage, SummaryPayload};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A parsed client message, forwarded by the WebSocket actor.
#[derive(Debug)]
pub enum SessionCommand {
    Setup {
        role: String,
    },
    RequestQuestion {
        index: usize,
    },
    AudioResponse {
        audio_data: String,
        question_index: usize,
        question_text: Option<String>,
    },
    Complete,
}

impl SessionCommand {
    fn label(&self) -> &'static str {
        match self {
            SessionCommand::Setup { .. } => "SETUP",
            SessionCommand::RequestQuestion { .. } => "REQUEST_QUESTION",
            SessionCommand::AudioResponse { .. } => "AUDIO_RESPONSE",
            SessionCommand::Complete => "INTERVIEW_COMPLETE",
        }
    }
}

/// Keyword sets used to pick an interviewer voice per question.
const TECHNICAL_KEYWORDS: &[&str] = &[
    "experience", "project", "technical", "code", "python", "java", "debug", "system",
];
const BEHAVIORAL_KEYWORDS: &[&str] = &[
    "team", "conflict", "challenge", "mistake", "goal", "behavior", "situation",
];
const TECHNICAL_VOICES: &[&str] = &["cooper", "ryan"];
const BEHAVIORAL_VOICES: &[&str] = &["hazel", "imani"];

/// The per-connection session worker.
pub struct SessionWorker {
    phase: SessionPhase,
    role: Option<String>,
    records: Vec<QuestionRecord>,
    pipeline: VocalResponsePipeline,
    collaborators: Collaborators,
    notices: mpsc::UnboundedSender<ServerMessage>,
    state: AppState,
    config: AppConfig,
    artifact_dir: PathBuf,
}

impl SessionWorker {
    pub fn new(
        config: AppConfig,
        collaborators: Collaborators,
        notices: mpsc::UnboundedSender<ServerMessage>,
        state: AppState,
    ) -> Self {
        let pipeline = VocalResponsePipeline::new(
            &config,
            collaborators.transcoder.clone(),
            collaborators.transcriber.clone(),
            collaborators.coach.clone(),
        );
        let artifact_dir = PathBuf::from(&config.audio.artifact_dir);

        Self {
            phase: SessionPhase::Idle,
            role: None,
            records: Vec::new(),
            pipeline,
            collaborators,
            notices,
            state,
            config,
            artifact_dir,
        }
    }

    /// Consume commands until the connection goes away or the session hits a
    /// fatal error, then clean up temporary artifacts.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        while let Some(command) = commands.recv().await {
            self.handle(command).await;

            if self.phase == SessionPhase::Error {
                break;
            }
        }

        cleanup_artifacts(&self.records).await;
        debug!("session worker finished");
    }

    async fn handle(&mut self, command: SessionCommand) {
        debug!(phase = self.phase.as_str(), command = command.label(), "handling session command");

        match command {
            SessionCommand::Setup { role } => self.handle_setup(role).await,
            SessionCommand::RequestQuestion { index } => self.handle_request_question(index).await,
            SessionCommand::AudioResponse {
                audio_data,
                question_index,
                question_text,
            } => {
                self.handle_audio_response(audio_data, question_index, question_text)
                    .await
            }
            SessionCommand::Complete => self.handle_complete().await,
        }
    }

    async fn handle_setup(&mut self, role: String) {
        if !self.phase.accepts_setup() {
            self.reject("SETUP");
            return;
        }
        self.phase = SessionPhase::SetupInProgress;
        info!(role = %role, "setting up interview");

        let request_timeout = Duration::from_secs(self.config.services.request_timeout_secs);
        let question_count = self.config.interview.question_count;

        let questions = match tokio::time::timeout(
            request_timeout,
            self.collaborators.coach.generate_questions(&role, question_count),
        )
        .await
        {
            Ok(Ok(questions)) => questions,
            Ok(Err(e)) => {
                warn!(error = %e, "question generation failed");
                self.notify(ServerMessage::Error {
                    message: "Failed to generate questions or audio. Please try again."
                        .to_string(),
                });
                self.phase = SessionPhase::Idle;
                return;
            }
            Err(_) => {
                warn!("question generation timed out");
                self.notify(ServerMessage::Error {
                    message: "Failed to generate questions or audio. Please try again."
                        .to_string(),
                });
                self.phase = SessionPhase::Idle;
                return;
            }
        };

        self.role = Some(role);

        // One synthesis job at a time: the streaming service supports a
        // single context per connection, and sequencing bounds resource use.
        let mut has_audio_errors = false;
        let mut records = Vec::with_capacity(questions.len());

        for (index, question) in questions.iter().enumerate() {
            let voice = self.assign_voice(question).await;
            debug!(index, voice_id = %voice.voice_id, "generating question audio");

            let artifact = match self.collaborators.synthesizer.synthesize(question, &voice).await {
                Ok(audio) => {
                    match store_artifact(&self.artifact_dir, index, &audio, &voice.voice_id, &voice.style)
                        .await
                    {
                        Ok(artifact) => artifact,
                        Err(e) => {
                            // Local storage failure, not a provider hiccup
                            self.fail_session(e);
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(index, error = %e, "question audio generation failed");
                    has_audio_errors = true;
                    ArtifactState::Failed { error: e.to_string() }
                }
            };

            records.push(QuestionRecord {
                index,
                text: question.clone(),
                artifact,
            });
        }

        self.records = records;
        self.state.record_questions_generated(questions.len());

        let audio_files = self
            .records
            .iter()
            .map(|record| record.filename().map(str::to_string))
            .collect();

        self.notify(ServerMessage::QuestionsReady {
            total_questions: questions.len(),
            questions,
            audio_files,
            has_audio_errors,
        });
        self.phase = SessionPhase::Ready;
    }

    async fn handle_request_question(&mut self, index: usize) {
        if !self.phase.accepts_question_request() {
            self.reject("REQUEST_QUESTION");
            return;
        }

        if index >= self.records.len() {
            self.notify(ServerMessage::InterviewComplete {
                message: "Congratulations! You have completed all the questions.".to_string(),
            });
            self.phase = SessionPhase::Completing;
            return;
        }

        let record = &self.records[index];
        match record.read_audio().await {
            Ok(audio) => {
                self.notify(ServerMessage::QuestionAudio {
                    audio_data: BASE64.encode(&audio),
                    question_index: index,
                    question_text: record.text.clone(),
                    format: "base64_wav".to_string(),
                });
            }
            Err(e) => {
                // The question is still delivered, text-only, via the error
                // notice; the interview never blocks on a missing artifact.
                warn!(index, error = %e, "question audio unavailable");
                self.notify(ServerMessage::AudioError {
                    message: "Could not load audio for this question.".to_string(),
                    question_index: index,
                });
            }
        }

        self.phase = SessionPhase::AwaitingResponse;
    }

    async fn handle_audio_response(
        &mut self,
        audio_data: String,
        question_index: usize,
        question_text: Option<String>,
    ) {
        if !self.phase.accepts_audio() {
            self.reject("AUDIO_RESPONSE");
            return;
        }

        let question = question_text
            .or_else(|| self.records.get(question_index).map(|r| r.text.clone()))
            .unwrap_or_else(|| "(Unknown question)".to_string());

        let encoded = match BASE64.decode(audio_data.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "dropping chunk with invalid base64 audio");
                return;
            }
        };

        match self.pipeline.process_response(&encoded, &question).await {
            Ok(outcome) => {
                if let Some(transcript) = outcome.transcript {
                    // Transcript first, its coaching notice second - always
                    self.notify(ServerMessage::Transcript {
                        transcript: transcript.clone(),
                        question_index,
                    });

                    if let Some(feedback) = self.pipeline.maybe_feedback(&question, &transcript).await
                    {
                        self.notify(ServerMessage::RealtimeFeedback {
                            feedback: FeedbackPayload {
                                ai_feedback: feedback,
                                transcript,
                                question,
                            },
                            question_index,
                        });
                    }
                }
            }
            Err(e) if e.is_fatal() => self.fail_session(e),
            Err(e) => {
                warn!(error = %e, "dropping audio chunk");
            }
        }
    }

    async fn handle_complete(&mut self) {
        if !self.phase.accepts_completion() {
            self.reject("INTERVIEW_COMPLETE");
            return;
        }
        self.phase = SessionPhase::Completing;
        info!("interview completed, generating final summary");

        let summary = match self.pipeline.summary().await {
            Ok(summary) => summary,
            Err(e) if e.is_fatal() => {
                self.fail_session(e);
                return;
            }
            Err(e) => {
                warn!(error = %e, "summary degraded to empty");
                Vec::new()
            }
        };

        let record = InterviewRecord {
            role: self.role.clone().unwrap_or_default(),
            questions: self.records.iter().map(|r| r.text.clone()).collect(),
            transcript_history: self.pipeline.history().to_vec(),
            summary: summary.clone(),
            timestamp: chrono::Utc::now(),
        };

        if let Err(e) = self.collaborators.store.save(&record).await {
            // The candidate already has their summary; losing the stored
            // record is log-worthy, not session-fatal
            warn!(error = %e, "failed to persist interview record");
        }

        self.notify(ServerMessage::Summary {
            feedback: SummaryPayload { result: summary },
        });

        cleanup_artifacts(&self.records).await;
        self.records.clear();
        self.pipeline.reset();
        self.role = None;
        self.state.record_interview_completed();
        self.phase = SessionPhase::Closed;
    }

    /// Resolve a voice for one question via the catalog, falling back to the
    /// configured default if the catalog is unreachable.
    async fn assign_voice(&self, question: &str) -> VoiceSelection {
        let style = self.config.services.default_voice_style.clone();
        let (preferred, gender) = interviewer_preference(question);

        for name in preferred {
            match self.collaborators.voices.find_voice_by_name(name).await {
                Ok(Some(voice_id)) => return VoiceSelection { voice_id, style },
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "voice lookup failed");
                    break;
                }
            }
        }

        match self.collaborators.voices.random_voice("en", gender).await {
            Ok(voice_id) => VoiceSelection { voice_id, style },
            Err(e) => {
                warn!(error = %e, "falling back to default voice");
                VoiceSelection {
                    voice_id: self.config.services.default_voice_id.clone(),
                    style,
                }
            }
        }
    }

    fn reject(&self, what: &str) {
        warn!(
            phase = self.phase.as_str(),
            message_type = what,
            "message rejected in current state"
        );
        self.notify(ServerMessage::Error {
            message: format!(
                "{} is not valid while the session is {}",
                what,
                self.phase.as_str()
            ),
        });
    }

    fn fail_session(&mut self, e: SessionError) {
        error!(error = %e, "fatal session error");
        self.notify(ServerMessage::Error {
            message: "Internal session error. Please reconnect.".to_string(),
        });
        self.phase = SessionPhase::Error;
    }

    fn notify(&self, message: ServerMessage) {
        if self.notices.send(message).is_err() {
            debug!("notice channel closed, connection is gone");
        }
    }
}

/// Classify a question and return the preferred interviewer voices for it.
fn interviewer_preference(question: &str) -> (&'static [&'static str], Option<&'static str>) {
    let lower = question.to_lowercase();

    if TECHNICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        (TECHNICAL_VOICES, Some("male"))
    } else if BEHAVIORAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        (BEHAVIORAL_VOICES, Some("female"))
    } else {
        (&[], None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionResult;
    use crate::pipeline::Transcoder;
    use crate::services::completion::{ImprovedAnswer, InterviewCoach};
    use crate::services::store::SessionStore;
    use crate::services::synthesis::SpeechSynthesizer;
    use crate::services::transcription::TranscriptionService;
    use crate::services::voices::VoiceDirectory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct PassthroughTranscoder;

    #[async_trait]
    impl Transcoder for PassthroughTranscoder {
        async fn decode_to_pcm(&self, encoded: &[u8]) -> SessionResult<Vec<u8>> {
            Ok(encoded.to_vec())
        }
    }

    struct StubTranscriber {
        reply: String,
    }

    #[async_trait]
    impl TranscriptionService for StubTranscriber {
        async fn transcribe(
            &self,
            _wav: Vec<u8>,
            _language: &str,
            _prompt: Option<&str>,
        ) -> SessionResult<String> {
            Ok(self.reply.clone())
        }
    }

    struct StubCoach;

    #[async_trait]
    impl InterviewCoach for StubCoach {
        async fn generate_questions(&self, role: &str, count: usize) -> SessionResult<Vec<String>> {
            Ok((0..count)
                .map(|i| format!("Question {} for a {}?", i + 1, role))
                .collect())
        }

        async fn realtime_feedback(
            &self,
            _question: &str,
            _transcript: &str,
        ) -> SessionResult<String> {
            Ok("Strong start, add a concrete example.".to_string())
        }

        async fn improve_answer(&self, _question: &str, transcript: &str) -> ImprovedAnswer {
            ImprovedAnswer {
                points: vec!["Quantify the impact".to_string()],
                suggested: format!("Polished: {}", transcript),
            }
        }
    }

    /// Synthesizer that can be told to fail specific jobs (1-based call
    /// numbers).
    struct ScriptedSynthesizer {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    impl ScriptedSynthesizer {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_on: Vec::new(),
            })
        }

        fn failing_on(calls: Vec<usize>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_on: calls,
            })
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedSynthesizer {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceSelection,
        ) -> SessionResult<Vec<u8>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                Err(SessionError::ServiceTimeout("speech synthesis".to_string()))
            } else {
                Ok(b"fake-wav-audio".to_vec())
            }
        }
    }

    struct StubVoices;

    #[async_trait]
    impl VoiceDirectory for StubVoices {
        async fn find_voice_by_name(&self, name: &str) -> SessionResult<Option<String>> {
            Ok(Some(format!("en-US-{}", name)))
        }

        async fn random_voice(
            &self,
            _locale_prefix: &str,
            _gender: Option<&str>,
        ) -> SessionResult<String> {
            Ok("en-US-cooper".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<InterviewRecord>>,
    }

    #[async_trait]
    impl SessionStore for RecordingStore {
        async fn save(&self, record: &InterviewRecord) -> SessionResult<()> {
            self.saved.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Harness {
        commands: mpsc::Sender<SessionCommand>,
        notices: mpsc::UnboundedReceiver<ServerMessage>,
        store: Arc<RecordingStore>,
    }

    fn spawn_worker(synthesizer: Arc<ScriptedSynthesizer>) -> Harness {
        let mut config = AppConfig::default();
        config.audio.artifact_dir = std::env::temp_dir()
            .join(format!("interview_test_{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string();

        let store = Arc::new(RecordingStore::default());
        let collaborators = Collaborators {
            coach: Arc::new(StubCoach),
            transcriber: Arc::new(StubTranscriber {
                reply: "I have five years of backend experience.".to_string(),
            }),
            transcoder: Arc::new(PassthroughTranscoder),
            synthesizer,
            voices: Arc::new(StubVoices),
            store: store.clone(),
        };

        let (command_tx, command_rx) = mpsc::channel(32);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let state = AppState::new(config.clone());

        let worker = SessionWorker::new(config, collaborators, notice_tx, state);
        tokio::spawn(worker.run(command_rx));

        Harness {
            commands: command_tx,
            notices: notice_rx,
            store,
        }
    }

    async fn next_notice(harness: &mut Harness) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(5), harness.notices.recv())
            .await
            .expect("timed out waiting for a notice")
            .expect("notice channel closed")
    }

    /// 2.5 seconds of loud 16kHz PCM, base64-encoded like a client chunk.
    fn speaking_chunk() -> String {
        let count = 40_000;
        let mut pcm = Vec::with_capacity(count * 2);
        for i in 0..count {
            let t = i as f32 / 16000.0;
            let sample = ((t * 150.0 * 2.0 * std::f32::consts::PI).sin() * 0.3 * 32767.0) as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        BASE64.encode(&pcm)
    }

    fn silent_chunk() -> String {
        BASE64.encode(vec![0u8; 80_000])
    }

    async fn setup_interview(harness: &mut Harness) -> ServerMessage {
        harness
            .commands
            .send(SessionCommand::Setup {
                role: "Backend Developer".to_string(),
            })
            .await
            .unwrap();
        next_notice(harness).await
    }

    #[tokio::test]
    async fn test_setup_emits_questions_ready_with_aligned_artifacts() {
        let mut harness = spawn_worker(ScriptedSynthesizer::succeeding());
        let notice = setup_interview(&mut harness).await;

        match notice {
            ServerMessage::QuestionsReady {
                questions,
                total_questions,
                audio_files,
                has_audio_errors,
            } => {
                assert_eq!(total_questions, 3);
                assert_eq!(questions.len(), 3);
                assert_eq!(audio_files.len(), 3);
                assert!(audio_files.iter().all(|f| f.is_some()));
                assert!(!has_audio_errors);
            }
            other => panic!("expected QUESTIONS_READY, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_setup_partial_success_marks_failed_artifact() {
        let mut harness = spawn_worker(ScriptedSynthesizer::failing_on(vec![2]));
        let notice = setup_interview(&mut harness).await;

        match notice {
            ServerMessage::QuestionsReady {
                audio_files,
                has_audio_errors,
                total_questions,
                ..
            } => {
                // Index alignment: the failed entry is marked, never omitted
                assert_eq!(total_questions, 3);
                assert_eq!(audio_files.len(), 3);
                assert!(audio_files[0].is_some());
                assert!(audio_files[1].is_none());
                assert!(audio_files[2].is_some());
                assert!(has_audio_errors);
            }
            other => panic!("expected QUESTIONS_READY, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_question_delivery_and_past_end_completion() {
        let mut harness = spawn_worker(ScriptedSynthesizer::succeeding());
        setup_interview(&mut harness).await;

        harness
            .commands
            .send(SessionCommand::RequestQuestion { index: 0 })
            .await
            .unwrap();
        match next_notice(&mut harness).await {
            ServerMessage::QuestionAudio {
                audio_data,
                question_index,
                question_text,
                format,
            } => {
                assert_eq!(question_index, 0);
                assert_eq!(format, "base64_wav");
                assert!(question_text.contains("Question 1"));
                assert_eq!(BASE64.decode(audio_data).unwrap(), b"fake-wav-audio");
            }
            other => panic!("expected QUESTION_AUDIO, got {:?}", other),
        }

        harness
            .commands
            .send(SessionCommand::RequestQuestion { index: 3 })
            .await
            .unwrap();
        match next_notice(&mut harness).await {
            ServerMessage::InterviewComplete { .. } => {}
            other => panic!("expected INTERVIEW_COMPLETE, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_artifact_degrades_to_audio_error() {
        let mut harness = spawn_worker(ScriptedSynthesizer::failing_on(vec![1]));
        setup_interview(&mut harness).await;

        harness
            .commands
            .send(SessionCommand::RequestQuestion { index: 0 })
            .await
            .unwrap();
        match next_notice(&mut harness).await {
            ServerMessage::AudioError { question_index, .. } => assert_eq!(question_index, 0),
            other => panic!("expected AUDIO_ERROR, got {:?}", other),
        }

        // The interview continues: the candidate can still answer
        harness
            .commands
            .send(SessionCommand::AudioResponse {
                audio_data: speaking_chunk(),
                question_index: 0,
                question_text: None,
            })
            .await
            .unwrap();
        match next_notice(&mut harness).await {
            ServerMessage::Transcript { .. } => {}
            other => panic!("expected TRANSCRIPT, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_audio_before_setup_is_rejected_without_state_change() {
        let mut harness = spawn_worker(ScriptedSynthesizer::succeeding());

        harness
            .commands
            .send(SessionCommand::AudioResponse {
                audio_data: speaking_chunk(),
                question_index: 0,
                question_text: None,
            })
            .await
            .unwrap();
        match next_notice(&mut harness).await {
            ServerMessage::Error { message } => {
                assert!(message.contains("AUDIO_RESPONSE"));
                assert!(message.contains("idle"));
            }
            other => panic!("expected ERROR, got {:?}", other),
        }

        // The rejection left the session usable
        match setup_interview(&mut harness).await {
            ServerMessage::QuestionsReady { .. } => {}
            other => panic!("expected QUESTIONS_READY, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transcript_notice_precedes_feedback_notice() {
        let mut harness = spawn_worker(ScriptedSynthesizer::succeeding());
        setup_interview(&mut harness).await;

        harness
            .commands
            .send(SessionCommand::RequestQuestion { index: 0 })
            .await
            .unwrap();
        next_notice(&mut harness).await; // QUESTION_AUDIO

        harness
            .commands
            .send(SessionCommand::AudioResponse {
                audio_data: speaking_chunk(),
                question_index: 0,
                question_text: Some("Question 1 for a Backend Developer?".to_string()),
            })
            .await
            .unwrap();

        match next_notice(&mut harness).await {
            ServerMessage::Transcript {
                transcript,
                question_index,
            } => {
                assert_eq!(question_index, 0);
                assert_eq!(transcript, "I have five years of backend experience.");
            }
            other => panic!("expected TRANSCRIPT first, got {:?}", other),
        }

        match next_notice(&mut harness).await {
            ServerMessage::RealtimeFeedback {
                feedback,
                question_index,
            } => {
                assert_eq!(question_index, 0);
                assert_eq!(feedback.ai_feedback, "Strong start, add a concrete example.");
                assert_eq!(feedback.transcript, "I have five years of backend experience.");
            }
            other => panic!("expected REALTIME_FEEDBACK second, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_chunk_produces_no_transcript_notice() {
        let mut harness = spawn_worker(ScriptedSynthesizer::succeeding());
        setup_interview(&mut harness).await;

        harness
            .commands
            .send(SessionCommand::RequestQuestion { index: 0 })
            .await
            .unwrap();
        next_notice(&mut harness).await; // QUESTION_AUDIO

        harness
            .commands
            .send(SessionCommand::AudioResponse {
                audio_data: silent_chunk(),
                question_index: 0,
                question_text: None,
            })
            .await
            .unwrap();
        harness.commands.send(SessionCommand::Complete).await.unwrap();

        // The worker is sequential: if the silent chunk had produced a
        // transcript, its notice would arrive before the summary
        match next_notice(&mut harness).await {
            ServerMessage::Summary { feedback } => assert!(feedback.result.is_empty()),
            other => panic!("expected SUMMARY with no transcript notice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_persists_record_and_permits_reuse() {
        let mut harness = spawn_worker(ScriptedSynthesizer::succeeding());
        setup_interview(&mut harness).await;

        harness
            .commands
            .send(SessionCommand::RequestQuestion { index: 0 })
            .await
            .unwrap();
        next_notice(&mut harness).await; // QUESTION_AUDIO

        harness
            .commands
            .send(SessionCommand::AudioResponse {
                audio_data: speaking_chunk(),
                question_index: 0,
                question_text: None,
            })
            .await
            .unwrap();
        next_notice(&mut harness).await; // TRANSCRIPT
        next_notice(&mut harness).await; // REALTIME_FEEDBACK

        harness.commands.send(SessionCommand::Complete).await.unwrap();
        match next_notice(&mut harness).await {
            ServerMessage::Summary { feedback } => {
                assert_eq!(feedback.result.len(), 1);
                assert_eq!(
                    feedback.result[0].your_response,
                    "I have five years of backend experience."
                );
                assert_eq!(
                    feedback.result[0].suggested_response,
                    "Polished: I have five years of backend experience."
                );
            }
            other => panic!("expected SUMMARY, got {:?}", other),
        }

        {
            let saved = harness.store.saved.lock().unwrap();
            assert_eq!(saved.len(), 1);
            assert_eq!(saved[0].role, "Backend Developer");
            assert_eq!(saved[0].questions.len(), 3);
            assert_eq!(saved[0].transcript_history.len(), 1);
        }

        // Session reuse: SETUP is accepted again after completion
        match setup_interview(&mut harness).await {
            ServerMessage::QuestionsReady { .. } => {}
            other => panic!("expected QUESTIONS_READY after reset, got {:?}", other),
        }
    }

    #[test]
    fn test_interviewer_preference_classification() {
        let (voices, gender) = interviewer_preference("Describe a technical project you led.");
        assert_eq!(voices, TECHNICAL_VOICES);
        assert_eq!(gender, Some("male"));

        let (voices, gender) = interviewer_preference("Tell me about a conflict in your team.");
        assert_eq!(voices, BEHAVIORAL_VOICES);
        assert_eq!(gender, Some("female"));

        let (voices, gender) = interviewer_preference("Why do you want this job?");
        assert!(voices.is_empty());
        assert_eq!(gender, None);
    }
}
