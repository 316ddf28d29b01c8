//! # WebSocket Interview Session Handler
//!
//! Candidates connect to `/ws/interview` and drive the whole interview over
//! one connection with typed JSON messages (one message = one action).
//!
//! ## Session protocol:
//! - **Client → Server**: `SETUP{role}`, `REQUEST_QUESTION{questionIndex}`,
//!   `AUDIO_RESPONSE{audioData, questionIndex, questionText}`,
//!   `INTERVIEW_COMPLETE`
//! - **Server → Client**: `connection_ack`, `QUESTIONS_READY`,
//!   `QUESTION_AUDIO`, `AUDIO_ERROR`, `TRANSCRIPT`, `REALTIME_FEEDBACK`,
//!   `INTERVIEW_COMPLETE`, `SUMMARY`, `ERROR`
//!
//! ## Actor Model:
//! Each connection is one Actix actor plus one session worker task. The
//! actor parses frames and forwards commands into the worker's queue; the
//! worker emits notices through a channel the actor pumps back to the
//! socket. Commands are processed strictly in arrival order, and notice
//! order on the wire is the order the worker generated them in.
//!
//! Unparseable or unknown messages produce an `ERROR` notice and leave the
//! session state untouched; the connection stays open.

use crate::pipeline::SummaryItem;
use crate::services::Collaborators;
use crate::session::{SessionCommand, SessionWorker};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long without any client traffic before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on queued-but-unprocessed session commands. The worker handles one
/// command at a time; a full queue means the client is flooding chunks
/// faster than they can possibly be processed.
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Message types accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Start an interview for a role: generates questions and audio
    #[serde(rename = "SETUP")]
    Setup { role: String },

    /// Request delivery of one question's audio
    #[serde(rename = "REQUEST_QUESTION", rename_all = "camelCase")]
    RequestQuestion { question_index: usize },

    /// One recorded chunk of the candidate's answer (base64 audio)
    #[serde(rename = "AUDIO_RESPONSE", rename_all = "camelCase")]
    AudioResponse {
        audio_data: String,
        question_index: usize,
        #[serde(default)]
        question_text: Option<String>,
    },

    /// End the interview and request the final summary
    #[serde(rename = "INTERVIEW_COMPLETE")]
    InterviewComplete,
}

impl From<ClientMessage> for SessionCommand {
    fn from(message: ClientMessage) -> Self {
        match message {
            ClientMessage::Setup { role } => SessionCommand::Setup { role },
            ClientMessage::RequestQuestion { question_index } => SessionCommand::RequestQuestion {
                index: question_index,
            },
            ClientMessage::AudioResponse {
                audio_data,
                question_index,
                question_text,
            } => SessionCommand::AudioResponse {
                audio_data,
                question_index,
                question_text,
            },
            ClientMessage::InterviewComplete => SessionCommand::Complete,
        }
    }
}

/// Notices sent to the client. Every state transition in the session is
/// observable through one of these; none are silent.
#[derive(Debug, Clone, Serialize, Message)]
#[rtype(result = "()")]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Greeting sent as soon as the connection opens
    #[serde(rename = "connection_ack")]
    ConnectionAck { message: String },

    /// Setup finished: all questions with their audio artifact state
    #[serde(rename = "QUESTIONS_READY", rename_all = "camelCase")]
    QuestionsReady {
        questions: Vec<String>,
        total_questions: usize,
        /// One entry per question; `null` marks a failed artifact
        audio_files: Vec<Option<String>>,
        has_audio_errors: bool,
    },

    /// One question's audio payload
    #[serde(rename = "QUESTION_AUDIO", rename_all = "camelCase")]
    QuestionAudio {
        audio_data: String,
        question_index: usize,
        question_text: String,
        format: String,
    },

    /// The question's audio could not be delivered; interview continues
    #[serde(rename = "AUDIO_ERROR", rename_all = "camelCase")]
    AudioError {
        message: String,
        question_index: usize,
    },

    /// A fresh transcript of the candidate's speech
    #[serde(rename = "TRANSCRIPT", rename_all = "camelCase")]
    Transcript {
        transcript: String,
        question_index: usize,
    },

    /// Throttled coaching feedback for the latest transcript
    #[serde(rename = "REALTIME_FEEDBACK", rename_all = "camelCase")]
    RealtimeFeedback {
        feedback: FeedbackPayload,
        question_index: usize,
    },

    /// The question pointer ran past the last question
    #[serde(rename = "INTERVIEW_COMPLETE")]
    InterviewComplete { message: String },

    /// The final structured summary
    #[serde(rename = "SUMMARY")]
    Summary { feedback: SummaryPayload },

    /// Protocol or session error; the connection stays open
    #[serde(rename = "ERROR")]
    Error { message: String },
}

/// Body of a `REALTIME_FEEDBACK` notice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackPayload {
    pub ai_feedback: String,
    pub transcript: String,
    pub question: String,
}

/// Body of a `SUMMARY` notice.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryPayload {
    pub result: Vec<SummaryItem>,
}

const KNOWN_MESSAGE_TYPES: &[&str] = &[
    "SETUP",
    "REQUEST_QUESTION",
    "AUDIO_RESPONSE",
    "INTERVIEW_COMPLETE",
];

/// Parse one inbound frame, distinguishing a malformed payload from an
/// unknown message type so each gets the right error text.
pub fn parse_client_message(raw: &str) -> Result<ClientMessage, String> {
    match serde_json::from_str::<ClientMessage>(raw) {
        Ok(message) => Ok(message),
        Err(parse_err) => {
            let value: serde_json::Value = match serde_json::from_str(raw) {
                Ok(value) => value,
                Err(_) => return Err("Invalid message format".to_string()),
            };

            match value.get("type").and_then(|t| t.as_str()) {
                Some(t) if KNOWN_MESSAGE_TYPES.contains(&t) => {
                    Err(format!("Invalid message format: {}", parse_err))
                }
                Some(t) => Err(format!("Unknown message type: {}", t)),
                None => Err("Invalid message format".to_string()),
            }
        }
    }
}

/// WebSocket actor for one interview connection.
pub struct InterviewWebSocket {
    /// Commands flow to the session worker in arrival order
    commands: mpsc::Sender<SessionCommand>,

    /// Worker notices, pumped to the socket once the actor starts
    notices: Option<mpsc::UnboundedReceiver<ServerMessage>>,

    /// Shared app state for the session gauge
    state: AppState,

    /// Last time we heard anything from the client
    last_heartbeat: Instant,
}

impl InterviewWebSocket {
    pub fn new(
        commands: mpsc::Sender<SessionCommand>,
        notices: mpsc::UnboundedReceiver<ServerMessage>,
        state: AppState,
    ) -> Self {
        Self {
            commands,
            notices: Some(notices),
            state,
            last_heartbeat: Instant::now(),
        }
    }

    fn send_message(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => warn!(error = %e, "failed to serialize outbound notice"),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        warn!(message, "session protocol error");
        self.send_message(
            ctx,
            &ServerMessage::Error {
                message: message.to_string(),
            },
        );
    }

    /// Forward a parsed message to the session worker.
    fn forward(&self, command: SessionCommand, ctx: &mut ws::WebsocketContext<Self>) {
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.send_error(
                    ctx,
                    "Server is still processing previous messages, please slow down.",
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Worker already ended (fatal session error); the notice
                // stream finishing will stop this actor shortly
                warn!("session worker is gone, dropping message");
            }
        }
    }
}

impl Actor for InterviewWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("interview connection started");
        self.state.increment_active_sessions();

        // Pump worker notices to the socket in generation order
        if let Some(notices) = self.notices.take() {
            ctx.add_stream(UnboundedReceiverStream::new(notices));
        }

        self.send_message(
            ctx,
            &ServerMessage::ConnectionAck {
                message: "Connected for interview practice".to_string(),
            },
        );

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("client heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("interview connection stopped");
        self.state.decrement_active_sessions();
        // Dropping the command sender closes the worker's queue; the worker
        // drains, deletes this session's artifacts, and exits
    }
}

/// Inbound frames from the client.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for InterviewWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match parse_client_message(&text) {
                    Ok(message) => {
                        debug!("inbound session message accepted");
                        self.forward(message.into(), ctx);
                    }
                    Err(description) => self.send_error(ctx, &description),
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.send_error(ctx, "Binary frames are not part of the interview protocol");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("interview connection closed: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Worker notices flowing out to the client. When the worker ends (fatal
/// session error), this stream finishes and the actor stops with it.
impl StreamHandler<ServerMessage> for InterviewWebSocket {
    fn handle(&mut self, message: ServerMessage, ctx: &mut Self::Context) {
        self.send_message(ctx, &message);
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and wires one
/// actor + one session worker per connection.
pub async fn interview_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    collaborators: web::Data<Collaborators>,
) -> ActixResult<HttpResponse> {
    info!(
        "new interview connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    let config = app_state.get_config();
    if app_state.active_session_count() >= config.performance.max_concurrent_sessions as u32 {
        warn!("rejecting connection: session limit reached");
        return Ok(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "Maximum concurrent interview sessions reached"
        })));
    }

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();

    let worker = SessionWorker::new(
        config,
        collaborators.get_ref().clone(),
        notice_tx,
        app_state.get_ref().clone(),
    );
    tokio::spawn(worker.run(command_rx));

    ws::start(
        InterviewWebSocket::new(command_tx, notice_rx, app_state.get_ref().clone()),
        &req,
        stream,
    )
}
