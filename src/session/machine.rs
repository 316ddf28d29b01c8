//! # Session State Machine
//!
//! The interview lifecycle as an explicit enum with per-message admission
//! checks:
//!
//! ```text
//! Idle -> SetupInProgress -> Ready -> AwaitingResponse -> Completing -> Closed
//! ```
//!
//! `Error` is reachable from any state for unrecoverable local failures.
//! Admission is checked before any work happens, so an illegal message
//! (e.g. audio before setup) is rejected with the state unchanged — never a
//! silent transition.

/// Lifecycle state of one interview session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connection open, no interview configured yet
    Idle,
    /// Questions and audio artifacts are being generated
    SetupInProgress,
    /// Questions ready, waiting for the first question request
    Ready,
    /// A question was delivered; candidate audio is expected
    AwaitingResponse,
    /// All questions exhausted or completion requested
    Completing,
    /// Summary delivered and state reset; `SETUP` is accepted again
    Closed,
    /// Unrecoverable local failure; the session is done
    Error,
}

impl SessionPhase {
    /// Stable lowercase label for logs and notices.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::SetupInProgress => "setup_in_progress",
            SessionPhase::Ready => "ready",
            SessionPhase::AwaitingResponse => "awaiting_response",
            SessionPhase::Completing => "completing",
            SessionPhase::Closed => "closed",
            SessionPhase::Error => "error",
        }
    }

    /// `SETUP` starts a fresh interview: from a new connection or after a
    /// completed one (session reuse is permitted, not required).
    pub fn accepts_setup(self) -> bool {
        matches!(self, SessionPhase::Idle | SessionPhase::Closed)
    }

    /// `REQUEST_QUESTION` advances or re-reads the question pointer.
    pub fn accepts_question_request(self) -> bool {
        matches!(self, SessionPhase::Ready | SessionPhase::AwaitingResponse)
    }

    /// `AUDIO_RESPONSE` is only meaningful while a question is outstanding.
    pub fn accepts_audio(self) -> bool {
        matches!(self, SessionPhase::AwaitingResponse)
    }

    /// `INTERVIEW_COMPLETE` may arrive after the last question or early,
    /// while the interview is underway.
    pub fn accepts_completion(self) -> bool {
        matches!(
            self,
            SessionPhase::Ready | SessionPhase::AwaitingResponse | SessionPhase::Completing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_only_from_idle_or_closed() {
        assert!(SessionPhase::Idle.accepts_setup());
        assert!(SessionPhase::Closed.accepts_setup());

        assert!(!SessionPhase::SetupInProgress.accepts_setup());
        assert!(!SessionPhase::Ready.accepts_setup());
        assert!(!SessionPhase::AwaitingResponse.accepts_setup());
        assert!(!SessionPhase::Error.accepts_setup());
    }

    #[test]
    fn test_audio_before_setup_is_illegal() {
        assert!(!SessionPhase::Idle.accepts_audio());
        assert!(!SessionPhase::Ready.accepts_audio());
        assert!(SessionPhase::AwaitingResponse.accepts_audio());
    }

    #[test]
    fn test_question_requests_while_interview_is_live() {
        assert!(SessionPhase::Ready.accepts_question_request());
        assert!(SessionPhase::AwaitingResponse.accepts_question_request());

        assert!(!SessionPhase::Idle.accepts_question_request());
        assert!(!SessionPhase::Completing.accepts_question_request());
        assert!(!SessionPhase::Closed.accepts_question_request());
    }

    #[test]
    fn test_completion_admission() {
        assert!(SessionPhase::Ready.accepts_completion());
        assert!(SessionPhase::AwaitingResponse.accepts_completion());
        assert!(SessionPhase::Completing.accepts_completion());

        assert!(!SessionPhase::Idle.accepts_completion());
        assert!(!SessionPhase::Closed.accepts_completion());
    }

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(SessionPhase::AwaitingResponse.as_str(), "awaiting_response");
        assert_eq!(SessionPhase::Closed.as_str(), "closed");
    }
}
