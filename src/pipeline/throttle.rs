//! # Feedback Throttling
//!
//! Rate-limits coaching requests: at most one per fixed interval regardless
//! of how fast chunks arrive, and never for trivially short transcripts.
//! The gate is a pure function of an injected `Instant` so tests can probe
//! the timing behavior without sleeping.

use std::time::{Duration, Instant};

/// Gate in front of the coaching collaborator.
pub struct FeedbackThrottle {
    interval: Duration,
    min_transcript_len: usize,
    last_accepted: Option<Instant>,
}

impl FeedbackThrottle {
    pub fn new(interval: Duration, min_transcript_len: usize) -> Self {
        Self {
            interval,
            min_transcript_len,
            last_accepted: None,
        }
    }

    /// Decide whether a coaching request may be issued at `now`.
    ///
    /// Accepting stamps the time, so the next acceptance is at least one
    /// full interval away.
    pub fn admit(&mut self, transcript: &str, now: Instant) -> bool {
        if transcript.chars().count() < self.min_transcript_len {
            return false;
        }

        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }

        self.last_accepted = Some(now);
        true
    }

    /// Forget the last acceptance (called on session reset).
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
