//! # Utterance Buffer and Transcript History
//!
//! The buffering half of the vocal response pipeline: speaking chunks
//! accumulate raw PCM until a minimum duration is reached, at which point
//! the whole buffer is handed to the transcription collaborator. The
//! transcript history records every `{question, transcript}` pair in arrival
//! order for the final summary.
//!
//! The buffer is exclusively owned by one session worker; no internal
//! locking is needed.

use serde::Serialize;

/// Upper bound on buffered audio. If transcription keeps failing, the oldest
/// audio is discarded rather than growing without limit.
const MAX_BUFFERED_SECS: f64 = 60.0;

/// Accumulates raw s16le PCM across chunks until enough audio exists for a
/// meaningful transcription request.
pub struct UtteranceBuffer {
    pcm: Vec<u8>,
    sample_rate: u32,
    min_secs: f64,
    max_bytes: usize,
}

impl UtteranceBuffer {
    pub fn new(sample_rate: u32, min_secs: f64) -> Self {
        let bytes_per_sec = sample_rate as usize * 2; // 16-bit mono
        Self {
            pcm: Vec::new(),
            sample_rate,
            min_secs,
            max_bytes: (MAX_BUFFERED_SECS * bytes_per_sec as f64) as usize,
        }
    }

    /// Append one decoded chunk, discarding the oldest audio beyond the cap.
    pub fn append(&mut self, pcm: &[u8]) {
        self.pcm.extend_from_slice(pcm);

        if self.pcm.len() > self.max_bytes {
            let excess = self.pcm.len() - self.max_bytes;
            self.pcm.drain(..excess);
        }
    }

    /// Duration of buffered audio in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.pcm.len() as f64 / (self.sample_rate as f64 * 2.0)
    }

    /// Whether the minimum-duration threshold has been reached.
    pub fn is_ready(&self) -> bool {
        self.duration_seconds() >= self.min_secs
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// The buffered audio, left in place so a failed transcription can retry
    /// on a later chunk.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pcm
    }

    pub fn clear(&mut self) {
        self.pcm.clear();
    }
}

/// One answered (or partially answered) question in arrival order.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub question: String,
    pub transcript: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_tracks_duration() {
        // 16kHz 16-bit mono: 32,000 bytes per second, 2s minimum
        let mut buffer = UtteranceBuffer::new(16000, 2.0);
        assert!(!buffer.is_ready());

        buffer.append(&vec![0u8; 32_000]);
        assert!((buffer.duration_seconds() - 1.0).abs() < 1e-9);
        assert!(!buffer.is_ready());

        buffer.append(&vec![0u8; 32_000]);
        assert!(buffer.is_ready());
    }

    #[test]
    fn test_clear_resets_the_buffer() {
        let mut buffer = UtteranceBuffer::new(16000, 2.0);
        buffer.append(&vec![0u8; 64_000]);
        assert!(buffer.is_ready());

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.is_ready());
    }

    #[test]
    fn test_buffer_is_capped_keeping_newest_audio() {
        let mut buffer = UtteranceBuffer::new(16000, 2.0);
        let cap = (MAX_BUFFERED_SECS * 32_000.0) as usize;

        buffer.append(&vec![1u8; cap]);
        buffer.append(&vec![2u8; 32_000]);

        assert_eq!(buffer.as_bytes().len(), cap);
        // The newest audio survives at the tail
        assert_eq!(*buffer.as_bytes().last().unwrap(), 2u8);
        assert_eq!(buffer.as_bytes()[0], 1u8);
    }
}
