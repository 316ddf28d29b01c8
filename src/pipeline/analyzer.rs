//! # Signal Analysis
//!
//! Per-chunk loudness and pitch estimation over the fixed-format PCM stream,
//! plus speech-presence and pause classification.
//!
//! ## Classification:
//! - **Speaking**: normalized RMS volume above the speech threshold. Chunks
//!   below it short-circuit the rest of the pipeline (no transcription call
//!   is spent on silence).
//! - **Paused**: volume below the lower pause threshold while the previous
//!   3 rolling volume samples were also below it.
//!
//! Rolling histories are bounded; nothing here is persisted beyond them.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Cursor;

/// Ephemeral per-chunk analysis result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    /// RMS volume normalized to the full-scale range (0.0 to 1.0)
    pub volume: f32,
    /// Estimated fundamental frequency in Hz (0.0 when not speaking or
    /// undetectable)
    pub pitch: f32,
    pub is_speaking: bool,
    pub is_paused: bool,
}

impl AnalysisSnapshot {
    fn silent() -> Self {
        Self {
            volume: 0.0,
            pitch: 0.0,
            is_speaking: false,
            is_paused: false,
        }
    }
}

/// Number of rolling samples kept for pause detection and trend inspection.
const HISTORY_LIMIT: usize = 32;

/// How many trailing volume samples must sit below the pause threshold
/// (in addition to the current chunk) before a pause is reported.
const PAUSE_LOOKBACK: usize = 3;

/// Cap on the number of samples fed to the pitch estimator per chunk.
const PITCH_WINDOW: usize = 2048;

/// Stateful analyzer for one session's audio stream.
pub struct SignalAnalyzer {
    speech_threshold: f32,
    pause_threshold: f32,
    sample_rate: u32,
    volume_history: VecDeque<f32>,
    pitch_history: VecDeque<f32>,
}

impl SignalAnalyzer {
    pub fn new(speech_threshold: f32, pause_threshold: f32, sample_rate: u32) -> Self {
        Self {
            speech_threshold,
            pause_threshold,
            sample_rate,
            volume_history: VecDeque::with_capacity(HISTORY_LIMIT),
            pitch_history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Analyze one chunk of raw s16le PCM.
    pub fn analyze(&mut self, pcm: &[u8]) -> AnalysisSnapshot {
        let samples = parse_samples(pcm);
        if samples.is_empty() {
            return AnalysisSnapshot::silent();
        }

        let volume = rms_volume(&samples);
        let is_speaking = volume > self.speech_threshold;

        // Pause detection looks at the trailing history BEFORE this chunk
        let is_paused = volume < self.pause_threshold
            && self.volume_history.len() >= PAUSE_LOOKBACK
            && self
                .volume_history
                .iter()
                .rev()
                .take(PAUSE_LOOKBACK)
                .all(|&v| v < self.pause_threshold);

        let pitch = if is_speaking {
            amdf_pitch(&samples[..samples.len().min(PITCH_WINDOW)], self.sample_rate)
        } else {
            0.0
        };

        self.push_history(volume, pitch);

        AnalysisSnapshot {
            volume,
            pitch,
            is_speaking,
            is_paused,
        }
    }

    fn push_history(&mut self, volume: f32, pitch: f32) {
        self.volume_history.push_back(volume);
        if self.volume_history.len() > HISTORY_LIMIT {
            self.volume_history.pop_front();
        }

        self.pitch_history.push_back(pitch);
        if self.pitch_history.len() > HISTORY_LIMIT {
            self.pitch_history.pop_front();
        }
    }

    /// Clear rolling histories (called on session reset).
    pub fn reset(&mut self) {
        self.volume_history.clear();
        self.pitch_history.clear();
    }
}

fn parse_samples(pcm: &[u8]) -> Vec<i16> {
    let mut cursor = Cursor::new(pcm);
    let mut samples = Vec::with_capacity(pcm.len() / 2);

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }

    samples
}

/// RMS of the samples normalized to the 16-bit full-scale range.
fn rms_volume(samples: &[i16]) -> f32 {
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_squares / samples.len() as f64).sqrt();
    (rms / 32768.0) as f32
}

/// Average magnitude difference pitch estimate.
///
/// Searches lag values covering roughly the human voice range (60-400 Hz)
/// and picks the lag with the smallest average magnitude difference. Returns
/// 0.0 when the window is too short or no lag stands out against the signal
/// level.
fn amdf_pitch(samples: &[i16], sample_rate: u32) -> f32 {
    const MIN_FREQ: f32 = 60.0;
    const MAX_FREQ: f32 = 400.0;

    let min_lag = (sample_rate as f32 / MAX_FREQ) as usize;
    let max_lag = (sample_rate as f32 / MIN_FREQ) as usize;

    if samples.len() < max_lag * 2 || min_lag == 0 {
        return 0.0;
    }

    let span = samples.len() - max_lag;
    let mut best_lag = 0usize;
    let mut best_diff = f64::MAX;

    for lag in min_lag..=max_lag {
        let mut diff = 0.0f64;
        for i in 0..span {
            diff += ((samples[i] as f64) - (samples[i + lag] as f64)).abs();
        }
        diff /= span as f64;

        if diff < best_diff {
            best_diff = diff;
            best_lag = lag;
        }
    }

    if best_lag == 0 {
        return 0.0;
    }

    // Reject flat minima: the best lag must clearly beat the mean level
    let mean_level: f64 = samples
        .iter()
        .take(span)
        .map(|&s| (s as f64).abs())
        .sum::<f64>()
        / span as f64;
    if mean_level > 0.0 && best_diff > mean_level {
        return 0.0;
    }

    sample_rate as f32 / best_lag as f32
}
