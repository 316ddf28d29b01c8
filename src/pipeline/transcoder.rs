//! # Audio Transcoding
//!
//! Converts whatever compressed audio the browser recorded (typically
//! WebM/Opus) into the pipeline's fixed PCM format: 16kHz, mono, 16-bit
//! little-endian. The work is delegated to an ffmpeg subprocess through
//! temporary files that are removed on every code path.
//!
//! The transcoder is a trait so the rest of the pipeline can be exercised in
//! tests without an ffmpeg binary on the machine.

use crate::config::AudioConfig;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Contract for the audio transcoding step.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Decode one compressed audio chunk into raw s16le PCM at the pipeline
    /// sample rate. Any decoding failure is a `SessionError::Decode`: the
    /// chunk is droppable, the session is not.
    async fn decode_to_pcm(&self, encoded: &[u8]) -> SessionResult<Vec<u8>>;
}

/// ffmpeg subprocess implementation of [`Transcoder`].
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    sample_rate: u32,
    channels: u8,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(audio: &AudioConfig) -> Self {
        Self {
            ffmpeg_path: audio.ffmpeg_path.clone(),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            timeout: Duration::from_secs(audio.transcode_timeout_secs),
        }
    }

    fn temp_paths() -> (PathBuf, PathBuf) {
        let id = Uuid::new_v4();
        let dir = std::env::temp_dir();
        (
            dir.join(format!("chunk_{}.webm", id)),
            dir.join(format!("chunk_{}.pcm", id)),
        )
    }

    async fn run_ffmpeg(&self, input: &PathBuf, output: &PathBuf) -> SessionResult<Vec<u8>> {
        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.ffmpeg_path)
                .arg("-hide_banner")
                .arg("-loglevel")
                .arg("error")
                .arg("-y")
                .arg("-i")
                .arg(input)
                .arg("-f")
                .arg("s16le")
                .arg("-acodec")
                .arg("pcm_s16le")
                .arg("-ar")
                .arg(self.sample_rate.to_string())
                .arg("-ac")
                .arg(self.channels.to_string())
                .arg(output)
                .stdin(Stdio::null())
                .output(),
        )
        .await;

        let output_result = match result {
            Err(_) => return Err(SessionError::Decode("transcode timed out".to_string())),
            Ok(Err(e)) => {
                return Err(SessionError::Decode(format!("failed to run ffmpeg: {}", e)))
            }
            Ok(Ok(output_result)) => output_result,
        };

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(SessionError::Decode(format!(
                "ffmpeg exited with {}: {}",
                output_result.status,
                stderr.trim()
            )));
        }

        let pcm = tokio::fs::read(output)
            .await
            .map_err(|e| SessionError::Decode(format!("failed to read decoded audio: {}", e)))?;

        if pcm.is_empty() {
            return Err(SessionError::Decode("no audio decoded from chunk".to_string()));
        }

        Ok(pcm)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn decode_to_pcm(&self, encoded: &[u8]) -> SessionResult<Vec<u8>> {
        if encoded.is_empty() {
            return Err(SessionError::Decode("empty audio chunk".to_string()));
        }

        let (input, output) = Self::temp_paths();

        // A temp file we cannot create is a local resource failure, not a bad
        // chunk: Internal, which closes the session.
        tokio::fs::write(&input, encoded).await.map_err(|e| {
            SessionError::Internal(format!("cannot allocate temp file for transcode: {}", e))
        })?;

        let result = self.run_ffmpeg(&input, &output).await;

        // Temp files are removed on every path, success or failure
        let _ = tokio::fs::remove_file(&input).await;
        let _ = tokio::fs::remove_file(&output).await;

        if let Ok(pcm) = &result {
            debug!(
                encoded_bytes = encoded.len(),
                pcm_bytes = pcm.len(),
                "transcoded audio chunk"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder() -> FfmpegTranscoder {
        FfmpegTranscoder::new(&crate::config::AppConfig::default().audio)
    }

    #[tokio::test]
    async fn test_empty_chunk_is_a_decode_error() {
        let result = transcoder().decode_to_pcm(&[]).await;
        assert!(matches!(result, Err(SessionError::Decode(_))));
    }

    #[tokio::test]
    async fn test_garbage_chunk_is_a_decode_error_and_cleans_up() {
        let before = count_chunk_temp_files();
        let result = transcoder().decode_to_pcm(b"definitely not webm audio").await;
        assert!(matches!(result, Err(SessionError::Decode(_))));
        assert_eq!(count_chunk_temp_files(), before);
    }

    fn count_chunk_temp_files() -> usize {
        std::fs::read_dir(std::env::temp_dir())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| {
                        entry
                            .file_name()
                            .to_string_lossy()
                            .starts_with("chunk_")
                    })
                    .count()
            })
            .unwrap_or(0)
    }
}
