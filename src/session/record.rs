//! # Question Records and Audio Artifacts
//!
//! One record per generated question, holding the question text and the
//! state of its synthesized audio artifact. The record type is the
//! index-alignment invariant: the records vector always has exactly one
//! entry per question, with failed synthesis marked rather than omitted, so
//! question text, artifact, and ordinal can never drift apart.
//!
//! Artifacts are temporary files under the configured artifact directory and
//! are deleted explicitly on session end or disconnect.

use crate::error::{SessionError, SessionResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of synthesizing one question's audio.
#[derive(Debug, Clone)]
pub enum ArtifactState {
    /// Audio was generated and stored on disk
    Ready {
        path: PathBuf,
        filename: String,
        voice_id: String,
        style: String,
    },
    /// Synthesis failed; the question is delivered text-only
    Failed { error: String },
}

/// One generated question and its audio artifact, index-aligned with the
/// question ordinal.
#[derive(Debug, Clone)]
pub struct QuestionRecord {
    pub index: usize,
    pub text: String,
    pub artifact: ArtifactState,
}

impl QuestionRecord {
    /// The stored filename, if synthesis succeeded.
    pub fn filename(&self) -> Option<&str> {
        match &self.artifact {
            ArtifactState::Ready { filename, .. } => Some(filename),
            ArtifactState::Failed { .. } => None,
        }
    }

    pub fn has_audio(&self) -> bool {
        matches!(self.artifact, ArtifactState::Ready { .. })
    }

    /// Read the artifact audio from disk.
    ///
    /// A failed artifact or an unreadable file both surface as
    /// `ArtifactMissing`; the orchestrator turns that into an `AUDIO_ERROR`
    /// notice without failing the session.
    pub async fn read_audio(&self) -> SessionResult<Vec<u8>> {
        match &self.artifact {
            ArtifactState::Failed { .. } => Err(SessionError::ArtifactMissing(self.index)),
            ArtifactState::Ready { path, .. } => tokio::fs::read(path).await.map_err(|e| {
                warn!(index = self.index, error = %e, "question audio unreadable");
                SessionError::ArtifactMissing(self.index)
            }),
        }
    }
}

/// Store one question's synthesized audio under the artifact directory.
///
/// A failure to create the directory or write the file is a local resource
/// problem, not a synthesis problem — it is reported as `Internal`.
pub async fn store_artifact(
    dir: &Path,
    index: usize,
    audio: &[u8],
    voice_id: &str,
    style: &str,
) -> SessionResult<ArtifactState> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        SessionError::Internal(format!(
            "cannot create artifact directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let filename = format!("question_{}_{}.wav", index + 1, Uuid::new_v4());
    let path = dir.join(&filename);

    tokio::fs::write(&path, audio).await.map_err(|e| {
        SessionError::Internal(format!("cannot write artifact {}: {}", path.display(), e))
    })?;

    debug!(index, bytes = audio.len(), path = %path.display(), "question audio stored");

    Ok(ArtifactState::Ready {
        path,
        filename,
        voice_id: voice_id.to_string(),
        style: style.to_string(),
    })
}

/// Delete every stored artifact file. Failures are logged, not propagated —
/// cleanup runs on teardown paths where there is nothing left to abort.
pub async fn cleanup_artifacts(records: &[QuestionRecord]) {
    for record in records {
        if let ArtifactState::Ready { path, .. } = &record.artifact {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "artifact removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
            }
        }
    }
}
