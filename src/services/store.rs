//! # Session Persistence Collaborator
//!
//! Append-only storage for finished interview records. The store is a
//! collaborator boundary: the session only hands over a complete record once,
//! at interview completion, and a storage failure never takes the session
//! down (the summary has already been delivered to the candidate).

use crate::error::{SessionError, SessionResult};
use crate::pipeline::{SummaryItem, TranscriptEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Everything worth keeping from one finished interview.
#[derive(Debug, Clone, Serialize)]
pub struct InterviewRecord {
    pub role: String,
    pub questions: Vec<String>,
    pub transcript_history: Vec<TranscriptEntry>,
    pub summary: Vec<SummaryItem>,
    pub timestamp: DateTime<Utc>,
}

/// Contract for the persistence collaborator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: &InterviewRecord) -> SessionResult<()>;
}

/// Appends one JSON document per finished interview to a local file.
pub struct JsonlSessionStore {
    path: PathBuf,
}

impl JsonlSessionStore {
    pub fn new(path: &str) -> Self {
        Self { path: PathBuf::from(path) }
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn save(&self, record: &InterviewRecord) -> SessionResult<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| SessionError::Internal(format!("failed to serialize record: {}", e)))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                SessionError::Internal(format!(
                    "failed to open session store {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::Internal(format!("failed to append record: {}", e)))?;

        debug!(path = %self.path.display(), role = %record.role, "interview record persisted");
        Ok(())
    }
}
