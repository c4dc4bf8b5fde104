//! Data models for uploaded traces and analysis jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::trace::TraceFormat;

/// An uploaded capture file registered in the trace library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFile {
    /// Unique identifier
    pub file_id: Uuid,
    /// Original filename as uploaded
    pub filename: String,
    /// Where the payload is stored on disk
    pub path: PathBuf,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Content digest of the payload
    pub sha256: String,
    /// Capture file format
    pub format: TraceFormat,
    /// Packet count from the upload-time parse
    pub total_packets: u64,
    /// Capture duration, when timestamps were present
    pub duration_secs: Option<f64>,
    /// When the trace was uploaded
    pub created_at: DateTime<Utc>,
}

impl TraceFile {
    /// Register a new trace file
    pub fn new(
        filename: impl Into<String>,
        path: PathBuf,
        size_bytes: u64,
        sha256: impl Into<String>,
        format: TraceFormat,
    ) -> Self {
        Self {
            file_id: Uuid::new_v4(),
            filename: filename.into(),
            path,
            size_bytes,
            sha256: sha256.into(),
            format,
            total_packets: 0,
            duration_secs: None,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of a background analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisJobStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl AnalysisJobStatus {
    /// String representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisJobStatus::Pending => "pending",
            AnalysisJobStatus::Analyzing => "analyzing",
            AnalysisJobStatus::Completed => "completed",
            AnalysisJobStatus::Failed => "failed",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "analyzing" => AnalysisJobStatus::Analyzing,
            "completed" => AnalysisJobStatus::Completed,
            "failed" => AnalysisJobStatus::Failed,
            _ => AnalysisJobStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisJobStatus::Completed | AnalysisJobStatus::Failed
        )
    }
}

impl std::fmt::Display for AnalysisJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A background analysis run over one trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    /// Unique identifier
    pub job_id: Uuid,
    /// Trace being analyzed
    pub file_id: Uuid,
    /// Current job status
    pub status: AnalysisJobStatus,
    /// Failure detail, present only when status == failed
    pub error: Option<String>,
    /// When the job was requested
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// Create a new pending job for a trace
    pub fn new(file_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            file_id,
            status: AnalysisJobStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
