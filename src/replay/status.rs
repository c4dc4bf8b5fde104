//! Status protocol: the file-based contract between the in-sandbox runner
//! and the host supervisor.
//!
//! The runner publishes progress by atomically rewriting a JSON status
//! file; the host reads it each poll tick. A malformed or missing file is
//! a transient condition, never a task failure. Cancellation flows the
//! other way as a zero-byte stop file.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::task::{ReplayTask, TaskState};

/// One status message as written by the in-sandbox runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub sent_packets: u64,
    #[serde(default)]
    pub total_packets: u64,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: f64,
}

impl StatusReport {
    /// Parse a raw status file read. None covers every malformed case;
    /// the caller retries on the next tick.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw.trim()).ok()
    }

    /// Merge this report into a task record.
    ///
    /// Counters always reflect the latest measurement. The reported status
    /// is translated only when it is a recognized value and the transition
    /// is legal, so a stale `running` report can never resurrect a task
    /// that is already stopping or terminal. The first successful merge
    /// stamps `started_at`.
    pub fn apply_to(&self, task: &mut ReplayTask) {
        if task.is_terminal() {
            return;
        }

        task.sent_packets = self.sent_packets;
        if self.total_packets > 0 {
            task.total_packets = self.total_packets;
        }
        if task.total_packets > 0 && task.sent_packets > task.total_packets {
            task.sent_packets = task.total_packets;
        }

        if task.started_at.is_none() {
            task.started_at = Some(Utc::now());
        }

        if let Some(next) = TaskState::from_report(&self.status) {
            if next == TaskState::Failed && task.status.can_advance_to(next) {
                task.error = self
                    .error
                    .clone()
                    .filter(|e| !e.is_empty())
                    .or_else(|| Some("replay failed inside the sandbox".to_string()));
            }
            task.advance(next);
        }

        if task.status == TaskState::Completed {
            if task.total_packets == 0 {
                task.total_packets = task.sent_packets;
            }
            task.sent_packets = task.total_packets;
            task.progress = 100;
        } else if task.total_packets > 0 {
            let pct = (task.sent_packets.saturating_mul(100) / task.total_packets) as u8;
            task.progress = pct.min(99);
        }

        task.touch();
    }
}
