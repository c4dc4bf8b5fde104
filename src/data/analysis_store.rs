//! Analysis job and snapshot data access object

use super::models::{AnalysisJob, AnalysisJobStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Data access object for analysis jobs and their result snapshots
#[derive(Clone)]
pub struct AnalysisStore {
    conn: Arc<Mutex<Connection>>,
}

impl AnalysisStore {
    /// Create a new AnalysisStore
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert or update a job record
    pub fn upsert_job(&self, job: &AnalysisJob) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO analysis_jobs (job_id, file_id, status, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job.job_id.to_string(),
                job.file_id.to_string(),
                job.status.as_str(),
                job.error,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a job by ID
    pub fn get_job(&self, job_id: Uuid) -> SqliteResult<Option<AnalysisJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT job_id, file_id, status, error, created_at, updated_at
             FROM analysis_jobs WHERE job_id = ?1",
        )?;

        let mut rows = stmt.query(params![job_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_job(row)?))
        } else {
            Ok(None)
        }
    }

    /// Store a completed analysis result for a trace
    pub fn save_snapshot(&self, file_id: Uuid, payload: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analysis_snapshots (file_id, payload, created_at)
             VALUES (?1, ?2, ?3)",
            params![file_id.to_string(), payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent snapshot payload for a trace, if any
    pub fn latest_snapshot(&self, file_id: Uuid) -> SqliteResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT payload FROM analysis_snapshots
             WHERE file_id = ?1 ORDER BY id DESC LIMIT 1",
        )?;

        let mut rows = stmt.query(params![file_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Drop all jobs and snapshots for a trace, used when the trace is deleted
    pub fn delete_for_file(&self, file_id: Uuid) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM analysis_jobs WHERE file_id = ?1",
            params![file_id.to_string()],
        )?;
        conn.execute(
            "DELETE FROM analysis_snapshots WHERE file_id = ?1",
            params![file_id.to_string()],
        )?;
        Ok(())
    }

    /// Convert a database row to an AnalysisJob
    fn row_to_job(row: &rusqlite::Row) -> SqliteResult<AnalysisJob> {
        let id_str: String = row.get(0)?;
        let file_str: String = row.get(1)?;
        let status_str: String = row.get(2)?;
        let created_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;

        Ok(AnalysisJob {
            job_id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
            file_id: Uuid::parse_str(&file_str).unwrap_or_else(|_| Uuid::new_v4()),
            status: AnalysisJobStatus::parse(&status_str),
            error: row.get(3)?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
