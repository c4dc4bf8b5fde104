//! Trace file data access object

use super::models::TraceFile;
use crate::trace::TraceFormat;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Data access object for uploaded trace files
#[derive(Clone)]
pub struct TraceStore {
    conn: Arc<Mutex<Connection>>,
}

impl TraceStore {
    /// Create a new TraceStore
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert a new trace record
    pub fn create(&self, trace: &TraceFile) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO traces (file_id, filename, path, size_bytes, sha256, format, total_packets, duration_secs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trace.file_id.to_string(),
                trace.filename,
                trace.path.to_string_lossy().to_string(),
                trace.size_bytes as i64,
                trace.sha256,
                trace.format.as_str(),
                trace.total_packets as i64,
                trace.duration_secs,
                trace.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a trace by ID
    pub fn get_by_id(&self, file_id: Uuid) -> SqliteResult<Option<TraceFile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT file_id, filename, path, size_bytes, sha256, format, total_packets, duration_secs, created_at
             FROM traces WHERE file_id = ?1",
        )?;

        let mut rows = stmt.query(params![file_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_trace(row)?))
        } else {
            Ok(None)
        }
    }

    /// Get all traces, newest first
    pub fn get_all(&self) -> SqliteResult<Vec<TraceFile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT file_id, filename, path, size_bytes, sha256, format, total_packets, duration_secs, created_at
             FROM traces ORDER BY created_at DESC",
        )?;

        let traces = stmt
            .query_map([], Self::row_to_trace)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(traces)
    }

    /// Resolve the on-disk payload location for a trace
    pub fn resolve_path(&self, file_id: Uuid) -> SqliteResult<Option<PathBuf>> {
        Ok(self.get_by_id(file_id)?.map(|trace| trace.path))
    }

    /// Delete a trace record
    pub fn delete(&self, file_id: Uuid) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM traces WHERE file_id = ?1",
            params![file_id.to_string()],
        )?;
        Ok(())
    }

    /// Convert a database row to a TraceFile
    fn row_to_trace(row: &rusqlite::Row) -> SqliteResult<TraceFile> {
        let id_str: String = row.get(0)?;
        let path_str: String = row.get(2)?;
        let size: i64 = row.get(3)?;
        let format_str: String = row.get(5)?;
        let total: i64 = row.get(6)?;
        let created_at_str: String = row.get(8)?;

        Ok(TraceFile {
            file_id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
            filename: row.get(1)?,
            path: PathBuf::from(path_str),
            size_bytes: size.max(0) as u64,
            sha256: row.get(4)?,
            format: TraceFormat::parse(&format_str),
            total_packets: total.max(0) as u64,
            duration_secs: row.get(7)?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
