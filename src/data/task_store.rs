//! Replay task record store.
//!
//! Each task is persisted as a full JSON record keyed by task id and
//! rewritten on every update, so the newest write always wins. A live
//! in-memory map fronts the database: when SQLite is unavailable the
//! engine keeps running on memory alone, and records written by an
//! earlier process remain readable through the database fallback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parking_lot::Mutex as StateMutex;
use rusqlite::{params, Connection, Result as SqliteResult};
use tracing::warn;
use uuid::Uuid;

use crate::replay::ReplayTask;

/// Store for replay task records
#[derive(Clone)]
pub struct ReplayTaskStore {
    conn: Option<Arc<Mutex<Connection>>>,
    memory: Arc<StateMutex<HashMap<Uuid, ReplayTask>>>,
}

impl ReplayTaskStore {
    /// Create a store backed by the given connection, or memory-only when
    /// no database could be opened
    pub fn new(conn: Option<Arc<Mutex<Connection>>>) -> Self {
        Self {
            conn,
            memory: Arc::new(StateMutex::new(HashMap::new())),
        }
    }

    /// Memory-only store, used when the database is unavailable and in tests
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Whether records survive a process restart
    pub fn is_persistent(&self) -> bool {
        self.conn.is_some()
    }

    /// Write the full record. Database errors are logged and swallowed;
    /// the in-memory copy is always updated first.
    pub fn save(&self, task: &ReplayTask) {
        self.memory.lock().insert(task.task_id, task.clone());
        self.persist(task);
    }

    /// Apply a mutation to one task atomically and persist the result.
    /// The closure runs under the memory lock, so concurrent updates to
    /// the same task never lose each other's writes. Returns the updated
    /// record, or `None` when the task does not exist.
    pub fn update<F>(&self, task_id: Uuid, mutate: F) -> Option<ReplayTask>
    where
        F: FnOnce(&mut ReplayTask),
    {
        // Pull a record written by a previous process into memory first,
        // so the closure sees the newest known state
        if !self.memory.lock().contains_key(&task_id) {
            if let Some(task) = self.get(task_id) {
                self.memory.lock().entry(task_id).or_insert(task);
            }
        }

        let updated = {
            let mut memory = self.memory.lock();
            let task = memory.get_mut(&task_id)?;
            mutate(task);
            task.clone()
        };

        self.persist(&updated);
        Some(updated)
    }

    fn persist(&self, task: &ReplayTask) {
        let Some(conn) = &self.conn else {
            return;
        };
        let record = match serde_json::to_string(task) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to serialize replay task {}: {}", task.task_id, e);
                return;
            }
        };

        let conn = conn.lock().unwrap();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO replay_tasks (task_id, record, updated_at)
             VALUES (?1, ?2, ?3)",
            params![
                task.task_id.to_string(),
                record,
                task.updated_at.to_rfc3339()
            ],
        ) {
            warn!("Failed to persist replay task {}: {}", task.task_id, e);
        }
    }

    /// Fetch one task. Live tasks come from memory; records from a previous
    /// process are read through the database.
    pub fn get(&self, task_id: Uuid) -> Option<ReplayTask> {
        if let Some(task) = self.memory.lock().get(&task_id) {
            return Some(task.clone());
        }

        let conn = self.conn.as_ref()?;
        let record = match Self::db_get(conn, task_id) {
            Ok(record) => record?,
            Err(e) => {
                warn!("Failed to read replay task {}: {}", task_id, e);
                return None;
            }
        };

        match serde_json::from_str(&record) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!("Corrupt replay task record {}: {}", task_id, e);
                None
            }
        }
    }

    /// All known tasks, newest first. Memory wins over the database copy
    /// of the same task.
    pub fn list(&self) -> Vec<ReplayTask> {
        let mut by_id: HashMap<Uuid, ReplayTask> = HashMap::new();

        if let Some(conn) = &self.conn {
            match Self::db_list(conn) {
                Ok(records) => {
                    for record in records {
                        match serde_json::from_str::<ReplayTask>(&record) {
                            Ok(task) => {
                                by_id.insert(task.task_id, task);
                            }
                            Err(e) => warn!("Skipping corrupt replay task record: {}", e),
                        }
                    }
                }
                Err(e) => warn!("Failed to list replay tasks: {}", e),
            }
        }

        for (id, task) in self.memory.lock().iter() {
            by_id.insert(*id, task.clone());
        }

        let mut tasks: Vec<ReplayTask> = by_id.into_values().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Remove a task record from memory and the database. Returns whether
    /// anything was removed.
    pub fn delete(&self, task_id: Uuid) -> bool {
        let from_memory = self.memory.lock().remove(&task_id).is_some();

        let mut from_db = false;
        if let Some(conn) = &self.conn {
            let result = {
                let conn = conn.lock().unwrap();
                conn.execute(
                    "DELETE FROM replay_tasks WHERE task_id = ?1",
                    params![task_id.to_string()],
                )
            };
            match result {
                Ok(n) => from_db = n > 0,
                Err(e) => warn!("Failed to delete replay task {}: {}", task_id, e),
            }
        }

        from_memory || from_db
    }

    fn db_get(conn: &Arc<Mutex<Connection>>, task_id: Uuid) -> SqliteResult<Option<String>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT record FROM replay_tasks WHERE task_id = ?1")?;
        let mut rows = stmt.query(params![task_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    fn db_list(conn: &Arc<Mutex<Connection>>) -> SqliteResult<Vec<String>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT record FROM replay_tasks")?;
        let records = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }
}
