//! Database migrations using a proper versioned migration pattern.
//!
//! Each migration runs exactly once and is tracked in the `schema_migrations` table.
//! Migrations are applied in order by version number.

use rusqlite::{params, Connection};

/// A database migration with a version number, name, and SQL to execute.
pub struct Migration {
    /// Unique version number (migrations run in order)
    pub version: i64,
    /// Human-readable name for the migration
    pub name: &'static str,
    /// SQL to execute (can be multiple statements)
    pub sql: &'static str,
}

/// All migrations in order. New migrations should be added at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_traces_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS traces (
                file_id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                sha256 TEXT NOT NULL,
                format TEXT NOT NULL,
                total_packets INTEGER NOT NULL DEFAULT 0,
                duration_secs REAL,
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_replay_tasks_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS replay_tasks (
                task_id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_analysis_jobs_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS analysis_jobs (
                job_id TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_jobs_file ON analysis_jobs(file_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_analysis_snapshots_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS analysis_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analysis_snapshots_file ON analysis_snapshots(file_id);
        "#,
    },
];

/// Create the schema_migrations table if it doesn't exist.
fn ensure_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the set of already-applied migration versions.
fn get_applied_versions(conn: &Connection) -> rusqlite::Result<std::collections::HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<std::collections::HashSet<i64>>>()?;
    Ok(versions)
}

/// Run all pending migrations.
///
/// This is the main entry point for the migration system.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    // Ensure the migrations table exists
    ensure_migrations_table(conn)?;

    // Get already-applied migrations
    let applied = get_applied_versions(conn)?;

    // Apply pending migrations in order
    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        // Execute the migration SQL and record it within a single transaction for atomicity
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        if let Err(e) = tx.execute_batch(migration.sql) {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }
        if let Err(e) = tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now],
        ) {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }
        if let Err(e) = tx.commit() {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Migration applied successfully"
        );
    }

    Ok(())
}
