//! Schema versions for the SQLite revision store.
//!
//! Migrations are listed in order and applied in one transaction; the
//! `schema_migrations` table records which versions a database has seen.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "tracked members and environment counters",
    sql: r#"
        -- Checkpoint (local_revision, NULL until first retrieved) and last
        -- observed remote revision per member and environment.
        CREATE TABLE tracked_members (
            env_id TEXT NOT NULL,
            member_type TEXT NOT NULL,
            full_name TEXT NOT NULL,
            local_revision INTEGER,
            last_known_remote_revision INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (env_id, member_type, full_name)
        );

        CREATE TABLE environments (
            env_id TEXT PRIMARY KEY,
            server_max_revision INTEGER NOT NULL DEFAULT 0,
            rebuilt_at INTEGER
        );

        CREATE INDEX idx_tracked_members_env ON tracked_members(env_id);
    "#,
}];

/// Highest schema version this build understands.
pub const CURRENT_VERSION: u32 = 1;

/// Bring `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at schema {} but this build stops at {}",
            applied, CURRENT_VERSION
        )));
    }

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tracing::debug!(version = migration.version, name = migration.name, "applying migration");
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, now_millis()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
