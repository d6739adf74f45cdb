//! SQLite implementation of the RevisionStore trait.
//!
//! This is the durable backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use tracksync_core::{EnvironmentId, MemberKey, TrackedMember};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::RevisionStore;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

// Helper to convert a row to TrackedMember
fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedMember> {
    let local_revision: Option<i64> = row.get("local_revision")?;
    let last_known: i64 = row.get("last_known_remote_revision")?;

    Ok(TrackedMember {
        key: MemberKey::new(
            row.get::<_, String>("member_type")?,
            row.get::<_, String>("full_name")?,
        ),
        local_revision: local_revision.map(|r| r as u64),
        last_known_remote_revision: last_known as u64,
    })
}

fn upsert_member(conn: &Connection, env: &str, member: &TrackedMember, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO tracked_members (
            env_id, member_type, full_name, local_revision,
            last_known_remote_revision, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(env_id, member_type, full_name) DO UPDATE SET
            local_revision = excluded.local_revision,
            last_known_remote_revision = excluded.last_known_remote_revision,
            updated_at = excluded.updated_at",
        params![
            env,
            &member.key.member_type,
            &member.key.full_name,
            member.local_revision.map(|r| r as i64),
            member.last_known_remote_revision as i64,
            now,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl RevisionStore for SqliteStore {
    async fn get_member(
        &self,
        env: &EnvironmentId,
        key: &MemberKey,
    ) -> Result<Option<TrackedMember>> {
        let env = env.clone();
        let key = key.clone();

        self.blocking(move |conn| {
            conn.query_row(
                "SELECT member_type, full_name, local_revision, last_known_remote_revision
                 FROM tracked_members
                 WHERE env_id = ?1 AND member_type = ?2 AND full_name = ?3",
                params![env.as_str(), &key.member_type, &key.full_name],
                row_to_member,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_members(&self, env: &EnvironmentId) -> Result<Vec<TrackedMember>> {
        let env = env.clone();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT member_type, full_name, local_revision, last_known_remote_revision
                 FROM tracked_members WHERE env_id = ?1
                 ORDER BY member_type, full_name",
            )?;

            let members = stmt
                .query_map(params![env.as_str()], row_to_member)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(members)
        })
        .await
    }

    async fn upsert_members(&self, env: &EnvironmentId, members: &[TrackedMember]) -> Result<()> {
        let env = env.clone();
        let members = members.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();
            for member in &members {
                upsert_member(&tx, env.as_str(), member, now)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove_members(&self, env: &EnvironmentId, keys: &[MemberKey]) -> Result<()> {
        let env = env.clone();
        let keys = keys.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            for key in &keys {
                tx.execute(
                    "DELETE FROM tracked_members
                     WHERE env_id = ?1 AND member_type = ?2 AND full_name = ?3",
                    params![env.as_str(), &key.member_type, &key.full_name],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn server_max_revision(&self, env: &EnvironmentId) -> Result<u64> {
        let env = env.clone();

        self.blocking(move |conn| {
            let max: Option<i64> = conn
                .query_row(
                    "SELECT server_max_revision FROM environments WHERE env_id = ?1",
                    params![env.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(max.unwrap_or(0) as u64)
        })
        .await
    }

    async fn replace_all(
        &self,
        env: &EnvironmentId,
        members: &[TrackedMember],
        server_max_revision: u64,
    ) -> Result<()> {
        let env = env.clone();
        let members = members.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = now_millis();

            tx.execute(
                "DELETE FROM tracked_members WHERE env_id = ?1",
                params![env.as_str()],
            )?;
            for member in &members {
                upsert_member(&tx, env.as_str(), member, now)?;
            }

            tx.execute(
                "INSERT INTO environments (env_id, server_max_revision, rebuilt_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(env_id) DO UPDATE SET
                    server_max_revision = excluded.server_max_revision,
                    rebuilt_at = excluded.rebuilt_at",
                params![env.as_str(), server_max_revision as i64, now],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }
}
