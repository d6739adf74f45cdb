//! Store trait: the abstract interface for revision checkpoint persistence.
//!
//! Records are keyed by environment identity so one database can hold the
//! checkpoints of several remote environments.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use tracksync_core::{EnvironmentId, MemberKey, ObsoleteName, RemoteRevision, TrackedMember};

use crate::error::Result;

/// Output of comparing the checkpoint against a fresh remote query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionDiff {
    /// Members to retrieve. `last_known_remote_revision` holds the queried
    /// revision; `local_revision` the checkpoint it replaces.
    pub to_retrieve: Vec<TrackedMember>,
    /// Checkpointed members that no longer exist remotely.
    pub obsolete: Vec<ObsoleteName>,
}

impl RevisionDiff {
    pub fn is_empty(&self) -> bool {
        self.to_retrieve.is_empty() && self.obsolete.is_empty()
    }
}

/// Summary of a checkpoint rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointRebuild {
    /// Members whose checkpoint now equals the queried remote revision.
    pub checkpointed: usize,
    /// Members kept at their previous checkpoint.
    pub retained: usize,
    /// Records dropped because the member is gone remotely.
    pub dropped: usize,
    pub server_max_revision: u64,
}

/// Async interface for revision persistence.
///
/// # Design Notes
///
/// - **Durable**: implementations other than [`crate::MemoryStore`] survive
///   process restarts.
/// - **Checkpoint discipline**: nothing in this trait decides when a
///   checkpoint may advance; callers only advance it for content they have
///   durably written.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Member Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the record for one member.
    async fn get_member(&self, env: &EnvironmentId, key: &MemberKey)
        -> Result<Option<TrackedMember>>;

    /// List every tracked member of an environment, ordered by key.
    async fn list_members(&self, env: &EnvironmentId) -> Result<Vec<TrackedMember>>;

    /// Insert or replace member records.
    async fn upsert_members(&self, env: &EnvironmentId, members: &[TrackedMember]) -> Result<()>;

    /// Delete member records. Unknown keys are ignored.
    async fn remove_members(&self, env: &EnvironmentId, keys: &[MemberKey]) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Environment Counters
    // ─────────────────────────────────────────────────────────────────────────

    /// Highest remote revision recorded by the last rebuild (0 if none).
    async fn server_max_revision(&self, env: &EnvironmentId) -> Result<u64>;

    /// Atomically replace every record of an environment.
    async fn replace_all(
        &self,
        env: &EnvironmentId,
        members: &[TrackedMember],
        server_max_revision: u64,
    ) -> Result<()>;
}

/// Revision bookkeeping built on the raw store operations.
pub trait StoreExt: RevisionStore {
    /// Compare the checkpoint against a remote query.
    ///
    /// A member is retrieved when it is new remotely or its remote revision
    /// is above its checkpoint. A checkpointed member is obsolete when the
    /// remote reports it deleted or omits it entirely.
    fn diff(
        &self,
        env: &EnvironmentId,
        remote: &[RemoteRevision],
    ) -> impl std::future::Future<Output = Result<RevisionDiff>> + Send;

    /// Record the remote revisions just seen without moving the checkpoint.
    fn observe_remote(
        &self,
        env: &EnvironmentId,
        remote: &[RemoteRevision],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Advance the checkpoint for members confirmed written, and drop
    /// records for members confirmed deleted locally.
    fn update_checkpoint(
        &self,
        env: &EnvironmentId,
        applied: &[(MemberKey, u64)],
        deleted: &[MemberKey],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Rebuild the checkpoint from an authoritative remote enumeration.
    ///
    /// Members in `retain` keep their previous checkpoint (their content was
    /// not written); everything else present remotely is checkpointed at its
    /// queried revision.
    fn set_checkpoint_from_full_query(
        &self,
        env: &EnvironmentId,
        remote: &[RemoteRevision],
        retain: &HashSet<MemberKey>,
    ) -> impl std::future::Future<Output = Result<CheckpointRebuild>> + Send;
}

impl<S: RevisionStore + ?Sized> StoreExt for S {
    async fn diff(&self, env: &EnvironmentId, remote: &[RemoteRevision]) -> Result<RevisionDiff> {
        let stored: BTreeMap<MemberKey, TrackedMember> = self
            .list_members(env)
            .await?
            .into_iter()
            .map(|m| (m.key.clone(), m))
            .collect();

        let mut to_retrieve = Vec::new();
        let mut obsolete = BTreeSet::new();
        let mut seen = HashSet::with_capacity(remote.len());

        for r in remote {
            seen.insert(&r.key);
            let record = stored.get(&r.key);

            if r.is_deleted {
                if record.is_some_and(TrackedMember::is_checkpointed) {
                    obsolete.insert(ObsoleteName::from(&r.key));
                }
                continue;
            }

            let checkpoint = record.and_then(|m| m.local_revision);
            if checkpoint.map_or(true, |c| r.revision > c) {
                to_retrieve.push(TrackedMember {
                    key: r.key.clone(),
                    local_revision: checkpoint,
                    last_known_remote_revision: r.revision,
                });
            }
        }

        for (key, record) in &stored {
            if record.is_checkpointed() && !seen.contains(key) {
                obsolete.insert(ObsoleteName::from(key));
            }
        }

        to_retrieve.sort_by(|a, b| a.key.cmp(&b.key));
        to_retrieve.dedup_by(|a, b| a.key == b.key);

        Ok(RevisionDiff {
            to_retrieve,
            obsolete: obsolete.into_iter().collect(),
        })
    }

    async fn observe_remote(&self, env: &EnvironmentId, remote: &[RemoteRevision]) -> Result<()> {
        let mut updates = Vec::new();
        for r in remote.iter().filter(|r| !r.is_deleted) {
            let record = match self.get_member(env, &r.key).await? {
                Some(mut m) if m.last_known_remote_revision != r.revision => {
                    m.last_known_remote_revision = r.revision;
                    m
                }
                Some(_) => continue,
                None => TrackedMember::observed(r.key.clone(), r.revision),
            };
            updates.push(record);
        }

        if !updates.is_empty() {
            tracing::debug!(
                env = %env,
                count = updates.len(),
                "recording observed remote revisions"
            );
            self.upsert_members(env, &updates).await?;
        }
        Ok(())
    }

    async fn update_checkpoint(
        &self,
        env: &EnvironmentId,
        applied: &[(MemberKey, u64)],
        deleted: &[MemberKey],
    ) -> Result<()> {
        let mut updates = Vec::with_capacity(applied.len());
        for (key, revision) in applied {
            let mut record = self
                .get_member(env, key)
                .await?
                .unwrap_or_else(|| TrackedMember::observed(key.clone(), *revision));
            record.local_revision = Some(*revision);
            record.last_known_remote_revision = record.last_known_remote_revision.max(*revision);
            updates.push(record);
        }

        if !updates.is_empty() {
            self.upsert_members(env, &updates).await?;
        }
        if !deleted.is_empty() {
            self.remove_members(env, deleted).await?;
        }
        Ok(())
    }

    async fn set_checkpoint_from_full_query(
        &self,
        env: &EnvironmentId,
        remote: &[RemoteRevision],
        retain: &HashSet<MemberKey>,
    ) -> Result<CheckpointRebuild> {
        let stored: BTreeMap<MemberKey, TrackedMember> = self
            .list_members(env)
            .await?
            .into_iter()
            .map(|m| (m.key.clone(), m))
            .collect();

        let mut rebuilt: BTreeMap<MemberKey, TrackedMember> = BTreeMap::new();
        let mut summary = CheckpointRebuild::default();

        for r in remote {
            summary.server_max_revision = summary.server_max_revision.max(r.revision);
            if retain.contains(&r.key) {
                continue;
            }
            if r.is_deleted {
                continue;
            }
            rebuilt.insert(r.key.clone(), TrackedMember::retrieved(r.key.clone(), r.revision));
            summary.checkpointed += 1;
        }

        let remote_revisions: BTreeMap<&MemberKey, &RemoteRevision> =
            remote.iter().map(|r| (&r.key, r)).collect();

        for key in retain {
            let Some(previous) = stored.get(key) else {
                continue;
            };
            let mut kept = previous.clone();
            if let Some(r) = remote_revisions.get(key) {
                kept.last_known_remote_revision = r.revision;
            }
            rebuilt.insert(key.clone(), kept);
            summary.retained += 1;
        }

        summary.dropped = stored.keys().filter(|k| !rebuilt.contains_key(*k)).count();

        let members: Vec<TrackedMember> = rebuilt.into_values().collect();
        self.replace_all(env, &members, summary.server_max_revision)
            .await?;

        tracing::debug!(
            env = %env,
            checkpointed = summary.checkpointed,
            retained = summary.retained,
            dropped = summary.dropped,
            "checkpoint rebuilt from full query"
        );
        Ok(summary)
    }
}
