//! Three-way conflict detection between local edits, remote edits and the
//! checkpoint.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracksync_core::{strip_package_root, ConflictEntry, EnvironmentId, MemberKey, TypeRegistry};
use tracksync_store::{RevisionStore, StoreExt};

use crate::error::Result;
use crate::gateway::RemoteRepository;
use crate::workspace::WorkspaceStore;

/// Which sides a status query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusScope {
    pub local: bool,
    pub remote: bool,
}

impl StatusScope {
    pub fn both() -> Self {
        Self {
            local: true,
            remote: true,
        }
    }
}

/// Side a change was made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// One member changed since the checkpoint, on one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub member: MemberKey,
    pub origin: ChangeOrigin,
    /// Remote revision, when the origin is remote and it is known.
    pub revision: Option<u64>,
    pub deleted: bool,
}

impl StatusEntry {
    pub fn local(member: MemberKey) -> Self {
        Self {
            member,
            origin: ChangeOrigin::Local,
            revision: None,
            deleted: false,
        }
    }

    pub fn remote(member: MemberKey, revision: u64) -> Self {
        Self {
            member,
            origin: ChangeOrigin::Remote,
            revision: Some(revision),
            deleted: false,
        }
    }

    pub fn remote_deleted(member: MemberKey) -> Self {
        Self {
            member,
            origin: ChangeOrigin::Remote,
            revision: None,
            deleted: true,
        }
    }
}

/// Computes which members changed locally and remotely.
#[async_trait]
pub trait StatusService: Send + Sync {
    /// Fails with [`crate::SyncError::UnsupportedEnvironment`] when status
    /// cannot be computed against the environment.
    async fn compute_status(&self, scope: StatusScope) -> Result<Vec<StatusEntry>>;
}

/// Detects members changed on both sides since the checkpoint.
pub struct ConflictChecker<'a, S: RevisionStore + ?Sized> {
    store: &'a S,
    status: &'a dyn StatusService,
    env: &'a EnvironmentId,
}

impl<'a, S: RevisionStore + ?Sized> ConflictChecker<'a, S> {
    pub fn new(store: &'a S, status: &'a dyn StatusService, env: &'a EnvironmentId) -> Self {
        Self { store, status, env }
    }

    /// Every member changed both locally and remotely, ordered by member.
    ///
    /// With `force_overwrite` nothing is queried and the result is empty.
    pub async fn check_conflicts(&self, force_overwrite: bool) -> Result<Vec<ConflictEntry>> {
        if force_overwrite {
            tracing::debug!(env = %self.env, "conflict check skipped (force overwrite)");
            return Ok(Vec::new());
        }

        let entries = self.status.compute_status(StatusScope::both()).await?;

        let mut local = BTreeSet::new();
        let mut remote: BTreeMap<MemberKey, StatusEntry> = BTreeMap::new();
        for entry in entries {
            match entry.origin {
                ChangeOrigin::Local => {
                    local.insert(entry.member);
                }
                ChangeOrigin::Remote => {
                    remote.insert(entry.member.clone(), entry);
                }
            }
        }

        let mut conflicts = Vec::new();
        for (member, entry) in remote.iter().filter(|(m, _)| local.contains(*m)) {
            let record = self.store.get_member(self.env, member).await?;
            let checkpoint = record.as_ref().and_then(|r| r.local_revision);
            let remote_revision = entry
                .revision
                .or_else(|| record.as_ref().map(|r| r.last_known_remote_revision))
                .unwrap_or(0);

            // A stale remote report at the checkpoint is not a remote change.
            if !entry.deleted && checkpoint == Some(remote_revision) {
                continue;
            }

            conflicts.push(ConflictEntry {
                member: member.clone(),
                local_revision: checkpoint.unwrap_or(0),
                remote_revision,
            });
        }

        if !conflicts.is_empty() {
            tracing::info!(env = %self.env, count = conflicts.len(), "conflicts detected");
        }
        Ok(conflicts)
    }
}

/// Status computed from the revision store, the remote and the workspace.
///
/// Remote changes are members whose remote revision moved past the
/// checkpoint (or that were deleted remotely). Local changes are members
/// whose files differ from what the workspace last wrote, plus members that
/// untracked local files resolve to through the type registry.
pub struct TrackedStatus<S: ?Sized, R: ?Sized, W: ?Sized> {
    store: Arc<S>,
    remote: Arc<R>,
    workspace: Arc<W>,
    env: EnvironmentId,
    registry: TypeRegistry,
}

impl<S, R, W> TrackedStatus<S, R, W>
where
    S: RevisionStore + ?Sized,
    R: RemoteRepository + ?Sized,
    W: WorkspaceStore + ?Sized,
{
    pub fn new(store: Arc<S>, remote: Arc<R>, workspace: Arc<W>, env: EnvironmentId) -> Self {
        Self {
            store,
            remote,
            workspace,
            env,
            registry: TypeRegistry::default(),
        }
    }

    /// Replace the registry used to resolve untracked local files.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Members changed locally: modified files first, then untracked files
    /// that resolve to a member.
    async fn local_changes(&self) -> Result<Vec<MemberKey>> {
        let mut changed = self.workspace.modified_members().await?;
        let mut seen: BTreeSet<MemberKey> = changed.iter().cloned().collect();

        for path in self.workspace.untracked_paths().await? {
            match self.registry.resolve(&strip_package_root(&path)) {
                Some(member) => {
                    if seen.insert(member.clone()) {
                        tracing::debug!(
                            member = %member,
                            file = %path.display(),
                            "untracked local file"
                        );
                        changed.push(member);
                    }
                }
                None => {
                    tracing::trace!(file = %path.display(), "untracked file of unknown type");
                }
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl<S, R, W> StatusService for TrackedStatus<S, R, W>
where
    S: RevisionStore + ?Sized,
    R: RemoteRepository + ?Sized,
    W: WorkspaceStore + ?Sized,
{
    async fn compute_status(&self, scope: StatusScope) -> Result<Vec<StatusEntry>> {
        let mut entries = Vec::new();

        if scope.remote {
            let revisions = self.remote.query_revisions().await?;
            let diff = self.store.diff(&self.env, &revisions).await?;
            entries.extend(
                diff.to_retrieve
                    .into_iter()
                    .map(|m| StatusEntry::remote(m.key, m.last_known_remote_revision)),
            );
            entries.extend(
                diff.obsolete
                    .iter()
                    .map(|name| StatusEntry::remote_deleted(name.key())),
            );
        }

        if scope.local {
            entries.extend(self.local_changes().await?.into_iter().map(StatusEntry::local));
        }

        Ok(entries)
    }
}
