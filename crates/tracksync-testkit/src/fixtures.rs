//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tracksync_core::{
    AggregateSourceElements, EnvironmentId, FileProperty, MemberKey, ObsoleteName,
};
use tracksync_store::{MemoryStore, RevisionStore};
use tracksync_sync::{
    ChangeOrigin, CommitOptions, CompositeAttribution, MemoryRemote, MemoryWorkspace,
    PackageContext, StatusEntry, StatusScope, StatusService, SyncError, TrackedStatus,
    WorkspaceStore,
};

/// An in-memory remote, revision store and workspace for one environment,
/// with a private scratch root for retrieval target directories.
pub struct PullFixture<W: WorkspaceStore + 'static = MemoryWorkspace> {
    pub env: EnvironmentId,
    pub store: Arc<MemoryStore>,
    pub remote: Arc<MemoryRemote>,
    pub workspace: Arc<W>,
    scratch: TempDir,
}

impl PullFixture<MemoryWorkspace> {
    /// Create a fixture with an empty in-memory workspace.
    pub fn new() -> Self {
        Self::with_workspace(MemoryWorkspace::new())
    }
}

impl Default for PullFixture<MemoryWorkspace> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: WorkspaceStore + 'static> PullFixture<W> {
    /// Create a fixture around a given workspace.
    pub fn with_workspace(workspace: W) -> Self {
        Self {
            env: EnvironmentId::new("test-org").expect("valid environment id"),
            store: Arc::new(MemoryStore::new()),
            remote: Arc::new(MemoryRemote::new()),
            workspace: Arc::new(workspace),
            scratch: TempDir::new().expect("create scratch root"),
        }
    }

    /// Status computed from the fixture's own store, remote and workspace.
    pub fn status(&self) -> Arc<dyn StatusService> {
        Arc::new(TrackedStatus::new(
            self.store.clone(),
            self.remote.clone(),
            self.workspace.clone(),
            self.env.clone(),
        ))
    }

    /// Directory that should hold every per-package scratch directory.
    pub fn scratch_root(&self) -> &Path {
        self.scratch.path()
    }

    /// Entries currently left under the scratch root.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// The checkpointed revision of a member, if any.
    pub async fn checkpoint(&self, key: &MemberKey) -> Option<u64> {
        self.store
            .get_member(&self.env, key)
            .await
            .ok()
            .flatten()
            .and_then(|m| m.local_revision)
    }
}

/// A status service that answers from a fixed list.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStatus {
    entries: Vec<StatusEntry>,
    unsupported: bool,
}

impl ScriptedStatus {
    pub fn new(entries: Vec<StatusEntry>) -> Self {
        Self {
            entries,
            unsupported: false,
        }
    }

    /// A status service for an environment without revision tracking.
    pub fn unsupported() -> Self {
        Self {
            entries: Vec::new(),
            unsupported: true,
        }
    }
}

#[async_trait]
impl StatusService for ScriptedStatus {
    async fn compute_status(
        &self,
        scope: StatusScope,
    ) -> tracksync_sync::Result<Vec<StatusEntry>> {
        if self.unsupported {
            return Err(SyncError::UnsupportedEnvironment(
                "status is not available for this environment".into(),
            ));
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| match e.origin {
                ChangeOrigin::Local => scope.local,
                ChangeOrigin::Remote => scope.remote,
            })
            .cloned()
            .collect())
    }
}

/// A workspace whose commits fail for chosen packages.
pub struct FailingWorkspace {
    inner: MemoryWorkspace,
    packages: HashSet<String>,
}

impl FailingWorkspace {
    pub fn new<I, P>(inner: MemoryWorkspace, packages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            inner,
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn inner(&self) -> &MemoryWorkspace {
        &self.inner
    }
}

#[async_trait]
impl WorkspaceStore for FailingWorkspace {
    async fn process_entry(
        &self,
        aggregate: &mut AggregateSourceElements,
        ctx: &PackageContext,
        entry: &FileProperty,
        attribution: &CompositeAttribution,
    ) -> tracksync_sync::Result<()> {
        self.inner
            .process_entry(aggregate, ctx, entry, attribution)
            .await
    }

    async fn remove_obsolete(
        &self,
        aggregate: &mut AggregateSourceElements,
        ctx: &PackageContext,
        name: &ObsoleteName,
    ) -> tracksync_sync::Result<()> {
        self.inner.remove_obsolete(aggregate, ctx, name).await
    }

    async fn commit(
        &self,
        aggregate: AggregateSourceElements,
        options: &CommitOptions,
    ) -> tracksync_sync::Result<AggregateSourceElements> {
        if let Some(element) = aggregate
            .iter()
            .find(|e| self.packages.contains(&e.package))
        {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected commit failure for {}", element.member),
            )));
        }
        self.inner.commit(aggregate, options).await
    }

    async fn modified_members(&self) -> tracksync_sync::Result<Vec<MemberKey>> {
        self.inner.modified_members().await
    }

    async fn untracked_paths(&self) -> tracksync_sync::Result<Vec<PathBuf>> {
        self.inner.untracked_paths().await
    }
}
