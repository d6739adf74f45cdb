//! In-memory workspace for testing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracksync_core::{
    AggregateSourceElements, ContentHash, ElementState, FileProperty, MemberKey, ObsoleteName,
    WorkspaceElement, WorkspaceFile,
};

use super::{
    commit_staged, stage_entry, stage_removal, workspace_path, CommitOptions, FileBackend,
    WorkspaceIndex, WorkspaceStore,
};
use crate::applier::CompositeAttribution;
use crate::context::PackageContext;
use crate::error::Result;

#[derive(Default)]
struct Files {
    files: BTreeMap<PathBuf, Bytes>,
    writes: usize,
}

#[async_trait]
impl FileBackend for Files {
    async fn read(&self, path: &Path) -> Result<Option<Bytes>> {
        Ok(self.files.get(path).cloned())
    }

    async fn write(&mut self, path: &Path, content: Bytes) -> Result<()> {
        self.files.insert(path.to_path_buf(), content);
        self.writes += 1;
        Ok(())
    }

    async fn remove(&mut self, path: &Path) -> Result<()> {
        if self.files.remove(path).is_some() {
            self.writes += 1;
        }
        Ok(())
    }
}

#[derive(Default)]
struct State {
    files: Files,
    index: WorkspaceIndex,
}

/// Workspace held entirely in memory.
///
/// Counts file writes and removals so tests can assert that a pull touched
/// nothing.
#[derive(Default)]
pub struct MemoryWorkspace {
    state: Mutex<State>,
    commits: AtomicUsize,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file as if a previous pull had written it.
    pub async fn seed(&self, member: MemberKey, package: &str, path: &str, content: &str) {
        let mut state = self.state.lock().await;
        let relative = PathBuf::from(path);
        let bytes = Bytes::copy_from_slice(content.as_bytes());

        let mut element = state
            .index
            .get(&member)
            .map(|e| {
                let mut element = WorkspaceElement::new(
                    member.clone(),
                    e.package.clone(),
                    ElementState::Unchanged,
                );
                element.files = e
                    .files
                    .iter()
                    .map(|f| WorkspaceFile {
                        path: f.path.clone(),
                        hash: Some(f.hash),
                        source: None,
                        unsupported: false,
                    })
                    .collect();
                element
            })
            .unwrap_or_else(|| WorkspaceElement::new(member, package, ElementState::New));
        element.upsert_file(WorkspaceFile {
            path: relative.clone(),
            hash: Some(ContentHash::of(&bytes)),
            source: None,
            unsupported: false,
        });

        state.index.record(&element);
        state.files.files.insert(workspace_path(&element.package, &relative), bytes);
    }

    /// Change or create a file locally without updating the index.
    pub async fn edit(&self, package: &str, path: &str, content: &str) {
        let mut state = self.state.lock().await;
        state.files.files.insert(
            workspace_path(package, Path::new(path)),
            Bytes::copy_from_slice(content.as_bytes()),
        );
    }

    /// Content at a workspace-relative path (`<package>/<path>`).
    pub async fn read(&self, path: impl AsRef<Path>) -> Option<Bytes> {
        self.state.lock().await.files.files.get(path.as_ref()).cloned()
    }

    /// Every workspace-relative path, sorted.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().await.files.files.keys().cloned().collect()
    }

    /// Number of file writes and removals performed by commits.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.files.writes
    }

    /// Number of completed commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub async fn index(&self) -> WorkspaceIndex {
        self.state.lock().await.index.clone()
    }
}

#[async_trait]
impl WorkspaceStore for MemoryWorkspace {
    async fn process_entry(
        &self,
        aggregate: &mut AggregateSourceElements,
        ctx: &PackageContext,
        entry: &FileProperty,
        attribution: &CompositeAttribution,
    ) -> Result<()> {
        stage_entry(aggregate, ctx, entry, attribution).await
    }

    async fn remove_obsolete(
        &self,
        aggregate: &mut AggregateSourceElements,
        ctx: &PackageContext,
        name: &ObsoleteName,
    ) -> Result<()> {
        let state = self.state.lock().await;
        stage_removal(aggregate, ctx, &state.index, name);
        Ok(())
    }

    async fn commit(
        &self,
        aggregate: AggregateSourceElements,
        options: &CommitOptions,
    ) -> Result<AggregateSourceElements> {
        let mut guard = self.state.lock().await;
        let State { files, index } = &mut *guard;
        let committed = commit_staged(files, index, aggregate, options).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(committed)
    }

    async fn modified_members(&self) -> Result<Vec<MemberKey>> {
        let state = self.state.lock().await;
        let modified = state
            .index
            .iter()
            .filter(|entry| {
                entry.files.iter().any(|f| {
                    state
                        .files
                        .files
                        .get(&entry.workspace_path(f))
                        .map_or(true, |b| ContentHash::of(b) != f.hash)
                })
            })
            .map(|entry| entry.member.clone())
            .collect();
        Ok(modified)
    }

    async fn untracked_paths(&self) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().await;
        let tracked = state.index.paths();
        Ok(state
            .files
            .files
            .keys()
            .filter(|path| !tracked.contains(*path))
            .cloned()
            .collect())
    }
}
