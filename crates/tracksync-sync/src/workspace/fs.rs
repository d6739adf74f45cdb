//! Filesystem workspace.
//!
//! Content lives under `<root>/<package>/...`. The index of what was last
//! written is kept in `<root>/.tracksync/index.cbor` and rewritten after every
//! commit, including one that failed after writing some files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracksync_core::{
    AggregateSourceElements, ContentHash, FileProperty, MemberKey, ObsoleteName,
};

use super::{
    commit_staged, stage_entry, stage_removal, CommitOptions, FileBackend, WorkspaceIndex,
    WorkspaceStore,
};
use crate::applier::CompositeAttribution;
use crate::context::PackageContext;
use crate::error::Result;

/// Directory under the workspace root holding tracksync state.
pub const STATE_DIR: &str = ".tracksync";
/// Index file name inside [`STATE_DIR`].
pub const INDEX_FILE: &str = "index.cbor";

/// Suffix of the temp file [`write_atomic`] renames into place.
const TMP_SUFFIX: &str = ".tracksync-tmp";

/// Write `content` to `path` through a sibling temp file and a rename.
async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await
}

struct Disk {
    root: PathBuf,
}

#[async_trait]
impl FileBackend for Disk {
    async fn read(&self, path: &Path) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.root.join(path)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&mut self, path: &Path, content: Bytes) -> Result<()> {
        write_atomic(&self.root.join(path), &content).await?;
        Ok(())
    }

    async fn remove(&mut self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(self.root.join(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Workspace backed by a project directory.
pub struct FsWorkspace {
    root: PathBuf,
    index: Mutex<WorkspaceIndex>,
}

impl FsWorkspace {
    /// Open a workspace rooted at `root`, loading its index if present.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let index = match tokio::fs::read(root.join(STATE_DIR).join(INDEX_FILE)).await {
            Ok(bytes) => WorkspaceIndex::from_cbor(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => WorkspaceIndex::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(root = %root.display(), members = index.len(), "workspace opened");

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn index(&self) -> WorkspaceIndex {
        self.index.lock().await.clone()
    }

    async fn persist(&self, index: &WorkspaceIndex) -> Result<()> {
        let bytes = index.to_cbor()?;
        write_atomic(&self.root.join(STATE_DIR).join(INDEX_FILE), &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkspaceStore for FsWorkspace {
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
        let index = self.index.lock().await;
        stage_removal(aggregate, ctx, &index, name);
        Ok(())
    }

    async fn commit(
        &self,
        aggregate: AggregateSourceElements,
        options: &CommitOptions,
    ) -> Result<AggregateSourceElements> {
        let mut index = self.index.lock().await;
        let mut disk = Disk {
            root: self.root.clone(),
        };
        let mut next = index.clone();
        let committed = commit_staged(&mut disk, &mut next, aggregate, options).await;
        if next == *index {
            return committed;
        }

        // Files changed on disk, so the index follows even if the commit or
        // the index write failed.
        let persisted = self.persist(&next).await;
        *index = next;
        if let Err(e) = &persisted {
            tracing::warn!(root = %self.root.display(), error = %e, "index write failed");
        }
        let committed = committed?;
        persisted?;
        Ok(committed)
    }

    async fn modified_members(&self) -> Result<Vec<MemberKey>> {
        let index = self.index.lock().await;
        let disk = Disk {
            root: self.root.clone(),
        };
        let mut modified = Vec::new();
        for entry in index.iter() {
            for file in &entry.files {
                let current = disk.read(&entry.workspace_path(file)).await?;
                if current.map_or(true, |b| ContentHash::of(&b) != file.hash) {
                    modified.push(entry.member.clone());
                    break;
                }
            }
        }
        Ok(modified)
    }

    async fn untracked_paths(&self) -> Result<Vec<PathBuf>> {
        let tracked = self.index.lock().await.paths();
        let mut untracked = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if relative == Path::new(STATE_DIR) {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file()
                    && !relative.to_string_lossy().ends_with(TMP_SUFFIX)
                    && !tracked.contains(relative)
                {
                    untracked.push(relative.to_path_buf());
                }
            }
        }

        untracked.sort();
        Ok(untracked)
    }
}
