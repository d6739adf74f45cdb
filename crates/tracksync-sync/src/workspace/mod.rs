//! Workspace backing stores.
//!
//! A workspace store turns retrieved files into local workspace elements. It
//! stages entries into an [`AggregateSourceElements`] while the retrieval's
//! target directory still exists, then commits the aggregate in one step.

pub mod fs;
pub mod index;
pub mod memory;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracksync_core::{
    strip_package_root, AggregateSourceElements, ContentHash, ElementState, FileProperty,
    MemberKey, ObsoleteName, WorkspaceFile,
};

use crate::applier::CompositeAttribution;
use crate::context::PackageContext;
use crate::error::{Result, SyncError};

pub use fs::FsWorkspace;
pub use index::{IndexEntry, IndexedFile, WorkspaceIndex};
pub use memory::MemoryWorkspace;

/// Flags passed through to [`WorkspaceStore::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Manifest the aggregate was retrieved with, if any.
    pub manifest: Option<PathBuf>,
    /// Skip the check that no two elements claim the same path.
    pub skip_duplicate_check: bool,
    /// Content types stored opaquely instead of expanded.
    pub unsupported_mime_types: Vec<String>,
    /// Overwrite files modified locally since they were last written.
    pub force_overwrite: bool,
}

/// Local workspace persistence.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Stage one retrieved file into the aggregate.
    async fn process_entry(
        &self,
        aggregate: &mut AggregateSourceElements,
        ctx: &PackageContext,
        entry: &FileProperty,
        attribution: &CompositeAttribution,
    ) -> Result<()>;

    /// Stage removal of every local file owned by `name`.
    async fn remove_obsolete(
        &self,
        aggregate: &mut AggregateSourceElements,
        ctx: &PackageContext,
        name: &ObsoleteName,
    ) -> Result<()>;

    /// Write the staged aggregate. Returns it with final element states.
    async fn commit(
        &self,
        aggregate: AggregateSourceElements,
        options: &CommitOptions,
    ) -> Result<AggregateSourceElements>;

    /// Members with local files that differ from what was last written.
    async fn modified_members(&self) -> Result<Vec<MemberKey>>;

    /// Local files no commit ever wrote, as workspace-relative paths
    /// (`<package>/...`).
    async fn untracked_paths(&self) -> Result<Vec<PathBuf>>;
}

/// Content type guessed from a file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "xml" => "application/xml",
        "json" => "application/json",
        "js" => "application/javascript",
        "css" => "text/css",
        "html" | "htm" => "text/html",
        "txt" | "cls" | "trigger" | "cmp" | "app" | "evt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Stage a retrieved file: hash its content and attach it to its owner.
///
/// Composite siblings are attached to the owner from `attribution`; every
/// other file to its own member.
pub(crate) async fn stage_entry(
    aggregate: &mut AggregateSourceElements,
    ctx: &PackageContext,
    entry: &FileProperty,
    attribution: &CompositeAttribution,
) -> Result<()> {
    let owner = attribution
        .owner_of(entry)
        .map(|o| o.member.clone())
        .unwrap_or_else(|| entry.key());

    let relative = entry.path();
    let source = ctx.staged_path(&relative);
    let content = match tokio::fs::read(&source).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SyncError::MissingFile(source));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(
        package = %ctx.package,
        member = %owner,
        file = %relative.display(),
        "staged"
    );
    aggregate
        .entry(owner, &ctx.package, ElementState::New)
        .upsert_file(WorkspaceFile {
            path: strip_package_root(&relative),
            hash: Some(ContentHash::of(&content)),
            source: Some(source),
            unsupported: false,
        });
    Ok(())
}

/// Stage the deletion of a member's indexed files.
pub(crate) fn stage_removal(
    aggregate: &mut AggregateSourceElements,
    ctx: &PackageContext,
    index: &WorkspaceIndex,
    name: &ObsoleteName,
) {
    let key = name.key();
    let element = aggregate.entry(key.clone(), &ctx.package, ElementState::Deleted);
    element.state = ElementState::Deleted;
    element.files.clear();
    if let Some(indexed) = index.get(&key) {
        element.package = indexed.package.clone();
        for file in &indexed.files {
            element.files.push(WorkspaceFile {
                path: file.path.clone(),
                hash: None,
                source: None,
                unsupported: false,
            });
        }
    }
    tracing::debug!(
        package = %ctx.package,
        member = %key,
        files = element.files.len(),
        "staged removal"
    );
}

/// Raw file access used by [`commit_staged`].
#[async_trait]
pub(crate) trait FileBackend: Send + Sync {
    /// Current content at a workspace-relative path.
    async fn read(&self, path: &Path) -> Result<Option<Bytes>>;
    async fn write(&mut self, path: &Path, content: Bytes) -> Result<()>;
    async fn remove(&mut self, path: &Path) -> Result<()>;
}

/// One pending file change, with the index entry it belongs to.
struct Action {
    member: MemberKey,
    package: String,
    /// Path relative to the package directory.
    file: PathBuf,
    kind: ActionKind,
}

enum ActionKind {
    Write(Bytes),
    Remove,
}

impl Action {
    fn path(&self) -> PathBuf {
        workspace_path(&self.package, &self.file)
    }

    /// Reflect this change, already made on the backend, in the index.
    fn record(&self, index: &mut WorkspaceIndex) {
        match &self.kind {
            ActionKind::Write(content) => index.record_file(
                &self.member,
                &self.package,
                self.file.clone(),
                ContentHash::of(content),
            ),
            ActionKind::Remove => index.forget_file(&self.member, &self.file),
        }
    }
}

/// Workspace-relative location of an element file.
pub(crate) fn workspace_path(package: &str, file: &Path) -> PathBuf {
    Path::new(package).join(file)
}

/// Commit a staged aggregate against a backend and an index.
///
/// Every check runs before anything is written, so a commit rejected by a
/// check leaves the workspace untouched. If the backend fails part way
/// through, the index records exactly the changes that reached it before the
/// error is returned.
pub(crate) async fn commit_staged<B: FileBackend + ?Sized>(
    backend: &mut B,
    index: &mut WorkspaceIndex,
    mut aggregate: AggregateSourceElements,
    options: &CommitOptions,
) -> Result<AggregateSourceElements> {
    let mut claimed: HashMap<PathBuf, MemberKey> = HashMap::new();
    let mut actions = Vec::new();

    for element in aggregate.iter_mut() {
        if element.state == ElementState::Deleted {
            for file in &element.files {
                actions.push(Action {
                    member: element.member.clone(),
                    package: element.package.clone(),
                    file: file.path.clone(),
                    kind: ActionKind::Remove,
                });
            }
            continue;
        }

        let previous = index.get(&element.member).cloned();
        let mut unchanged = previous.is_some();

        for file in element.files.iter_mut() {
            let path = workspace_path(&element.package, &file.path);

            if !options.skip_duplicate_check {
                if let Some(other) = claimed.insert(path.clone(), element.member.clone()) {
                    if other != element.member {
                        return Err(SyncError::Duplicate(path));
                    }
                }
            }

            let mime = content_type(&file.path);
            if options.unsupported_mime_types.iter().any(|m| m == mime) {
                tracing::warn!(
                    file = %path.display(),
                    mime,
                    "unsupported content type, stored as-is"
                );
                file.unsupported = true;
            }

            let incoming = file.hash;
            let current = backend.read(&path).await?.map(|b| ContentHash::of(&b));
            let indexed = previous
                .as_ref()
                .and_then(|p| p.files.iter().find(|f| p.workspace_path(f) == path))
                .map(|f| f.hash);

            if current == incoming {
                unchanged &= indexed == incoming;
                continue;
            }
            unchanged = false;

            let locally_modified = current.is_some() && current != indexed;
            if locally_modified && !options.force_overwrite {
                return Err(SyncError::LocalModified(path));
            }

            let source = file
                .source
                .as_ref()
                .ok_or_else(|| SyncError::MissingFile(path.clone()))?;
            let content = Bytes::from(tokio::fs::read(source).await?);
            actions.push(Action {
                member: element.member.clone(),
                package: element.package.clone(),
                file: file.path.clone(),
                kind: ActionKind::Write(content),
            });
        }

        if let Some(previous) = &previous {
            let kept: Vec<PathBuf> = element
                .files
                .iter()
                .map(|f| workspace_path(&element.package, &f.path))
                .collect();
            for stale in &previous.files {
                if !kept.contains(&previous.workspace_path(stale)) {
                    unchanged = false;
                    actions.push(Action {
                        member: previous.member.clone(),
                        package: previous.package.clone(),
                        file: stale.path.clone(),
                        kind: ActionKind::Remove,
                    });
                }
            }
        }

        element.state = match (&previous, unchanged) {
            (None, _) => ElementState::New,
            (Some(_), true) => ElementState::Unchanged,
            (Some(_), false) => ElementState::Changed,
        };
    }

    for (done, action) in actions.iter().enumerate() {
        let path = action.path();
        let outcome = match &action.kind {
            ActionKind::Write(content) => backend.write(&path, content.clone()).await,
            ActionKind::Remove => backend.remove(&path).await,
        };
        if let Err(e) = outcome {
            for applied in &actions[..done] {
                applied.record(index);
            }
            tracing::warn!(
                file = %path.display(),
                written = done,
                pending = actions.len() - done,
                error = %e,
                "commit interrupted"
            );
            return Err(e);
        }
    }

    for element in aggregate.iter_mut() {
        if element.state == ElementState::Deleted {
            index.remove(&element.member);
        } else {
            index.record(element);
        }
        for file in element.files.iter_mut() {
            file.source = None;
        }
    }

    if let Some(manifest) = &options.manifest {
        tracing::debug!(manifest = %manifest.display(), elements = aggregate.len(), "committed");
    } else {
        tracing::debug!(elements = aggregate.len(), "committed");
    }
    Ok(aggregate)
}
