//! The workspace index: what was last written for each member.
//!
//! The index is the baseline for local modification checks. On disk it is a
//! CBOR array of entries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracksync_core::{ContentHash, MemberKey, WorkspaceElement};

use crate::error::{Result, SyncError};

/// One file as last written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    /// Path relative to the package directory.
    pub path: PathBuf,
    pub hash: ContentHash,
}

/// Everything last written for one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub member: MemberKey,
    pub package: String,
    pub files: Vec<IndexedFile>,
}

impl IndexEntry {
    /// Workspace-relative path of one of this entry's files.
    pub fn workspace_path(&self, file: &IndexedFile) -> PathBuf {
        super::workspace_path(&self.package, &file.path)
    }
}

/// Index of written members, keyed by member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<IndexEntry>", into = "Vec<IndexEntry>")]
pub struct WorkspaceIndex {
    entries: BTreeMap<MemberKey, IndexEntry>,
}

impl WorkspaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, member: &MemberKey) -> Option<&IndexEntry> {
        self.entries.get(member)
    }

    /// Record a committed element, replacing any previous entry. Files
    /// without a hash are skipped.
    pub fn record(&mut self, element: &WorkspaceElement) {
        let files = element
            .files
            .iter()
            .filter_map(|f| {
                f.hash.map(|hash| IndexedFile {
                    path: f.path.clone(),
                    hash,
                })
            })
            .collect();
        self.entries.insert(
            element.member.clone(),
            IndexEntry {
                member: element.member.clone(),
                package: element.package.clone(),
                files,
            },
        );
    }

    pub fn remove(&mut self, member: &MemberKey) -> Option<IndexEntry> {
        self.entries.remove(member)
    }

    /// Record a single written file for `member`, keeping its other files.
    /// An entry under a different package is replaced.
    pub fn record_file(
        &mut self,
        member: &MemberKey,
        package: &str,
        path: PathBuf,
        hash: ContentHash,
    ) {
        let entry = self
            .entries
            .entry(member.clone())
            .or_insert_with(|| IndexEntry {
                member: member.clone(),
                package: package.to_string(),
                files: Vec::new(),
            });
        if entry.package != package {
            entry.package = package.to_string();
            entry.files.clear();
        }
        match entry.files.iter_mut().find(|f| f.path == path) {
            Some(file) => file.hash = hash,
            None => entry.files.push(IndexedFile { path, hash }),
        }
    }

    /// Forget one file of `member`. The entry goes once it has no files.
    pub fn forget_file(&mut self, member: &MemberKey, path: &Path) {
        if let Some(entry) = self.entries.get_mut(member) {
            entry.files.retain(|f| f.path != path);
            if entry.files.is_empty() {
                self.entries.remove(member);
            }
        }
    }

    /// Workspace-relative paths of every indexed file.
    pub fn paths(&self) -> BTreeSet<PathBuf> {
        self.entries
            .values()
            .flat_map(|e| e.files.iter().map(|f| e.workspace_path(f)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SyncError::Index(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::Index(e.to_string()))
    }
}

impl From<Vec<IndexEntry>> for WorkspaceIndex {
    fn from(entries: Vec<IndexEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.member.clone(), e)).collect(),
        }
    }
}

impl From<WorkspaceIndex> for Vec<IndexEntry> {
    fn from(index: WorkspaceIndex) -> Self {
        index.entries.into_values().collect()
    }
}
