//! Workspace elements and the per-package aggregate of touched elements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::types::{ContentHash, MemberKey};

/// What happened to an element during an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementState {
    New,
    Changed,
    Deleted,
    Unchanged,
}

/// One file belonging to a workspace element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    /// Path relative to the package directory in the workspace.
    pub path: PathBuf,
    /// Hash of the staged content; `None` for deletions.
    pub hash: Option<ContentHash>,
    /// Where the retrieved content is staged until commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Content type is on the caller's unsupported list; stored opaquely.
    #[serde(default)]
    pub unsupported: bool,
}

/// A local, file-backed unit owned by one tracked member.
///
/// Composite members own several files; everything else owns one or two
/// (content plus a metadata sidecar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceElement {
    pub member: MemberKey,
    pub package: String,
    pub state: ElementState,
    pub files: Vec<WorkspaceFile>,
}

impl WorkspaceElement {
    pub fn new(member: MemberKey, package: impl Into<String>, state: ElementState) -> Self {
        Self {
            member,
            package: package.into(),
            state,
            files: Vec::new(),
        }
    }

    /// Add or replace a file by path.
    pub fn upsert_file(&mut self, file: WorkspaceFile) {
        match self.files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => *existing = file,
            None => self.files.push(file),
        }
    }

    pub fn summaries(&self) -> Vec<WorkspaceElementSummary> {
        self.files
            .iter()
            .map(|f| WorkspaceElementSummary {
                state: self.state,
                full_name: self.member.full_name.clone(),
                member_type: self.member.member_type.clone(),
                file_path: f.path.clone(),
            })
            .collect()
    }
}

/// Flat per-file view of an element, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceElementSummary {
    pub state: ElementState,
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "type")]
    pub member_type: String,
    #[serde(rename = "filePath")]
    pub file_path: PathBuf,
}

/// Every workspace element touched by one apply, keyed by owning member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSourceElements {
    elements: BTreeMap<MemberKey, WorkspaceElement>,
}

impl AggregateSourceElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MemberKey) -> Option<&WorkspaceElement> {
        self.elements.get(key)
    }

    /// Get the element for `member`, creating it with `state` if absent.
    pub fn entry(
        &mut self,
        member: MemberKey,
        package: &str,
        state: ElementState,
    ) -> &mut WorkspaceElement {
        self.elements
            .entry(member.clone())
            .or_insert_with(|| WorkspaceElement::new(member, package, state))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkspaceElement> {
        self.elements.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorkspaceElement> {
        self.elements.values_mut()
    }

    /// Members whose content was written (not deleted).
    pub fn written_members(&self) -> impl Iterator<Item = &MemberKey> {
        self.elements
            .values()
            .filter(|e| {
                matches!(
                    e.state,
                    ElementState::New | ElementState::Changed | ElementState::Unchanged
                )
            })
            .map(|e| &e.member)
    }

    /// Members whose local files were removed.
    pub fn deleted_members(&self) -> impl Iterator<Item = &MemberKey> {
        self.elements
            .values()
            .filter(|e| e.state == ElementState::Deleted)
            .map(|e| &e.member)
    }

    /// Per-file summaries of every touched element.
    pub fn summaries(&self) -> Vec<WorkspaceElementSummary> {
        self.elements.values().flat_map(|e| e.summaries()).collect()
    }
}

impl IntoIterator for AggregateSourceElements {
    type Item = WorkspaceElement;
    type IntoIter = std::collections::btree_map::IntoValues<MemberKey, WorkspaceElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_values()
    }
}
