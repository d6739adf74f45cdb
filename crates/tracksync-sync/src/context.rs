//! Per-package context threaded through manifest build, retrieval and apply.

use std::path::{Path, PathBuf};

use tracksync_core::RetrievalManifest;

/// The package currently being pulled.
///
/// Passed explicitly to every step that needs to know which package it is
/// working on; nothing downstream reads a shared "current package".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageContext {
    pub package: String,
    /// Scratch directory the gateway retrieves into.
    pub target_dir: PathBuf,
    pub manifest: RetrievalManifest,
}

impl PackageContext {
    pub fn new(
        package: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        manifest: RetrievalManifest,
    ) -> Self {
        Self {
            package: package.into(),
            target_dir: target_dir.into(),
            manifest,
        }
    }

    /// Absolute location of a retrieved file inside the target directory.
    pub fn staged_path(&self, relative: &Path) -> PathBuf {
        self.target_dir.join(relative)
    }
}
