//! Building retrieval manifests for packages.

use std::path::{Path, PathBuf};

use tracksync_core::{ManifestDocument, Package, RetrievalManifest, MANIFEST_FILE_NAME};

use crate::error::Result;

/// Caller overrides for manifest building.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestOptions {
    /// API version tag; takes precedence over the environment default.
    pub api_version: Option<String>,
    /// Pre-built manifest used verbatim instead of the package's members.
    pub manifest_override: Option<PathBuf>,
}

/// Produces the manifest for one package.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    options: ManifestOptions,
    default_api_version: String,
}

impl ManifestBuilder {
    pub fn new(options: ManifestOptions, default_api_version: impl Into<String>) -> Self {
        Self {
            options,
            default_api_version: default_api_version.into(),
        }
    }

    /// The API version written into built manifests.
    pub fn api_version(&self) -> &str {
        self.options
            .api_version
            .as_deref()
            .unwrap_or(&self.default_api_version)
    }

    /// Build the manifest for `package`, writing it into `output_dir`.
    ///
    /// A package with nothing to retrieve yields [`RetrievalManifest::Empty`]
    /// and touches nothing on disk.
    pub async fn build(&self, package: &Package, output_dir: &Path) -> Result<RetrievalManifest> {
        if !package.has_retrievals() {
            return Ok(RetrievalManifest::Empty);
        }

        if let Some(path) = &self.options.manifest_override {
            tracing::debug!(
                package = %package.name,
                manifest = %path.display(),
                "using provided manifest"
            );
            return Ok(RetrievalManifest::Provided { path: path.clone() });
        }

        let document = ManifestDocument::from_members(self.api_version(), package.member_keys());
        let path = output_dir.join(MANIFEST_FILE_NAME);
        tokio::fs::write(&path, document.to_json()?).await?;

        tracing::debug!(
            package = %package.name,
            members = package.members.len(),
            api_version = %document.api_version,
            "manifest written"
        );
        Ok(RetrievalManifest::Built { path, document })
    }
}
