//! Configuration for a pull.

use std::path::PathBuf;
use std::time::Duration;

use tracksync_core::{EnvironmentId, ObsoleteName, PartitionPolicy};

/// Default bound on one retrieve call.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(33 * 60);

/// Configuration for pull operations.
#[derive(Debug, Clone)]
pub struct PullConfig {
    /// Environment the revision checkpoint is keyed by.
    pub environment: EnvironmentId,
    /// How long one retrieve call may take.
    pub wait: Duration,
    /// API version override for built manifests.
    pub api_version: Option<String>,
    /// Pre-built manifest used instead of computed membership.
    pub manifest_override: Option<PathBuf>,
    /// Skip the conflict check and overwrite local edits.
    pub force_overwrite: bool,
    /// Content types stored opaquely.
    pub unsupported_mime_types: Vec<String>,
    /// Stop processing packages after the first failure.
    pub stop_on_first_failure: bool,
    /// Parent directory for per-package scratch directories. Defaults to the
    /// OS temp directory.
    pub scratch_root: Option<PathBuf>,
    /// How members are grouped into packages.
    pub partition: PartitionPolicy,
    /// Members flagged obsolete by the caller, on top of those the diff finds.
    pub obsolete_names: Vec<ObsoleteName>,
}

impl PullConfig {
    /// Creates a configuration for `environment` with defaults.
    pub fn new(environment: EnvironmentId) -> Self {
        Self {
            environment,
            wait: DEFAULT_WAIT,
            api_version: None,
            manifest_override: None,
            force_overwrite: false,
            unsupported_mime_types: Vec::new(),
            stop_on_first_failure: false,
            scratch_root: None,
            partition: PartitionPolicy::default(),
            obsolete_names: Vec::new(),
        }
    }

    /// Sets the retrieve wait bound.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Sets the API version for built manifests.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Uses a pre-built manifest for every package.
    pub fn with_manifest_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_override = Some(path.into());
        self
    }

    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    pub fn with_unsupported_mime_types(mut self, types: Vec<String>) -> Self {
        self.unsupported_mime_types = types;
        self
    }

    pub fn with_stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    /// Sets the parent directory for scratch directories.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_partition(mut self, partition: PartitionPolicy) -> Self {
        self.partition = partition;
        self
    }

    /// Adds members to delete locally regardless of the diff.
    pub fn with_obsolete_names(mut self, names: Vec<ObsoleteName>) -> Self {
        self.obsolete_names = names;
        self
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self::new(EnvironmentId::default())
    }
}
