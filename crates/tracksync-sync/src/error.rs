//! Error types for the sync module.

use std::path::PathBuf;

use thiserror::Error;
use tracksync_core::RetrievalResult;

/// A failed retrieve call.
///
/// When the remote got far enough to report a status, `result` carries that
/// failed result so callers can surface its status and messages.
#[derive(Debug, Clone, Error)]
#[error("retrieve failed: {message}")]
pub struct GatewayError {
    pub message: String,
    pub result: Option<RetrievalResult>,
}

impl GatewayError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result: None,
        }
    }

    pub fn with_result(message: impl Into<String>, result: RetrievalResult) -> Self {
        Self {
            message: message.into(),
            result: Some(result),
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] tracksync_store::StoreError),

    /// Data model error (manifest or result encoding).
    #[error("core error: {0}")]
    Core(#[from] tracksync_core::CoreError),

    /// Source tracking is not available against this environment.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// A file named in the retrieval result is missing from the target
    /// directory.
    #[error("retrieved file missing: {}", .0.display())]
    MissingFile(PathBuf),

    /// A local file changed since it was last written and overwrite was not
    /// forced.
    #[error("local file modified: {}", .0.display())]
    LocalModified(PathBuf),

    /// Two elements in one commit target the same path.
    #[error("duplicate target path: {}", .0.display())]
    Duplicate(PathBuf),

    /// Workspace index could not be read or written.
    #[error("workspace index error: {0}")]
    Index(String),

    /// Timeout waiting for the remote.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Removing a scratch directory failed. Logged, never propagated by the
    /// pull.
    #[error("cleanup of {} failed: {source}", .path.display())]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
