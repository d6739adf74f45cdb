//! Error types for a pull.

use thiserror::Error;
use tracksync_core::{ConflictEntry, RetrieveMessage, RetrieveStatus};
use tracksync_store::StoreError;
use tracksync_sync::SyncError;

use crate::report::PullReport;

/// Discriminant of a [`PullError`].
///
/// The operation-level names are `SourceConflict`, `RetrieveFailed` and
/// `UnsupportedEnvironment`. `ApplyFailed` extends that set: it names a
/// package whose retrieval succeeded but whose workspace commit or
/// checkpoint advance failed, which the other names would misreport.
/// `Store` and `Sync` cover failures outside any package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullErrorKind {
    SourceConflict,
    UnsupportedEnvironment,
    RetrieveFailed,
    /// Not one of the operation-level names; see the type docs.
    ApplyFailed,
    Store,
    Sync,
}

/// Errors that can end a pull.
///
/// `SourceConflict` and `UnsupportedEnvironment` abort before anything is
/// retrieved. `RetrieveFailed` and `ApplyFailed` name the first failed
/// package and carry the full report: packages that succeeded stay applied.
#[derive(Debug, Error)]
pub enum PullError {
    /// Members changed both locally and remotely.
    #[error("source conflict: {} member(s) changed locally and remotely", .conflicts.len())]
    SourceConflict { conflicts: Vec<ConflictEntry> },

    /// Revision tracking is not available against this environment.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// A package's retrieve call failed or returned an unsuccessful result.
    #[error("retrieve failed for package {package}: {status}")]
    RetrieveFailed {
        package: String,
        status: RetrieveStatus,
        messages: Vec<RetrieveMessage>,
        report: Box<PullReport>,
    },

    /// Writing a package's retrieved content into the workspace failed.
    #[error("apply failed for package {package}: {message}")]
    ApplyFailed {
        package: String,
        message: String,
        report: Box<PullReport>,
    },

    /// Revision store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Any other sync error.
    #[error("sync error: {0}")]
    Sync(SyncError),
}

impl PullError {
    pub fn kind(&self) -> PullErrorKind {
        match self {
            PullError::SourceConflict { .. } => PullErrorKind::SourceConflict,
            PullError::UnsupportedEnvironment(_) => PullErrorKind::UnsupportedEnvironment,
            PullError::RetrieveFailed { .. } => PullErrorKind::RetrieveFailed,
            PullError::ApplyFailed { .. } => PullErrorKind::ApplyFailed,
            PullError::Store(_) => PullErrorKind::Store,
            PullError::Sync(_) => PullErrorKind::Sync,
        }
    }

    /// Conflicting members, for `SourceConflict`.
    pub fn conflicts(&self) -> &[ConflictEntry] {
        match self {
            PullError::SourceConflict { conflicts } => conflicts,
            _ => &[],
        }
    }

    /// The pull report, for per-package failures.
    pub fn report(&self) -> Option<&PullReport> {
        match self {
            PullError::RetrieveFailed { report, .. } | PullError::ApplyFailed { report, .. } => {
                Some(report)
            }
            _ => None,
        }
    }
}

impl From<SyncError> for PullError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::UnsupportedEnvironment(message) => {
                PullError::UnsupportedEnvironment(message)
            }
            SyncError::Store(e) => PullError::Store(e),
            other => PullError::Sync(other),
        }
    }
}

/// Result type for pulls.
pub type Result<T> = std::result::Result<T, PullError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tracksync_core::MemberKey;

    #[test]
    fn test_unsupported_environment_is_lifted() {
        let err = PullError::from(SyncError::UnsupportedEnvironment("scratch".into()));
        assert_eq!(err.kind(), PullErrorKind::UnsupportedEnvironment);

        let err = PullError::from(SyncError::Timeout("slow".into()));
        assert_eq!(err.kind(), PullErrorKind::Sync);
    }

    #[test]
    fn test_conflict_payload() {
        let err = PullError::SourceConflict {
            conflicts: vec![ConflictEntry {
                member: MemberKey::new("ApexClass", "Foo"),
                local_revision: 3,
                remote_revision: 5,
            }],
        };
        assert_eq!(err.kind(), PullErrorKind::SourceConflict);
        assert_eq!(err.conflicts().len(), 1);
        assert!(err.report().is_none());
        assert!(err.to_string().contains("1 member(s)"));
    }

    #[test]
    fn test_apply_failed_is_its_own_kind() {
        let err = PullError::ApplyFailed {
            package: "unpackaged".into(),
            message: "disk full".into(),
            report: Box::default(),
        };
        assert_eq!(err.kind(), PullErrorKind::ApplyFailed);
        assert_ne!(err.kind(), PullErrorKind::RetrieveFailed);
        assert!(err.report().is_some());
        assert!(err.conflicts().is_empty());
    }
}
