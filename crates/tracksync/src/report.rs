//! What a pull did, package by package.

use tracksync_core::{
    AggregateSourceElements, RetrieveMessage, RetrieveStatus, WorkspaceElementSummary,
};
use tracksync_store::CheckpointRebuild;

/// How a package's retrieval result came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    /// The gateway was called.
    Performed,
    /// Nothing to retrieve; an empty successful result stood in so the
    /// package's deletions could still be applied.
    Synthesized,
}

/// Why a package failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageFailure {
    Retrieve {
        status: RetrieveStatus,
        messages: Vec<RetrieveMessage>,
    },
    Apply {
        message: String,
    },
}

/// Outcome of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    Applied {
        retrieval: Retrieval,
        elements: AggregateSourceElements,
    },
    Failed(PackageFailure),
    /// Not attempted because an earlier package failed and the pull stops on
    /// the first failure.
    Skipped,
}

/// One package's entry in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub package: String,
    /// Members slated for retrieval.
    pub members: usize,
    /// Obsolete names slated for deletion.
    pub obsolete: usize,
    pub outcome: PackageOutcome,
}

impl PackageReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PackageOutcome::Failed(_))
    }

    /// Elements this package touched; empty unless applied.
    pub fn elements(&self) -> Option<&AggregateSourceElements> {
        match &self.outcome {
            PackageOutcome::Applied { elements, .. } => Some(elements),
            _ => None,
        }
    }
}

/// Result of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Files brought in or removed by every applied package.
    pub inbound_files: Vec<WorkspaceElementSummary>,
    pub packages: Vec<PackageReport>,
    /// The checkpoint rebuild that closed the pull.
    pub checkpoint: CheckpointRebuild,
}

impl PullReport {
    /// Nothing changed remotely: no package was needed.
    pub fn is_up_to_date(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn failed_packages(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages.iter().filter(|p| p.is_failed())
    }

    pub fn first_failure(&self) -> Option<&PackageReport> {
        self.failed_packages().next()
    }

    pub fn package(&self, name: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|p| p.package == name)
    }
}
