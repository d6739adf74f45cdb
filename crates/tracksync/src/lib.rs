//! # tracksync
//!
//! Pull remote metadata changes into a local workspace, tracked by revision.
//!
//! ## Overview
//!
//! A pull compares the revision counters the remote reports against a
//! persisted checkpoint, retrieves only what changed, writes it into the
//! workspace and advances the checkpoint. Members deleted remotely are
//! removed locally.
//!
//! - **Conflict check**: a member edited both locally and remotely since the
//!   checkpoint stops the pull before anything is retrieved.
//! - **Packages**: changed members are grouped by namespace and each group
//!   is retrieved and applied on its own.
//! - **Partial success**: a failed package does not undo the ones before it,
//!   and its members stay eligible for the next pull.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracksync::{PullConfig, PullSession};
//! use tracksync::core::EnvironmentId;
//! use tracksync::store::SqliteStore;
//! use tracksync::sync::{FsWorkspace, MemoryRemote, TrackedStatus};
//!
//! async fn example() {
//!     let env = EnvironmentId::new("dev-org").unwrap();
//!     let store = Arc::new(SqliteStore::open("revisions.db").unwrap());
//!     let remote = Arc::new(MemoryRemote::new());
//!     let workspace = Arc::new(FsWorkspace::open("force-app").await.unwrap());
//!     let status = Arc::new(TrackedStatus::new(
//!         store.clone(),
//!         remote.clone(),
//!         workspace.clone(),
//!         env.clone(),
//!     ));
//!
//!     let session = PullSession::new(
//!         store,
//!         remote.clone(),
//!         remote,
//!         workspace,
//!         status,
//!         PullConfig::new(env),
//!     );
//!     let report = session.pull().await.unwrap();
//!     println!("{} files", report.inbound_files.len());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `tracksync::core` - Member keys, packages, manifests, retrieval results
//! - `tracksync::store` - Revision checkpoint storage
//! - `tracksync::sync` - Conflict check, manifest builder, applier, gateway

pub mod config;
pub mod error;
pub mod pull;
pub mod report;

// Re-export component crates
pub use tracksync_core as core;
pub use tracksync_store as store;
pub use tracksync_sync as sync;

// Re-export main types for convenience
pub use config::{PullConfig, DEFAULT_WAIT};
pub use error::{PullError, PullErrorKind, Result};
pub use pull::PullSession;
pub use report::{PackageFailure, PackageOutcome, PackageReport, PullReport, Retrieval};

// Re-export commonly used core types
pub use tracksync_core::{
    ConflictEntry, EnvironmentId, MemberKey, ObsoleteName, PartitionPolicy, RemoteRevision,
    TrackedMember, TypeRegistry, WorkspaceElementSummary,
};
