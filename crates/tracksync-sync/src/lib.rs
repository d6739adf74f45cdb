//! # tracksync sync
//!
//! The moving parts of a pull, one package at a time.
//!
//! ## Overview
//!
//! - [`ConflictChecker`] refuses to proceed when a member changed both
//!   locally and remotely since the checkpoint.
//! - [`ManifestBuilder`] turns a package into a retrieval manifest, or the
//!   empty sentinel.
//! - [`RetrievalGateway`] performs the retrieve call. It is an external
//!   collaborator; [`MemoryRemote`] is an in-memory stand-in.
//! - [`SyncApplier`] attributes composite files to their owners and writes
//!   the result and the package's deletions through a [`WorkspaceStore`].
//!
//! ## Key Properties
//!
//! - **Explicit package context**: every step receives a [`PackageContext`]
//!   instead of consulting shared mutable state.
//! - **Checked commit**: a workspace commit checks every file before
//!   writing any of them, and its index always matches what reached disk.
//! - **No retries**: failures propagate to the caller.
//!
//! ## Flow
//!
//! ```text
//! ConflictChecker ─► RevisionStore::diff ─► per package:
//!     ManifestBuilder ─► RetrievalGateway ─► SyncApplier ─► WorkspaceStore::commit
//! ```

pub mod applier;
pub mod conflict;
pub mod context;
pub mod error;
pub mod gateway;
pub mod manifest;
pub mod workspace;

pub use applier::{ApplyOptions, CompositeAttribution, CompositeOwner, SyncApplier};
pub use conflict::{
    ChangeOrigin, ConflictChecker, StatusEntry, StatusScope, StatusService, TrackedStatus,
};
pub use context::PackageContext;
pub use error::{GatewayError, Result, SyncError};
pub use gateway::{
    memory::InjectedFailure, memory::MemoryRemote, memory::RetrieveCall, RemoteRepository,
    RetrievalGateway, DEFAULT_API_VERSION,
};
pub use manifest::{ManifestBuilder, ManifestOptions};
pub use workspace::{
    content_type, CommitOptions, FsWorkspace, MemoryWorkspace, WorkspaceIndex, WorkspaceStore,
};
