//! # tracksync core
//!
//! Pure data model for reconciling a local workspace with a remote metadata
//! repository: tracked members and their revisions, packages, retrieval
//! manifests, retrieval results, and the workspace elements an apply touches.
//!
//! This crate performs no I/O.
//!
//! ## Key Types
//!
//! - [`MemberKey`] - `(type, fullName)` identity of a remote metadata unit
//! - [`TrackedMember`] - a member with its checkpointed and last-seen revisions
//! - [`Package`] - members retrieved together in one call
//! - [`RetrievalManifest`] - the member list for one call, or the empty sentinel
//! - [`RetrievalResult`] - what the remote reports back, with its success predicate
//! - [`AggregateSourceElements`] - workspace elements touched by one apply
//! - [`TypeRegistry`] - composite (bundle) types, single-file type directories

pub mod element;
pub mod error;
pub mod manifest;
pub mod package;
pub mod registry;
pub mod retrieve;
pub mod types;

pub use element::{
    AggregateSourceElements, ElementState, WorkspaceElement, WorkspaceElementSummary,
    WorkspaceFile,
};
pub use error::{CoreError, Result};
pub use manifest::{ManifestDocument, ManifestType, RetrievalManifest, MANIFEST_FILE_NAME};
pub use package::{partition, Package, PartitionPolicy, DEFAULT_PACKAGE};
pub use registry::{BundleLocation, CompositeType, DescriptorPattern, FileType, TypeRegistry};
pub use retrieve::{
    normalize_separators, strip_package_root, FileProperty, RetrievalResult, RetrieveMessage,
    RetrieveStatus, MANIFEST_WRAPPER_TYPE,
};
pub use types::{
    ConflictEntry, ContentHash, EnvironmentId, MemberKey, ObsoleteName, RemoteRevision,
    TrackedMember,
};
