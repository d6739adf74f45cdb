//! # tracksync store
//!
//! Revision checkpoint persistence. Provides a trait-based interface with
//! SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! For every tracked member the store keeps two counters: the checkpoint
//! (`local_revision`, the remote revision whose content was last durably
//! written locally) and the last remote revision observed. The checkpoint
//! represents "the remote state as of the last successful pull".
//!
//! ## Key Types
//!
//! - [`RevisionStore`] - The async trait for raw record operations
//! - [`StoreExt`] - Diffing and checkpoint maintenance on top of any store
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tracksync_core::{EnvironmentId, MemberKey, RemoteRevision};
//! use tracksync_store::{SqliteStore, StoreExt};
//!
//! async fn example() {
//!     let store = SqliteStore::open("revisions.db").unwrap();
//!     let env = EnvironmentId::new("dev-org").unwrap();
//!
//!     let remote = vec![RemoteRevision::new(MemberKey::new("ApexClass", "Foo"), 5)];
//!     let diff = store.diff(&env, &remote).await.unwrap();
//!     println!("{} to retrieve", diff.to_retrieve.len());
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CheckpointRebuild, RevisionDiff, RevisionStore, StoreExt};
