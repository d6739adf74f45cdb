//! # tracksync testkit
//!
//! Testing utilities for tracksync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an in-memory remote, revision store and workspace wired
//!   together, plus status and workspace doubles for failure paths
//! - **Generators**: Proptest strategies for member keys and remote
//!   revision sets
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tracksync_core::MemberKey;
//! use tracksync_testkit::fixtures::PullFixture;
//!
//! async fn example() {
//!     let fixture = PullFixture::new();
//!     fixture
//!         .remote
//!         .put(MemberKey::new("ApexClass", "Foo"), &[("classes/Foo.cls", "class Foo {}")])
//!         .await;
//!     let status = fixture.status();
//!     // hand the fixture's parts to a PullSession
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tracksync_testkit::generators::remote_members;
//!
//! proptest! {
//!     #[test]
//!     fn pull_converges(members in remote_members(8)) {
//!         // put every member, pull twice, expect the second pull to be empty
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{FailingWorkspace, PullFixture, ScriptedStatus};
pub use generators::{member_key, remote_members, GeneratedMember};
