//! Remote repository and retrieval gateway abstractions.
//!
//! The wire protocol to the remote is not part of this crate. Implementations
//! may poll a SOAP/REST endpoint, read a local mirror, or anything else.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracksync_core::{RemoteRevision, RetrievalManifest, RetrievalResult};

use crate::error::{GatewayError, Result};

/// API version used when neither the caller nor the remote names one.
pub const DEFAULT_API_VERSION: &str = "60.0";

/// Revision queries against the remote repository.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Enumerate every tracked member with its current remote revision.
    ///
    /// Fails with [`crate::SyncError::UnsupportedEnvironment`] when the
    /// environment does not track revisions.
    async fn query_revisions(&self) -> Result<Vec<RemoteRevision>>;

    /// API version the environment speaks by default.
    fn default_api_version(&self) -> String;
}

/// Performs one retrieve call.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    /// Retrieve the members named by `manifest` into `target_dir`.
    ///
    /// `wait` bounds how long the call may poll the remote. On failure the
    /// error carries the failed result when the remote reported one.
    async fn retrieve(
        &self,
        manifest: &RetrievalManifest,
        target_dir: &Path,
        wait: Duration,
    ) -> std::result::Result<RetrievalResult, GatewayError>;
}

/// An in-memory remote for testing.
///
/// Holds member content and revisions, serves revision queries, and answers
/// retrieve calls by writing files into the target directory the way a real
/// retrieval unpacks its archive.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::path::PathBuf;

    use bytes::Bytes;
    use tokio::sync::RwLock;
    use tracksync_core::{
        normalize_separators, FileProperty, ManifestDocument, MemberKey, RetrieveMessage,
        RetrieveStatus, DEFAULT_PACKAGE, MANIFEST_WRAPPER_TYPE,
    };

    use crate::error::SyncError;

    /// A failure produced whenever a manifest names the affected member.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum InjectedFailure {
        /// Reject the call with a failed result attached to the error.
        Reject {
            status: RetrieveStatus,
            problem: String,
        },
        /// Never answer.
        Hang,
        /// Answer successfully but attach a diagnostic message.
        Warn(String),
    }

    /// One recorded retrieve call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RetrieveCall {
        pub target_dir: PathBuf,
        pub members: Vec<MemberKey>,
    }

    #[derive(Debug, Clone)]
    struct RemoteMember {
        revision: u64,
        deleted: bool,
        /// Paths relative to the package root, `/`-separated.
        files: Vec<(String, Bytes)>,
    }

    #[derive(Default)]
    struct RemoteState {
        members: BTreeMap<MemberKey, RemoteMember>,
        revision: u64,
        failures: HashMap<MemberKey, InjectedFailure>,
        touch_on_retrieve: Vec<MemberKey>,
        calls: Vec<RetrieveCall>,
        tracking_disabled: bool,
    }

    impl RemoteState {
        fn bump(&mut self) -> u64 {
            self.revision += 1;
            self.revision
        }
    }

    /// In-memory remote repository and retrieval gateway.
    pub struct MemoryRemote {
        state: RwLock<RemoteState>,
        api_version: String,
    }

    impl MemoryRemote {
        /// Create an empty remote.
        pub fn new() -> Self {
            Self::with_api_version(DEFAULT_API_VERSION)
        }

        pub fn with_api_version(api_version: impl Into<String>) -> Self {
            Self {
                state: RwLock::new(RemoteState::default()),
                api_version: api_version.into(),
            }
        }

        /// Create or edit a member. Returns its new revision.
        pub async fn put(&self, key: MemberKey, files: &[(&str, &str)]) -> u64 {
            let mut state = self.state.write().await;
            let revision = state.bump();
            let files = files
                .iter()
                .map(|(path, content)| {
                    (path.to_string(), Bytes::copy_from_slice(content.as_bytes()))
                })
                .collect();
            state.members.insert(
                key,
                RemoteMember {
                    revision,
                    deleted: false,
                    files,
                },
            );
            revision
        }

        /// Delete a member. Returns the revision of the deletion, or `None`
        /// if the member does not exist.
        pub async fn delete(&self, key: &MemberKey) -> Option<u64> {
            let mut state = self.state.write().await;
            if !state.members.get(key).is_some_and(|m| !m.deleted) {
                return None;
            }
            let revision = state.bump();
            let member = state.members.get_mut(key)?;
            member.revision = revision;
            member.deleted = true;
            member.files.clear();
            Some(revision)
        }

        /// Current revision of a member, deleted or not.
        pub async fn revision_of(&self, key: &MemberKey) -> Option<u64> {
            self.state.read().await.members.get(key).map(|m| m.revision)
        }

        /// Make every retrieve naming `key` fail.
        pub async fn fail(&self, key: MemberKey, failure: InjectedFailure) {
            self.state.write().await.failures.insert(key, failure);
        }

        pub async fn clear_failures(&self) {
            self.state.write().await.failures.clear();
        }

        /// Bump `key`'s revision right after the next retrieve that includes
        /// it, as if someone edited it remotely mid-pull.
        pub async fn touch_on_retrieve(&self, key: MemberKey) {
            self.state.write().await.touch_on_retrieve.push(key);
        }

        /// Make revision queries fail as on an environment without tracking.
        pub async fn disable_tracking(&self) {
            self.state.write().await.tracking_disabled = true;
        }

        /// Every retrieve call made so far, oldest first.
        pub async fn calls(&self) -> Vec<RetrieveCall> {
            self.state.read().await.calls.clone()
        }
    }

    impl Default for MemoryRemote {
        fn default() -> Self {
            Self::new()
        }
    }

    async fn write_file(root: &Path, relative: &str, content: &[u8]) -> std::io::Result<()> {
        let path = root.join(normalize_separators(relative));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }

    async fn manifest_members(
        manifest: &RetrievalManifest,
    ) -> std::result::Result<Vec<MemberKey>, GatewayError> {
        match manifest {
            RetrievalManifest::Empty => Ok(Vec::new()),
            RetrievalManifest::Built { document, .. } => Ok(document.members()),
            RetrievalManifest::Provided { path } => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    GatewayError::new(format!("reading manifest {}: {}", path.display(), e))
                })?;
                let document = ManifestDocument::from_json(&bytes)
                    .map_err(|e| GatewayError::new(e.to_string()))?;
                Ok(document.members())
            }
        }
    }

    #[async_trait]
    impl RemoteRepository for MemoryRemote {
        async fn query_revisions(&self) -> Result<Vec<RemoteRevision>> {
            let state = self.state.read().await;
            if state.tracking_disabled {
                return Err(SyncError::UnsupportedEnvironment(
                    "source tracking is not enabled for this environment".into(),
                ));
            }
            Ok(state
                .members
                .iter()
                .map(|(key, m)| RemoteRevision {
                    key: key.clone(),
                    revision: m.revision,
                    is_deleted: m.deleted,
                })
                .collect())
        }

        fn default_api_version(&self) -> String {
            self.api_version.clone()
        }
    }

    #[async_trait]
    impl RetrievalGateway for MemoryRemote {
        async fn retrieve(
            &self,
            manifest: &RetrievalManifest,
            target_dir: &Path,
            _wait: Duration,
        ) -> std::result::Result<RetrievalResult, GatewayError> {
            if manifest.is_empty() {
                return Ok(RetrievalResult::empty());
            }
            let members = manifest_members(manifest).await?;
            let wrapper_name = format!("{}/package.xml", DEFAULT_PACKAGE);

            let (failure, snapshot) = {
                let mut state = self.state.write().await;
                state.calls.push(RetrieveCall {
                    target_dir: target_dir.to_path_buf(),
                    members: members.clone(),
                });
                let failure = members.iter().find_map(|k| state.failures.get(k).cloned());
                let snapshot: Vec<(MemberKey, Option<RemoteMember>)> = members
                    .iter()
                    .map(|k| (k.clone(), state.members.get(k).cloned()))
                    .collect();
                (failure, snapshot)
            };

            let mut messages = Vec::new();
            match failure {
                Some(InjectedFailure::Hang) => return std::future::pending().await,
                Some(InjectedFailure::Reject { status, problem }) => {
                    let result = RetrievalResult::failed(
                        status,
                        vec![RetrieveMessage::new(wrapper_name, problem.clone())],
                    );
                    return Err(GatewayError::with_result(problem, result));
                }
                Some(InjectedFailure::Warn(problem)) => {
                    messages.push(RetrieveMessage::new(wrapper_name.clone(), problem));
                }
                None => {}
            }

            let root = target_dir.join(DEFAULT_PACKAGE);
            let mut file_properties = Vec::new();
            for (key, member) in snapshot {
                let Some(member) = member.filter(|m| !m.deleted) else {
                    messages.push(RetrieveMessage::new(
                        wrapper_name.clone(),
                        format!(
                            "Entity of type '{}' named '{}' cannot be found",
                            key.member_type, key.full_name
                        ),
                    ));
                    continue;
                };
                for (relative, content) in &member.files {
                    write_file(&root, relative, content)
                        .await
                        .map_err(|e| GatewayError::new(format!("writing {}: {}", relative, e)))?;
                    file_properties.push(FileProperty::new(
                        key.member_type.clone(),
                        key.full_name.clone(),
                        format!("{}/{}", DEFAULT_PACKAGE, relative),
                    ));
                }
            }

            let document = ManifestDocument::from_members(self.api_version.clone(), &members);
            let wrapper = document
                .to_json()
                .map_err(|e| GatewayError::new(e.to_string()))?;
            write_file(&root, "package.xml", &wrapper)
                .await
                .map_err(|e| GatewayError::new(format!("writing wrapper: {}", e)))?;
            file_properties.push(FileProperty::new(
                MANIFEST_WRAPPER_TYPE,
                DEFAULT_PACKAGE,
                wrapper_name,
            ));

            {
                let mut state = self.state.write().await;
                let touched: Vec<MemberKey> = state
                    .touch_on_retrieve
                    .iter()
                    .filter(|k| members.contains(k))
                    .cloned()
                    .collect();
                state.touch_on_retrieve.retain(|k| !members.contains(k));
                for key in touched {
                    let revision = state.bump();
                    if let Some(m) = state.members.get_mut(&key) {
                        m.revision = revision;
                    }
                }
            }

            let mut result = RetrievalResult::succeeded(file_properties);
            result.messages = messages;
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{InjectedFailure, MemoryRemote};
    use super::*;
    use tracksync_core::{
        ManifestDocument, MemberKey, RetrieveStatus, DEFAULT_PACKAGE, MANIFEST_FILE_NAME,
    };

    fn built(keys: &[MemberKey], dir: &Path) -> RetrievalManifest {
        RetrievalManifest::Built {
            path: dir.join(MANIFEST_FILE_NAME),
            document: ManifestDocument::from_members(DEFAULT_API_VERSION, keys),
        }
    }

    #[tokio::test]
    async fn test_query_reports_revisions_and_deletions() {
        let remote = MemoryRemote::new();
        let foo = MemberKey::new("ApexClass", "Foo");
        let bar = MemberKey::new("ApexClass", "Bar");
        remote.put(foo.clone(), &[("classes/Foo.cls", "a")]).await;
        remote.put(bar.clone(), &[("classes/Bar.cls", "b")]).await;
        let deleted_at = remote.delete(&bar).await.unwrap();

        let revisions = remote.query_revisions().await.unwrap();
        assert_eq!(revisions.len(), 2);
        let bar_rev = revisions.iter().find(|r| r.key == bar).unwrap();
        assert!(bar_rev.is_deleted);
        assert_eq!(bar_rev.revision, deleted_at);
        assert!(remote.delete(&bar).await.is_none());
    }

    #[tokio::test]
    async fn test_retrieve_writes_files_and_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemote::new();
        let foo = MemberKey::new("ApexClass", "Foo");
        remote
            .put(
                foo.clone(),
                &[("classes/Foo.cls", "class Foo {}"), ("classes/Foo.cls-meta.xml", "<m/>")],
            )
            .await;

        let manifest = built(&[foo.clone()], dir.path());
        let result = remote
            .retrieve(&manifest, dir.path(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(result.is_succeeded());
        assert_eq!(result.file_properties.len(), 3);
        assert!(result.file_properties.iter().any(|fp| fp.is_manifest_wrapper()));
        let written = dir.path().join(DEFAULT_PACKAGE).join("classes").join("Foo.cls");
        assert_eq!(std::fs::read(written).unwrap(), b"class Foo {}");
        assert_eq!(remote.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_missing_member_is_partial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemote::new();
        let manifest = built(&[MemberKey::new("ApexClass", "Ghost")], dir.path());

        let result = remote
            .retrieve(&manifest, dir.path(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.messages.len(), 1);
        assert!(!result.is_succeeded());
    }

    #[tokio::test]
    async fn test_retrieve_reads_provided_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemote::new();
        let foo = MemberKey::new("ApexClass", "Foo");
        remote.put(foo.clone(), &[("classes/Foo.cls", "x")]).await;

        let path = dir.path().join("custom.json");
        let doc = ManifestDocument::from_members("58.0", &[foo.clone()]);
        std::fs::write(&path, doc.to_json().unwrap()).unwrap();

        let result = remote
            .retrieve(&RetrievalManifest::Provided { path }, dir.path(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.is_succeeded());
        assert_eq!(remote.calls().await[0].members, vec![foo]);
    }

    #[tokio::test]
    async fn test_rejection_carries_result() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MemoryRemote::new();
        let foo = MemberKey::new("ApexClass", "Foo");
        remote.put(foo.clone(), &[("classes/Foo.cls", "x")]).await;
        remote
            .fail(
                foo.clone(),
                InjectedFailure::Reject {
                    status: RetrieveStatus::Failed,
                    problem: "INVALID_SESSION_ID".into(),
                },
            )
            .await;

        let err = remote
            .retrieve(&built(&[foo], dir.path()), dir.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        let result = err.result.unwrap();
        assert_eq!(result.status, RetrieveStatus::Failed);
        assert_eq!(result.messages[0].problem, "INVALID_SESSION_ID");
    }

    #[tokio::test]
    async fn test_disabled_tracking_is_unsupported() {
        let remote = MemoryRemote::new();
        remote.disable_tracking().await;
        assert!(matches!(
            remote.query_revisions().await,
            Err(crate::SyncError::UnsupportedEnvironment(_))
        ));
    }
}
