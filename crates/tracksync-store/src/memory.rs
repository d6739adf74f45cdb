//! In-memory implementation of the RevisionStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use tracksync_core::{EnvironmentId, MemberKey, TrackedMember};

use crate::error::Result;
use crate::traits::RevisionStore;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<HashMap<EnvironmentId, EnvironmentState>>,
}

#[derive(Default)]
struct EnvironmentState {
    members: BTreeMap<MemberKey, TrackedMember>,
    server_max_revision: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevisionStore for MemoryStore {
    async fn get_member(
        &self,
        env: &EnvironmentId,
        key: &MemberKey,
    ) -> Result<Option<TrackedMember>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.get(env).and_then(|s| s.members.get(key).cloned()))
    }

    async fn list_members(&self, env: &EnvironmentId) -> Result<Vec<TrackedMember>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .get(env)
            .map(|s| s.members.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_members(&self, env: &EnvironmentId, members: &[TrackedMember]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let state = inner.entry(env.clone()).or_default();
        for member in members {
            state.members.insert(member.key.clone(), member.clone());
        }
        Ok(())
    }

    async fn remove_members(&self, env: &EnvironmentId, keys: &[MemberKey]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(state) = inner.get_mut(env) {
            for key in keys {
                state.members.remove(key);
            }
        }
        Ok(())
    }

    async fn server_max_revision(&self, env: &EnvironmentId) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.get(env).map(|s| s.server_max_revision).unwrap_or(0))
    }

    async fn replace_all(
        &self,
        env: &EnvironmentId,
        members: &[TrackedMember],
        server_max_revision: u64,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.insert(
            env.clone(),
            EnvironmentState {
                members: members.iter().map(|m| (m.key.clone(), m.clone())).collect(),
                server_max_revision,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use std::collections::HashSet;
    use tracksync_core::{ObsoleteName, RemoteRevision};

    fn key(name: &str) -> MemberKey {
        MemberKey::new("ApexClass", name)
    }

    fn env() -> EnvironmentId {
        EnvironmentId::new("dev").unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        store
            .upsert_members(&env(), &[TrackedMember::retrieved(key("Foo"), 3)])
            .await
            .unwrap();

        let got = store.get_member(&env(), &key("Foo")).await.unwrap().unwrap();
        assert_eq!(got.local_revision, Some(3));

        // Environments are isolated.
        let other = EnvironmentId::new("other").unwrap();
        assert!(store.get_member(&other, &key("Foo")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_diff_new_changed_unchanged_obsolete() {
        let store = MemoryStore::new();
        store
            .upsert_members(
                &env(),
                &[
                    TrackedMember::retrieved(key("Changed"), 3),
                    TrackedMember::retrieved(key("Same"), 2),
                    TrackedMember::retrieved(key("Gone"), 1),
                    TrackedMember::retrieved(key("Deleted"), 1),
                ],
            )
            .await
            .unwrap();

        let remote = vec![
            RemoteRevision::new(key("Changed"), 5),
            RemoteRevision::new(key("Same"), 2),
            RemoteRevision::new(key("New"), 7),
            RemoteRevision::deleted(key("Deleted"), 8),
        ];
        let diff = store.diff(&env(), &remote).await.unwrap();

        let keys: Vec<_> = diff.to_retrieve.iter().map(|m| m.key.full_name.as_str()).collect();
        assert_eq!(keys, vec!["Changed", "New"]);
        assert_eq!(diff.to_retrieve[0].local_revision, Some(3));
        assert_eq!(diff.to_retrieve[0].last_known_remote_revision, 5);
        assert_eq!(
            diff.obsolete,
            vec![ObsoleteName::new("ApexClass", "Deleted"), ObsoleteName::new("ApexClass", "Gone")]
        );
    }

    #[tokio::test]
    async fn test_observe_does_not_move_checkpoint() {
        let store = MemoryStore::new();
        store
            .upsert_members(&env(), &[TrackedMember::retrieved(key("Foo"), 3)])
            .await
            .unwrap();

        store
            .observe_remote(
                &env(),
                &[
                    RemoteRevision::new(key("Foo"), 9),
                    RemoteRevision::new(key("Bar"), 1),
                ],
            )
            .await
            .unwrap();

        let foo = store.get_member(&env(), &key("Foo")).await.unwrap().unwrap();
        assert_eq!(foo.local_revision, Some(3));
        assert_eq!(foo.last_known_remote_revision, 9);

        let bar = store.get_member(&env(), &key("Bar")).await.unwrap().unwrap();
        assert!(!bar.is_checkpointed());

        // Still needs retrieval: the checkpoint did not move.
        let diff = store.diff(&env(), &[RemoteRevision::new(key("Foo"), 9)]).await.unwrap();
        assert_eq!(diff.to_retrieve.len(), 1);
    }

    #[tokio::test]
    async fn test_update_checkpoint_and_delete() {
        let store = MemoryStore::new();
        store
            .upsert_members(&env(), &[TrackedMember::retrieved(key("Old"), 1)])
            .await
            .unwrap();

        store
            .update_checkpoint(&env(), &[(key("Foo"), 4)], &[key("Old")])
            .await
            .unwrap();

        let members = store.list_members(&env()).await.unwrap();
        assert_eq!(members, vec![TrackedMember::retrieved(key("Foo"), 4)]);
    }

    #[tokio::test]
    async fn test_full_query_rebuild_retains_failed() {
        let store = MemoryStore::new();
        store
            .upsert_members(
                &env(),
                &[
                    TrackedMember::retrieved(key("Applied"), 1),
                    TrackedMember::retrieved(key("Failed"), 2),
                    TrackedMember::retrieved(key("Vanished"), 3),
                ],
            )
            .await
            .unwrap();

        let remote = vec![
            RemoteRevision::new(key("Applied"), 5),
            RemoteRevision::new(key("Failed"), 6),
        ];
        let retain: HashSet<MemberKey> = [key("Failed")].into_iter().collect();
        let summary = store
            .set_checkpoint_from_full_query(&env(), &remote, &retain)
            .await
            .unwrap();

        assert_eq!(summary.checkpointed, 1);
        assert_eq!(summary.retained, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.server_max_revision, 6);
        assert_eq!(store.server_max_revision(&env()).await.unwrap(), 6);

        let failed = store.get_member(&env(), &key("Failed")).await.unwrap().unwrap();
        assert_eq!(failed.local_revision, Some(2));
        assert_eq!(failed.last_known_remote_revision, 6);

        // The failed member is still pending retrieval.
        let diff = store.diff(&env(), &remote).await.unwrap();
        assert_eq!(diff.to_retrieve.len(), 1);
        assert_eq!(diff.to_retrieve[0].key, key("Failed"));
    }

    proptest::proptest! {
        #[test]
        fn applying_the_diff_empties_it(
            revisions in proptest::collection::btree_map("[A-Z][a-z]{1,6}", 1u64..100, 0..12),
            checkpointed in proptest::collection::vec(proptest::bool::ANY, 12),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let store = MemoryStore::new();
                let seeded: Vec<TrackedMember> = revisions
                    .iter()
                    .zip(&checkpointed)
                    .filter(|(_, c)| **c)
                    .map(|((name, rev), _)| TrackedMember::retrieved(key(name), rev / 2))
                    .collect();
                store.upsert_members(&env(), &seeded).await.unwrap();

                let remote: Vec<RemoteRevision> = revisions
                    .iter()
                    .map(|(name, rev)| RemoteRevision::new(key(name), *rev))
                    .collect();
                let diff = store.diff(&env(), &remote).await.unwrap();
                let applied: Vec<(MemberKey, u64)> = diff
                    .to_retrieve
                    .iter()
                    .map(|m| (m.key.clone(), m.last_known_remote_revision))
                    .collect();
                store.update_checkpoint(&env(), &applied, &[]).await.unwrap();

                assert!(store.diff(&env(), &remote).await.unwrap().is_empty());
            });
        }
    }
}
