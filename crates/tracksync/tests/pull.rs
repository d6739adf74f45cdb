//! End-to-end pulls against the in-memory remote and workspace.

use std::time::Duration;

use proptest::prelude::*;
use tracksync::core::{ElementState, ManifestDocument, RetrieveStatus, DEFAULT_PACKAGE};
use tracksync::store::MemoryStore;
use tracksync::sync::workspace::fs::{INDEX_FILE, STATE_DIR};
use tracksync::sync::{FsWorkspace, InjectedFailure, MemoryRemote, MemoryWorkspace, WorkspaceStore};
use tracksync::{
    ConflictEntry, MemberKey, PackageFailure, PackageOutcome, PullConfig, PullError,
    PullErrorKind, PullSession, Retrieval,
};
use tracksync_testkit::{remote_members, FailingWorkspace, PullFixture, ScriptedStatus};

type Session<W> = PullSession<MemoryStore, MemoryRemote, MemoryRemote, W>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config<W: WorkspaceStore + 'static>(fixture: &PullFixture<W>) -> PullConfig {
    PullConfig::new(fixture.env.clone()).with_scratch_root(fixture.scratch_root())
}

fn session<W: WorkspaceStore + 'static>(
    fixture: &PullFixture<W>,
    config: PullConfig,
) -> Session<W> {
    PullSession::new(
        fixture.store.clone(),
        fixture.remote.clone(),
        fixture.remote.clone(),
        fixture.workspace.clone(),
        fixture.status(),
        config,
    )
}

fn foo() -> MemberKey {
    MemberKey::new("ApexClass", "Foo")
}

fn bar() -> MemberKey {
    MemberKey::new("ApexClass", "Bar")
}

fn widget() -> MemberKey {
    MemberKey::new("ApexClass", "acme__Widget")
}

async fn read(fixture: &PullFixture, path: &str) -> Option<String> {
    fixture
        .workspace
        .read(path)
        .await
        .map(|b| String::from_utf8_lossy(&b).into_owned())
}

#[tokio::test]
async fn test_first_pull_writes_and_checkpoints() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    let foo_rev = fixture
        .remote
        .put(foo(), &[("classes/Foo.cls", "class Foo {}")])
        .await;
    let bar_rev = fixture
        .remote
        .put(bar(), &[("classes/Bar.cls", "class Bar {}")])
        .await;

    let report = session(&fixture, config(&fixture)).pull().await?;

    assert_eq!(report.packages.len(), 1);
    let package = report.package(DEFAULT_PACKAGE).unwrap();
    assert_eq!(package.members, 2);
    assert!(matches!(
        package.outcome,
        PackageOutcome::Applied {
            retrieval: Retrieval::Performed,
            ..
        }
    ));
    assert_eq!(report.inbound_files.len(), 2);
    assert!(report
        .inbound_files
        .iter()
        .all(|f| f.state == ElementState::New));

    assert_eq!(
        read(&fixture, "unpackaged/classes/Foo.cls").await.as_deref(),
        Some("class Foo {}")
    );
    assert_eq!(fixture.checkpoint(&foo()).await, Some(foo_rev));
    assert_eq!(fixture.checkpoint(&bar()).await, Some(bar_rev));
    assert_eq!(report.checkpoint.checkpointed, 2);
    assert_eq!(fixture.scratch_entries(), 0);
    Ok(())
}

#[tokio::test]
async fn test_second_pull_is_up_to_date() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;

    let session = session(&fixture, config(&fixture));
    session.pull().await?;
    let writes = fixture.workspace.write_count().await;

    let report = session.pull().await?;
    assert!(report.is_up_to_date());
    assert!(report.inbound_files.is_empty());
    assert_eq!(fixture.workspace.write_count().await, writes);
    assert_eq!(fixture.remote.calls().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_remote_edit_is_pulled() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "v1")]).await;
    let session = session(&fixture, config(&fixture));
    session.pull().await?;

    let rev = fixture.remote.put(foo(), &[("classes/Foo.cls", "v2")]).await;
    let report = session.pull().await?;

    assert_eq!(report.inbound_files.len(), 1);
    assert_eq!(report.inbound_files[0].state, ElementState::Changed);
    assert_eq!(read(&fixture, "unpackaged/classes/Foo.cls").await.as_deref(), Some("v2"));
    assert_eq!(fixture.checkpoint(&foo()).await, Some(rev));
    Ok(())
}

#[tokio::test]
async fn test_conflict_aborts_before_retrieve() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    let first = fixture.remote.put(foo(), &[("classes/Foo.cls", "v1")]).await;
    let session = session(&fixture, config(&fixture));
    session.pull().await?;

    let second = fixture.remote.put(foo(), &[("classes/Foo.cls", "v2")]).await;
    fixture
        .workspace
        .edit(DEFAULT_PACKAGE, "classes/Foo.cls", "local edit")
        .await;

    let err = session.pull().await.unwrap_err();
    assert_eq!(err.kind(), PullErrorKind::SourceConflict);
    assert_eq!(
        err.conflicts(),
        &[ConflictEntry {
            member: foo(),
            local_revision: first,
            remote_revision: second,
        }]
    );

    assert_eq!(fixture.remote.calls().await.len(), 1);
    assert_eq!(fixture.checkpoint(&foo()).await, Some(first));
    assert_eq!(
        read(&fixture, "unpackaged/classes/Foo.cls").await.as_deref(),
        Some("local edit")
    );
    Ok(())
}

#[tokio::test]
async fn test_force_overwrite_skips_conflict_check() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "v1")]).await;
    session(&fixture, config(&fixture)).pull().await?;

    let second = fixture.remote.put(foo(), &[("classes/Foo.cls", "v2")]).await;
    fixture
        .workspace
        .edit(DEFAULT_PACKAGE, "classes/Foo.cls", "local edit")
        .await;

    session(&fixture, config(&fixture).with_force_overwrite(true))
        .pull()
        .await?;
    assert_eq!(read(&fixture, "unpackaged/classes/Foo.cls").await.as_deref(), Some("v2"));
    assert_eq!(fixture.checkpoint(&foo()).await, Some(second));
    Ok(())
}

#[tokio::test]
async fn test_local_only_edit_is_not_a_conflict() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "v1")]).await;
    fixture.remote.put(bar(), &[("classes/Bar.cls", "b1")]).await;
    let session = session(&fixture, config(&fixture));
    session.pull().await?;

    fixture
        .workspace
        .edit(DEFAULT_PACKAGE, "classes/Foo.cls", "local edit")
        .await;
    fixture.remote.put(bar(), &[("classes/Bar.cls", "b2")]).await;

    let report = session.pull().await?;
    assert_eq!(report.inbound_files.len(), 1);
    assert_eq!(report.inbound_files[0].full_name, "Bar");
    assert_eq!(
        read(&fixture, "unpackaged/classes/Foo.cls").await.as_deref(),
        Some("local edit")
    );
    Ok(())
}

#[tokio::test]
async fn test_local_add_colliding_with_remote_add_is_a_conflict() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    let foo_rev = fixture.remote.put(foo(), &[("classes/Foo.cls", "theirs")]).await;
    let bar_rev = fixture.remote.put(bar(), &[("classes/Bar.cls", "b")]).await;
    fixture
        .workspace
        .edit(DEFAULT_PACKAGE, "classes/Foo.cls", "mine")
        .await;

    let err = session(&fixture, config(&fixture)).pull().await.unwrap_err();
    assert_eq!(err.kind(), PullErrorKind::SourceConflict);
    assert_eq!(
        err.conflicts(),
        &[ConflictEntry {
            member: foo(),
            local_revision: 0,
            remote_revision: foo_rev,
        }]
    );
    assert!(fixture.remote.calls().await.is_empty());
    assert_eq!(
        read(&fixture, "unpackaged/classes/Foo.cls").await.as_deref(),
        Some("mine")
    );

    session(&fixture, config(&fixture).with_force_overwrite(true))
        .pull()
        .await?;
    assert_eq!(
        read(&fixture, "unpackaged/classes/Foo.cls").await.as_deref(),
        Some("theirs")
    );
    assert_eq!(fixture.checkpoint(&foo()).await, Some(foo_rev));
    assert_eq!(fixture.checkpoint(&bar()).await, Some(bar_rev));
    Ok(())
}

#[tokio::test]
async fn test_failed_index_write_is_not_reported_as_local_edit() -> anyhow::Result<()> {
    init_tracing();
    let project = tempfile::tempdir()?;
    let fixture = PullFixture::with_workspace(FsWorkspace::open(project.path()).await?);
    fixture.remote.put(foo(), &[("classes/Foo.cls", "v1")]).await;
    let session = session(&fixture, config(&fixture));
    session.pull().await?;

    fixture.remote.put(foo(), &[("classes/Foo.cls", "v2")]).await;
    let blocker = project
        .path()
        .join(STATE_DIR)
        .join(format!("{}.tracksync-tmp", INDEX_FILE));
    std::fs::create_dir(&blocker)?;
    let err = session.pull().await.unwrap_err();
    assert_eq!(err.kind(), PullErrorKind::ApplyFailed);

    std::fs::remove_dir(&blocker)?;
    let rev = fixture.remote.put(foo(), &[("classes/Foo.cls", "v3")]).await;
    session.pull().await?;

    let local = project.path().join(DEFAULT_PACKAGE).join("classes").join("Foo.cls");
    assert_eq!(std::fs::read_to_string(local)?, "v3");
    assert_eq!(fixture.checkpoint(&foo()).await, Some(rev));
    Ok(())
}

#[tokio::test]
async fn test_remote_deletion_is_applied_without_retrieve() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    fixture.remote.put(bar(), &[("classes/Bar.cls", "b")]).await;
    let session = session(&fixture, config(&fixture));
    session.pull().await?;

    fixture.remote.delete(&foo()).await.unwrap();
    let report = session.pull().await?;

    let package = report.package(DEFAULT_PACKAGE).unwrap();
    assert_eq!(package.members, 0);
    assert_eq!(package.obsolete, 1);
    assert!(matches!(
        package.outcome,
        PackageOutcome::Applied {
            retrieval: Retrieval::Synthesized,
            ..
        }
    ));
    assert_eq!(report.inbound_files.len(), 1);
    assert_eq!(report.inbound_files[0].state, ElementState::Deleted);

    assert_eq!(read(&fixture, "unpackaged/classes/Foo.cls").await, None);
    assert!(read(&fixture, "unpackaged/classes/Bar.cls").await.is_some());
    assert_eq!(fixture.remote.calls().await.len(), 1);
    assert_eq!(fixture.checkpoint(&foo()).await, None);
    assert_eq!(fixture.scratch_entries(), 0);
    Ok(())
}

#[tokio::test]
async fn test_hung_package_fails_others_still_apply() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    let foo_rev = fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    fixture.remote.put(bar(), &[("classes/Bar.cls", "b")]).await;
    fixture
        .remote
        .put(widget(), &[("classes/acme__Widget.cls", "w")])
        .await;
    fixture.remote.fail(widget(), InjectedFailure::Hang).await;

    let config = config(&fixture).with_wait(Duration::from_millis(200));
    let err = session(&fixture, config.clone()).pull().await.unwrap_err();

    let PullError::RetrieveFailed {
        package,
        status,
        report,
        ..
    } = &err
    else {
        panic!("expected RetrieveFailed, got {err:?}");
    };
    assert_eq!(package, "acme");
    assert_eq!(*status, RetrieveStatus::InProgress);
    assert_eq!(report.packages.len(), 2);
    assert_eq!(report.inbound_files.len(), 2);
    assert!(report.package("acme").unwrap().is_failed());

    assert!(read(&fixture, "unpackaged/classes/Foo.cls").await.is_some());
    assert_eq!(read(&fixture, "acme/classes/acme__Widget.cls").await, None);
    assert_eq!(fixture.checkpoint(&foo()).await, Some(foo_rev));
    assert_eq!(fixture.checkpoint(&widget()).await, None);
    assert_eq!(fixture.scratch_entries(), 0);

    fixture.remote.clear_failures().await;
    let report = session(&fixture, config).pull().await?;
    assert_eq!(report.packages.len(), 1);
    assert_eq!(report.inbound_files.len(), 1);
    let calls = fixture.remote.calls().await;
    assert_eq!(calls.last().unwrap().members, vec![widget()]);
    assert!(read(&fixture, "acme/classes/acme__Widget.cls").await.is_some());
    Ok(())
}

#[tokio::test]
async fn test_rejected_retrieve_surfaces_status_and_messages() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    fixture
        .remote
        .fail(
            foo(),
            InjectedFailure::Reject {
                status: RetrieveStatus::Failed,
                problem: "INVALID_CROSS_REFERENCE_KEY".into(),
            },
        )
        .await;

    let err = session(&fixture, config(&fixture)).pull().await.unwrap_err();
    let PullError::RetrieveFailed {
        status, messages, ..
    } = &err
    else {
        panic!("expected RetrieveFailed, got {err:?}");
    };
    assert_eq!(*status, RetrieveStatus::Failed);
    assert!(messages
        .iter()
        .any(|m| m.problem.contains("INVALID_CROSS_REFERENCE_KEY")));
    assert_eq!(fixture.checkpoint(&foo()).await, None);
    assert_eq!(fixture.scratch_entries(), 0);
    for call in fixture.remote.calls().await {
        assert!(!call.target_dir.exists());
    }
    Ok(())
}

#[tokio::test]
async fn test_stop_on_first_failure_skips_remaining_packages() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    fixture
        .remote
        .put(widget(), &[("classes/acme__Widget.cls", "w")])
        .await;
    fixture
        .remote
        .fail(
            foo(),
            InjectedFailure::Reject {
                status: RetrieveStatus::Failed,
                problem: "boom".into(),
            },
        )
        .await;

    let config = config(&fixture).with_stop_on_first_failure(true);
    let err = session(&fixture, config).pull().await.unwrap_err();

    let report = err.report().unwrap();
    assert!(report.package(DEFAULT_PACKAGE).unwrap().is_failed());
    assert_eq!(
        report.package("acme").unwrap().outcome,
        PackageOutcome::Skipped
    );
    assert_eq!(fixture.remote.calls().await.len(), 1);
    assert_eq!(fixture.checkpoint(&widget()).await, None);
    Ok(())
}

#[tokio::test]
async fn test_apply_failure_keeps_members_eligible() -> anyhow::Result<()> {
    init_tracing();
    let fixture =
        PullFixture::with_workspace(FailingWorkspace::new(MemoryWorkspace::new(), ["acme"]));
    let foo_rev = fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    fixture
        .remote
        .put(widget(), &[("classes/acme__Widget.cls", "w")])
        .await;

    let err = session(&fixture, config(&fixture)).pull().await.unwrap_err();
    let PullError::ApplyFailed {
        package, message, ..
    } = &err
    else {
        panic!("expected ApplyFailed, got {err:?}");
    };
    assert_eq!(package, "acme");
    assert!(message.contains("injected commit failure"));

    let report = err.report().unwrap();
    assert!(matches!(
        report.package("acme").unwrap().outcome,
        PackageOutcome::Failed(PackageFailure::Apply { .. })
    ));
    assert_eq!(fixture.checkpoint(&foo()).await, Some(foo_rev));
    assert_eq!(fixture.checkpoint(&widget()).await, None);
    assert!(fixture
        .workspace
        .inner()
        .read("unpackaged/classes/Foo.cls")
        .await
        .is_some());
    assert_eq!(fixture.scratch_entries(), 0);
    for call in fixture.remote.calls().await {
        assert!(!call.target_dir.exists());
    }
    Ok(())
}

#[tokio::test]
async fn test_unsupported_environment() {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    fixture.remote.disable_tracking().await;

    let err = session(&fixture, config(&fixture)).pull().await.unwrap_err();
    assert_eq!(err.kind(), PullErrorKind::UnsupportedEnvironment);

    let err = session(&fixture, config(&fixture).with_force_overwrite(true))
        .pull()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), PullErrorKind::UnsupportedEnvironment);
    assert!(fixture.remote.calls().await.is_empty());
}

#[tokio::test]
async fn test_unsupported_status_service() {
    init_tracing();
    let fixture = PullFixture::new();
    let session = PullSession::new(
        fixture.store.clone(),
        fixture.remote.clone(),
        fixture.remote.clone(),
        fixture.workspace.clone(),
        std::sync::Arc::new(ScriptedStatus::unsupported()),
        config(&fixture),
    );

    let err = session.pull().await.unwrap_err();
    assert!(matches!(err, PullError::UnsupportedEnvironment(_)));
}

#[tokio::test]
async fn test_composite_bundle_is_one_element() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    let bundle = MemberKey::new("AuraDefinitionBundle", "root");
    fixture
        .remote
        .put(
            bundle.clone(),
            &[
                ("aura/root/root.cmp", "<aura:component/>"),
                ("aura/root/rootController.js", "({})"),
            ],
        )
        .await;

    let report = session(&fixture, config(&fixture)).pull().await?;

    assert_eq!(report.inbound_files.len(), 2);
    assert!(report
        .inbound_files
        .iter()
        .all(|f| f.full_name == "root" && f.member_type == "AuraDefinitionBundle"));
    let index = fixture.workspace.index().await;
    assert_eq!(index.len(), 1);
    assert_eq!(index.get(&bundle).unwrap().files.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_manifest_override_limits_retrieval() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    let bar_rev = fixture.remote.put(bar(), &[("classes/Bar.cls", "b")]).await;

    let dir = tempfile::tempdir()?;
    let manifest = dir.path().join("override.json");
    std::fs::write(&manifest, ManifestDocument::from_members("60.0", &[bar()]).to_json()?)?;

    let report = session(&fixture, config(&fixture).with_manifest_override(&manifest))
        .pull()
        .await?;

    assert_eq!(report.inbound_files.len(), 1);
    assert_eq!(fixture.checkpoint(&bar()).await, Some(bar_rev));
    assert_eq!(fixture.checkpoint(&foo()).await, None);
    assert_eq!(read(&fixture, "unpackaged/classes/Foo.cls").await, None);
    Ok(())
}

#[tokio::test]
async fn test_remote_change_during_pull_is_checkpointed_at_newer_revision() -> anyhow::Result<()> {
    init_tracing();
    let fixture = PullFixture::new();
    let retrieved = fixture.remote.put(foo(), &[("classes/Foo.cls", "a")]).await;
    fixture.remote.touch_on_retrieve(foo()).await;

    let session = session(&fixture, config(&fixture));
    session.pull().await?;

    let current = fixture.remote.revision_of(&foo()).await.unwrap();
    assert!(current > retrieved);
    assert_eq!(fixture.checkpoint(&foo()).await, Some(current));
    assert!(session.pull().await?.is_up_to_date());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn pull_converges(members in remote_members(8)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let fixture = PullFixture::new();
            for m in &members {
                fixture.remote.put(m.key.clone(), &[(m.path.as_str(), m.content.as_str())]).await;
            }

            let session = session(&fixture, config(&fixture));
            let report = session.pull().await.unwrap();
            assert_eq!(report.inbound_files.len(), members.len());

            for m in &members {
                let revision = fixture.remote.revision_of(&m.key).await;
                assert_eq!(fixture.checkpoint(&m.key).await, revision);
                let package = m.key.namespace().unwrap_or(DEFAULT_PACKAGE);
                let content = fixture
                    .workspace
                    .read(format!("{}/{}", package, m.path))
                    .await
                    .unwrap();
                assert_eq!(&content[..], m.content.as_bytes());
            }

            assert!(session.pull().await.unwrap().is_up_to_date());
            assert_eq!(fixture.scratch_entries(), 0);
        });
    }
}
