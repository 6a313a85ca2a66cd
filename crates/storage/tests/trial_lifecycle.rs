#![forbid(unsafe_code)]

use rg_core::ids::TestcaseKey;
use rg_core::model::{Bucket, TestcaseStatus, TrialStatus};
use rg_storage::{
    OutboxAction, ProjectCreateRequest, SqliteStore, StoreError, TestcaseCreateRequest,
    TestcaseRow, TestcaseUpdateRequest, TrialCreateRequest, TrialRow, TrialStatusRequest,
    VersionCreateRequest, VersionRow,
};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("rg_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

struct Fixture {
    store: SqliteStore,
    version: VersionRow,
    t1: TestcaseRow,
}

fn setup(test_name: &str) -> Fixture {
    let mut store = SqliteStore::open(temp_dir(test_name)).expect("open store");
    let project = store
        .project_create(ProjectCreateRequest {
            name: "P1".to_string(),
            url: format!("https://git.example.test/{test_name}.git"),
        })
        .expect("create project");
    let version = store
        .version_create(VersionCreateRequest {
            project_id: project.id,
            name: "v1".to_string(),
        })
        .expect("create version")
        .version;
    let t1 = store
        .testcase_create(TestcaseCreateRequest {
            project_id: project.id,
            key: TestcaseKey::try_new("t1").expect("key"),
            command: "stub_a/run.sh --case t1".to_string(),
            timeout: Some(600),
            group_id: None,
            owner: Some("dev@example.test".to_string()),
        })
        .expect("create testcase");
    Fixture { store, version, t1 }
}

fn create_trial(fixture: &mut Fixture, status: TrialStatus) -> TrialRow {
    fixture
        .store
        .trial_create(TrialCreateRequest {
            testcase_id: fixture.t1.id,
            version_id: fixture.version.id,
            directory: "/builds/42".to_string(),
            backup: None,
            build_number: Some(42),
            workspace_id: None,
            status,
        })
        .expect("create trial")
        .trial
}

fn set(fixture: &mut Fixture, trial_id: i64, status: TrialStatus) -> rg_storage::TrialWriteResult {
    fixture
        .store
        .trial_set_status(TrialStatusRequest { id: trial_id, status })
        .expect("set trial status")
}

#[test]
fn first_trial_becomes_recent_regardless_of_status() {
    let mut fixture = setup("first_trial_becomes_recent_regardless_of_status");
    let trial = create_trial(&mut fixture, TrialStatus::Compiling);
    assert_eq!(trial.status, TrialStatus::Compiling);

    let t1 = fixture.store.testcase_get(fixture.t1.id).expect("get t1");
    assert_eq!(t1.recent, Some(trial.id));
    assert_eq!(t1.status, TestcaseStatus::Candidate);
    assert!(fixture.store.outbox_pending(10).expect("outbox").is_empty());
}

#[test]
fn pending_transition_dispatches_exactly_once() {
    let mut fixture = setup("pending_transition_dispatches_exactly_once");
    let trial = create_trial(&mut fixture, TrialStatus::Compiling);

    let first = set(&mut fixture, trial.id, TrialStatus::Pending);
    assert!(first.changed);
    assert_eq!(first.notifications.len(), 1);
    let dispatch = &first.notifications[0];
    assert_eq!(dispatch.action, OutboxAction::Add);
    assert_eq!(dispatch.trial_id, trial.id);
    assert_eq!(dispatch.owner.as_deref(), Some("dev@example.test"));
    assert_eq!(dispatch.command, "stub_a/run.sh --case t1");
    assert_eq!(dispatch.build_number, Some(42));

    let again = set(&mut fixture, trial.id, TrialStatus::Pending);
    assert!(!again.changed);
    assert!(again.notifications.is_empty());

    let pending = fixture.store.outbox_pending(10).expect("outbox");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].seq, dispatch.seq);
}

#[test]
fn passed_trial_propagates_and_moves_snapshot_bucket() {
    let mut fixture = setup("passed_trial_propagates_and_moves_snapshot_bucket");
    let trial = create_trial(&mut fixture, TrialStatus::Compiling);
    set(&mut fixture, trial.id, TrialStatus::Pending);
    set(&mut fixture, trial.id, TrialStatus::Running);

    let before = fixture.store.snapshot_live(fixture.version.id).expect("live");
    assert_eq!(before.buckets_of(fixture.t1.id), vec![Bucket::Unverified]);

    let done = set(&mut fixture, trial.id, TrialStatus::Passed);
    assert_eq!(done.testcase.status, TestcaseStatus::Passed);
    assert_eq!(done.notifications.len(), 1);
    assert_eq!(done.notifications[0].action, OutboxAction::Complete);

    let after = fixture.store.snapshot_live(fixture.version.id).expect("live");
    assert_eq!(after.snapshot.id, before.snapshot.id);
    assert_eq!(after.buckets_of(fixture.t1.id), vec![Bucket::Passed]);
    assert!(after.unverified.is_empty());

    let actions: Vec<OutboxAction> = fixture
        .store
        .outbox_pending(10)
        .expect("outbox")
        .into_iter()
        .map(|row| row.action)
        .collect();
    assert_eq!(actions, vec![OutboxAction::Add, OutboxAction::Complete]);
}

#[test]
fn failed_trial_marks_testcase_failed() {
    let mut fixture = setup("failed_trial_marks_testcase_failed");
    let trial = create_trial(&mut fixture, TrialStatus::Pending);
    let done = set(&mut fixture, trial.id, TrialStatus::Failed);
    assert_eq!(done.testcase.status, TestcaseStatus::Failed);
    let live = fixture.store.snapshot_live(fixture.version.id).expect("live");
    assert_eq!(live.buckets_of(fixture.t1.id), vec![Bucket::Failed]);
}

#[test]
fn trial_created_pending_dispatches_on_creation() {
    let mut fixture = setup("trial_created_pending_dispatches_on_creation");
    let trial = create_trial(&mut fixture, TrialStatus::Pending);
    let pending = fixture.store.outbox_pending(10).expect("outbox");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].action, OutboxAction::Add);
    assert_eq!(pending[0].trial_id, trial.id);
}

#[test]
fn trials_never_move_backwards_or_leave_a_verdict() {
    let mut fixture = setup("trials_never_move_backwards_or_leave_a_verdict");
    let trial = create_trial(&mut fixture, TrialStatus::Running);

    let err = fixture
        .store
        .trial_set_status(TrialStatusRequest {
            id: trial.id,
            status: TrialStatus::Pending,
        })
        .expect_err("backwards transition");
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: TrialStatus::Running,
            to: TrialStatus::Pending
        }
    ));

    set(&mut fixture, trial.id, TrialStatus::Passed);
    let err = fixture
        .store
        .trial_set_status(TrialStatusRequest {
            id: trial.id,
            status: TrialStatus::Failed,
        })
        .expect_err("verdicts are final");
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
    assert_eq!(
        fixture.store.testcase_get(fixture.t1.id).expect("get").status,
        TestcaseStatus::Passed
    );
}

#[test]
fn mark_running_reports_whether_anything_changed() {
    let mut fixture = setup("mark_running_reports_whether_anything_changed");
    let trial = create_trial(&mut fixture, TrialStatus::Pending);

    let (view, changed) = fixture.store.trial_mark_running(trial.id).expect("mark running");
    assert!(changed);
    assert_eq!(view.trial.status, TrialStatus::Running);
    assert_eq!(view.recent, Some(trial.id));
    assert_eq!(view.group(), format!("{}_42", view.project_id));

    let (_, changed) = fixture.store.trial_mark_running(trial.id).expect("mark again");
    assert!(!changed);

    assert!(matches!(
        fixture.store.trial_mark_running(trial.id + 100),
        Err(StoreError::UnknownId)
    ));
}

#[test]
fn unchanged_command_keeps_status_and_changed_command_forces_candidate() {
    let mut fixture = setup("unchanged_command_keeps_status_and_changed_command_forces_candidate");
    let trial = create_trial(&mut fixture, TrialStatus::Pending);
    set(&mut fixture, trial.id, TrialStatus::Passed);

    let same = fixture
        .store
        .testcase_update(TestcaseUpdateRequest {
            id: fixture.t1.id,
            command: Some("stub_a/run.sh --case t1".to_string()),
            timeout: Some(600),
            ..Default::default()
        })
        .expect("same command");
    assert!(!same.forced_candidate);
    assert_eq!(same.testcase.status, TestcaseStatus::Passed);
    assert_eq!(same.testcase.recent, Some(trial.id));

    let changed = fixture
        .store
        .testcase_update(TestcaseUpdateRequest {
            id: fixture.t1.id,
            timeout: Some(900),
            status: Some(TestcaseStatus::Passed),
            ..Default::default()
        })
        .expect("new timeout");
    assert!(changed.forced_candidate);
    assert!(changed.recent_cleared);
    assert!(changed.bucket_moved);
    assert_eq!(changed.testcase.status, TestcaseStatus::Candidate);
    assert_eq!(changed.testcase.recent, None);

    let live = fixture.store.snapshot_live(fixture.version.id).expect("live");
    assert_eq!(live.buckets_of(fixture.t1.id), vec![Bucket::Unverified]);
}

#[test]
fn trial_version_must_belong_to_the_testcase_project() {
    let mut fixture = setup("trial_version_must_belong_to_the_testcase_project");
    let other = fixture
        .store
        .project_create(ProjectCreateRequest {
            name: "P2".to_string(),
            url: "https://git.example.test/p2.git".to_string(),
        })
        .expect("other project");
    let foreign = fixture
        .store
        .version_create(VersionCreateRequest {
            project_id: other.id,
            name: "v1".to_string(),
        })
        .expect("foreign version")
        .version;

    let err = fixture
        .store
        .trial_create(TrialCreateRequest {
            testcase_id: fixture.t1.id,
            version_id: foreign.id,
            directory: "/builds/1".to_string(),
            backup: None,
            build_number: None,
            workspace_id: None,
            status: TrialStatus::Compiling,
        })
        .expect_err("cross-project trial");
    assert!(matches!(err, StoreError::InvalidInput(_)));
    assert_eq!(fixture.store.testcase_get(fixture.t1.id).expect("get").recent, None);
}
