#![forbid(unsafe_code)]

use rg_core::ids::{Specifier, TestcaseKey};
use rg_core::model::{TestcaseStatus, TrialStatus};
use rg_storage::{
    OutboxAction, ProjectCreateRequest, ProjectRow, SqliteStore, StoreError, StubFinishRequest,
    TestcaseCreateRequest, TestcaseRow, TestcaseUpdateRequest, TrialCreateRequest, TrialStatusRequest,
    TrialsForBuildRequest, TrialsListRequest, VersionCreateRequest, WorkspaceDeleteOutcome,
    WorkspacePostRequest,
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

fn setup(test_name: &str) -> (SqliteStore, ProjectRow) {
    let mut store = SqliteStore::open(temp_dir(test_name)).expect("open store");
    let project = store
        .project_create(ProjectCreateRequest {
            name: "P1".to_string(),
            url: format!("https://git.example.test/{test_name}.git"),
        })
        .expect("create project");
    store
        .version_create(VersionCreateRequest {
            project_id: project.id,
            name: "v1".to_string(),
        })
        .expect("create version");
    (store, project)
}

fn testcase(store: &mut SqliteStore, project: &ProjectRow, key: &str, command: &str) -> TestcaseRow {
    store
        .testcase_create(TestcaseCreateRequest {
            project_id: project.id,
            key: TestcaseKey::try_new(key).expect("key"),
            command: command.to_string(),
            timeout: None,
            group_id: None,
            owner: None,
        })
        .expect("create testcase")
}

fn create_for_build(store: &mut SqliteStore, build: i64) -> Vec<rg_storage::TrialRow> {
    store
        .trials_create_for_build(TrialsForBuildRequest {
            project: Specifier::Name("P1".to_string()),
            version: Specifier::Name("v1".to_string()),
            build_number: Some(build),
            directory: format!("/builds/{build}"),
        })
        .expect("create trials for build")
        .trials
}

#[test]
fn create_for_build_targets_unverified_testcases_without_recent_trial() {
    let (mut store, project) =
        setup("create_for_build_targets_unverified_testcases_without_recent_trial");
    let a = testcase(&mut store, &project, "a", "stub_a/run a");
    let b = testcase(&mut store, &project, "b", "stub_b/run b");
    let todo = testcase(&mut store, &project, "todo", "stub_a/run todo");
    store
        .testcase_update(TestcaseUpdateRequest {
            id: todo.id,
            status: Some(TestcaseStatus::Todo),
            ..Default::default()
        })
        .expect("todo");

    let trials = create_for_build(&mut store, 7);
    let testcases: Vec<i64> = trials.iter().map(|trial| trial.testcase_id).collect();
    assert_eq!(testcases, vec![a.id, b.id]);
    for trial in &trials {
        assert_eq!(trial.status, TrialStatus::Compiling);
        assert_eq!(trial.build_number, Some(7));
        assert_eq!(trial.directory, "/builds/7");
        assert_eq!(store.testcase_get(trial.testcase_id).expect("get").recent, Some(trial.id));
    }

    assert!(create_for_build(&mut store, 8).is_empty());
}

#[test]
fn create_for_build_resolves_ids_and_rejects_unknown_specifiers() {
    let (mut store, project) = setup("create_for_build_resolves_ids_and_rejects_unknown_specifiers");
    testcase(&mut store, &project, "a", "stub_a/run a");
    let version = store.versions_list(project.id).expect("versions")[0].clone();

    let result = store
        .trials_create_for_build(TrialsForBuildRequest {
            project: Specifier::Id(project.id),
            version: Specifier::Id(version.id),
            build_number: None,
            directory: "/builds/none".to_string(),
        })
        .expect("by id");
    assert_eq!(result.project.id, project.id);
    assert_eq!(result.trials.len(), 1);
    assert_eq!(result.trials[0].build_number, None);

    let err = store
        .trials_create_for_build(TrialsForBuildRequest {
            project: Specifier::Name("missing".to_string()),
            version: Specifier::Id(version.id),
            build_number: Some(1),
            directory: "/builds/1".to_string(),
        })
        .expect_err("unknown project");
    assert!(matches!(err, StoreError::NotFound { kind: "project", .. }));

    let err = store
        .trials_create_for_build(TrialsForBuildRequest {
            project: Specifier::Id(project.id),
            version: Specifier::Name("v9".to_string()),
            build_number: Some(1),
            directory: "/builds/1".to_string(),
        })
        .expect_err("unknown version");
    assert!(matches!(err, StoreError::NotFound { kind: "version", .. }));
}

#[test]
fn workspace_post_assigns_trials_whose_command_starts_with_stub() {
    let (mut store, project) = setup("workspace_post_assigns_trials_whose_command_starts_with_stub");
    let a = testcase(&mut store, &project, "a", "stub_a/run a");
    testcase(&mut store, &project, "b", "run stub_a b");
    create_for_build(&mut store, 3);

    let posted = store
        .workspace_post(WorkspacePostRequest {
            path: "/ws/stub_a".to_string(),
            stub: "stub_a".to_string(),
            project_id: project.id,
            build_number: Some(3),
        })
        .expect("post workspace");
    assert_eq!(posted.stub.workspace_id, Some(posted.workspace.id));
    assert_eq!(posted.trials.len(), 1);
    assert_eq!(posted.trials[0].testcase_id, a.id);
    assert_eq!(posted.trials[0].workspace_id, Some(posted.workspace.id));

    let again = store
        .workspace_post(WorkspacePostRequest {
            path: "/ws/stub_a".to_string(),
            stub: "stub_a".to_string(),
            project_id: project.id,
            build_number: Some(3),
        })
        .expect("post again");
    assert_eq!(again.workspace.id, posted.workspace.id);
    assert_eq!(again.stub.id, posted.stub.id);
}

#[test]
fn stub_finish_moves_matching_compiling_trials_to_pending() {
    let (mut store, project) = setup("stub_finish_moves_matching_compiling_trials_to_pending");
    testcase(&mut store, &project, "a", "stub_a/run a");
    testcase(&mut store, &project, "b", "run stub_a b");
    testcase(&mut store, &project, "c", "stub_c/run c");
    let trials = create_for_build(&mut store, 5);
    assert_eq!(trials.len(), 3);

    let finished = store
        .stub_finish(StubFinishRequest {
            stub: "stub_a".to_string(),
            build_number: Some(5),
        })
        .expect("finish stub");
    assert_eq!(finished.trials.len(), 2);
    assert!(finished.trials.iter().all(|trial| trial.status == TrialStatus::Pending));
    assert_eq!(finished.notifications.len(), 2);
    assert!(finished
        .notifications
        .iter()
        .all(|row| row.action == OutboxAction::Add));

    let again = store
        .stub_finish(StubFinishRequest {
            stub: "stub_a".to_string(),
            build_number: Some(5),
        })
        .expect("finish again");
    assert!(again.trials.is_empty());

    let compiling = store
        .trials_list(TrialsListRequest {
            build_number: Some(5),
            status: Some(TrialStatus::Compiling),
            limit: 10,
            ..Default::default()
        })
        .expect("list");
    assert_eq!(compiling.len(), 1);
    assert_eq!(compiling[0].command, "stub_c/run c");
}

#[test]
fn workspace_is_deleted_only_when_idle() {
    let (mut store, project) = setup("workspace_is_deleted_only_when_idle");
    testcase(&mut store, &project, "a", "stub_a/run a");
    let trials = create_for_build(&mut store, 9);
    let posted = store
        .workspace_post(WorkspacePostRequest {
            path: "/ws/9".to_string(),
            stub: "stub_a".to_string(),
            project_id: project.id,
            build_number: Some(9),
        })
        .expect("post workspace");

    let outcome = store.workspace_try_delete(posted.workspace.id).expect("try delete");
    assert_eq!(
        outcome,
        WorkspaceDeleteOutcome::InUse {
            active_trials: 1,
            stubs: 1
        }
    );

    store
        .trial_set_status(TrialStatusRequest {
            id: trials[0].id,
            status: TrialStatus::Passed,
        })
        .expect("finish trial");
    let outcome = store.workspace_try_delete(posted.workspace.id).expect("try delete");
    assert_eq!(
        outcome,
        WorkspaceDeleteOutcome::InUse {
            active_trials: 0,
            stubs: 1
        }
    );

    let moved = store
        .workspace_post(WorkspacePostRequest {
            path: "/ws/other".to_string(),
            stub: "stub_a".to_string(),
            project_id: project.id,
            build_number: Some(9),
        })
        .expect("move stub");
    assert_eq!(moved.trials.len(), 1);
    assert_eq!(moved.trials[0].workspace_id, Some(moved.workspace.id));
    let outcome = store.workspace_try_delete(posted.workspace.id).expect("try delete");
    assert_eq!(outcome, WorkspaceDeleteOutcome::Deleted);
    assert!(matches!(
        store.workspace_get(posted.workspace.id),
        Err(StoreError::UnknownId)
    ));
    // Reposting the stub re-pointed the build's trials, finished ones included.
    assert_eq!(
        store.trial_get(trials[0].id).expect("trial").workspace_id,
        Some(moved.workspace.id)
    );

    let parked = store
        .workspace_post(WorkspacePostRequest {
            path: "/ws/parked".to_string(),
            stub: "stub_b".to_string(),
            project_id: project.id,
            build_number: Some(10),
        })
        .expect("post parked workspace");
    store
        .workspace_post(WorkspacePostRequest {
            path: "/ws/elsewhere".to_string(),
            stub: "stub_b".to_string(),
            project_id: project.id,
            build_number: Some(10),
        })
        .expect("move stub_b");
    let finished = store
        .trial_create(TrialCreateRequest {
            testcase_id: trials[0].testcase_id,
            version_id: trials[0].version_id,
            directory: "/builds/10".to_string(),
            backup: None,
            build_number: Some(10),
            workspace_id: Some(parked.workspace.id),
            status: TrialStatus::Passed,
        })
        .expect("finished trial in parked workspace")
        .trial;
    let outcome = store.workspace_try_delete(parked.workspace.id).expect("try delete parked");
    assert_eq!(outcome, WorkspaceDeleteOutcome::Deleted);
    assert_eq!(store.trial_get(finished.id).expect("trial").workspace_id, None);
}
