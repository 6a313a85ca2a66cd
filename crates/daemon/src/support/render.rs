#![forbid(unsafe_code)]

use rg_storage::{
    GroupRow, OutboxRow, ProjectRow, Reclassified, SnapshotRow, SnapshotView, StubRow, TestcaseRow,
    TrialRow, VersionRow, WorkspaceRow,
};
use serde_json::{Value, json};

pub(crate) fn project_json(project: &ProjectRow) -> Value {
    json!({
        "id": project.id,
        "name": project.name,
        "url": project.url,
    })
}

pub(crate) fn group_json(group: &GroupRow) -> Value {
    json!({
        "id": group.id,
        "project": group.project_id,
        "name": group.name,
    })
}

pub(crate) fn version_json(version: &VersionRow) -> Value {
    json!({
        "id": version.id,
        "project": version.project_id,
        "name": version.name,
    })
}

pub(crate) fn testcase_json(testcase: &TestcaseRow) -> Value {
    json!({
        "id": testcase.id,
        "project": testcase.project_id,
        "key": testcase.key,
        "command": testcase.command,
        "timeout": testcase.timeout,
        "group": testcase.group_id,
        "owner": testcase.owner,
        "status": testcase.status.as_str(),
        "recent": testcase.recent,
    })
}

pub(crate) fn trial_json(trial: &TrialRow) -> Value {
    json!({
        "id": trial.id,
        "testcase": trial.testcase_id,
        "version": trial.version_id,
        "status": trial.status.as_str(),
        "directory": trial.directory,
        "backup": trial.backup,
        "BUILD_NUMBER": trial.build_number,
        "workspace": trial.workspace_id,
    })
}

pub(crate) fn trials_json(trials: &[TrialRow]) -> Value {
    Value::Array(trials.iter().map(trial_json).collect())
}

pub(crate) fn reclassified_json(entry: &Reclassified) -> Value {
    json!({
        "testcase": entry.testcase_id,
        "from": entry.from.as_str(),
        "to": entry.to.as_str(),
    })
}

pub(crate) fn snapshot_json(snapshot: &SnapshotRow) -> Value {
    json!({
        "id": snapshot.id,
        "version": snapshot.version_id,
        "date": snapshot.date,
        "created_at_ms": snapshot.created_at_ms,
    })
}

pub(crate) fn snapshot_view_json(view: &SnapshotView) -> Value {
    json!({
        "snapshot": snapshot_json(&view.snapshot),
        "passed": view.passed,
        "failed": view.failed,
        "todo": view.todo,
        "unverified": view.unverified,
        "total": view.total().len(),
    })
}

/// Notifications are reported by sequence so callers can correlate them with
/// frames seen by the task manager.
pub(crate) fn notifications_json(rows: &[OutboxRow]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                json!({
                    "seq": row.seq,
                    "action": row.action.as_str(),
                    "trial": row.trial_id,
                })
            })
            .collect(),
    )
}

pub(crate) fn workspace_json(workspace: &WorkspaceRow) -> Value {
    json!({
        "id": workspace.id,
        "path": workspace.path,
    })
}

pub(crate) fn stub_json(stub: &StubRow) -> Value {
    json!({
        "id": stub.id,
        "project": stub.project_id,
        "name": stub.name,
        "workspace": stub.workspace_id,
    })
}
