#![forbid(unsafe_code)]

//! Workflows driven by build tooling: per-build trial creation, compile
//! workspaces and stub completion.

use super::OpContext;
use super::catalog::resolve_project;
use crate::support::{
    Args, notifications_json, optional_i64, project_json, require_i64, require_specifier,
    require_string, store_error, stub_json, trials_json, version_json, workspace_json,
};
use rg_storage::{
    StubFinishRequest, TrialsForBuildRequest, WorkspaceDeleteOutcome, WorkspacePostRequest,
};
use serde_json::{Value, json};

pub(super) fn trials_create_for_build(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let request = TrialsForBuildRequest {
        project: require_specifier(args, "project")?,
        version: require_specifier(args, "version")?,
        build_number: optional_i64(args, "BUILD_NUMBER")?,
        directory: require_string(args, "path")?,
    };
    let result = ctx.store.trials_create_for_build(request).map_err(store_error)?;
    Ok(json!({
        "project": project_json(&result.project),
        "version": version_json(&result.version),
        "trials": trials_json(&result.trials),
    }))
}

pub(super) fn workspace_post(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let project = resolve_project(ctx, args)?;
    let request = WorkspacePostRequest {
        path: require_string(args, "path")?,
        stub: require_string(args, "stub")?,
        project_id: project.id,
        build_number: optional_i64(args, "BUILD_NUMBER")?,
    };
    let result = ctx.store.workspace_post(request).map_err(store_error)?;
    Ok(json!({
        "workspace": workspace_json(&result.workspace),
        "stub": stub_json(&result.stub),
        "trials": trials_json(&result.trials),
    }))
}

pub(super) fn stub_finish(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let request = StubFinishRequest {
        stub: require_string(args, "stub")?,
        build_number: optional_i64(args, "BUILD_NUMBER")?,
    };
    let result = ctx.store.stub_finish(request).map_err(store_error)?;
    Ok(json!({
        "trials": trials_json(&result.trials),
        "notifications": notifications_json(&result.notifications),
    }))
}

pub(super) fn workspace_try_delete(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let workspace_id = require_i64(args, "workspace")?;
    let outcome = ctx
        .store
        .workspace_try_delete(workspace_id)
        .map_err(store_error)?;
    Ok(match outcome {
        WorkspaceDeleteOutcome::Deleted => json!({
            "workspace": workspace_id,
            "deleted": true,
        }),
        WorkspaceDeleteOutcome::InUse {
            active_trials,
            stubs,
        } => json!({
            "workspace": workspace_id,
            "deleted": false,
            "active_trials": active_trials,
            "stubs": stubs,
        }),
    })
}
