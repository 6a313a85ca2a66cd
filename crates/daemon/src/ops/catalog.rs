#![forbid(unsafe_code)]

use super::{OpContext, list_limit};
use crate::support::{
    Args, group_json, optional_i64, optional_nullable_i64, optional_nullable_string,
    optional_string, optional_testcase_status, project_json, reclassified_json, require_i64,
    require_specifier, require_string, require_testcase_key, snapshot_json, store_error,
    testcase_json, version_json,
};
use rg_storage::{
    GroupCreateRequest, ProjectCreateRequest, ProjectRow, TestcaseCreateRequest,
    TestcaseUpdateRequest, TestcasesListRequest, VersionCreateRequest,
};
use serde_json::{Value, json};

pub(super) fn resolve_project(ctx: &OpContext<'_>, args: &Args) -> Result<ProjectRow, Value> {
    let specifier = require_specifier(args, "project")?;
    ctx.store.project_resolve(&specifier).map_err(store_error)
}

pub(super) fn project_create(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let name = require_string(args, "name")?;
    let url = require_string(args, "url")?;
    let project = ctx
        .store
        .project_create(ProjectCreateRequest { name, url })
        .map_err(store_error)?;
    Ok(project_json(&project))
}

pub(super) fn project_list(ctx: &mut OpContext<'_>, _args: &Args) -> Result<Value, Value> {
    let projects = ctx.store.projects_list().map_err(store_error)?;
    Ok(json!({
        "projects": projects.iter().map(project_json).collect::<Vec<_>>(),
    }))
}

pub(super) fn group_create(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let project = resolve_project(ctx, args)?;
    let name = require_string(args, "name")?;
    let group = ctx
        .store
        .group_create(GroupCreateRequest {
            project_id: project.id,
            name,
        })
        .map_err(store_error)?;
    Ok(group_json(&group))
}

pub(super) fn version_create(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let project = resolve_project(ctx, args)?;
    let name = require_string(args, "name")?;
    let result = ctx
        .store
        .version_create(VersionCreateRequest {
            project_id: project.id,
            name,
        })
        .map_err(store_error)?;
    Ok(json!({
        "version": version_json(&result.version),
        "reclassified": result.reclassified.iter().map(reclassified_json).collect::<Vec<_>>(),
        "invalidated_trials": result.invalidated_trials,
        "snapshot": snapshot_json(&result.snapshot),
    }))
}

pub(super) fn version_list(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let project = resolve_project(ctx, args)?;
    let versions = ctx.store.versions_list(project.id).map_err(store_error)?;
    Ok(json!({
        "project": project_json(&project),
        "versions": versions.iter().map(version_json).collect::<Vec<_>>(),
    }))
}

pub(super) fn testcase_create(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let project = resolve_project(ctx, args)?;
    let key = require_testcase_key(args, "key")?;
    let command = require_string(args, "command")?;
    let timeout = optional_i64(args, "timeout")?;
    let group_id = optional_i64(args, "group")?;
    let owner = optional_string(args, "owner")?;
    let testcase = ctx
        .store
        .testcase_create(TestcaseCreateRequest {
            project_id: project.id,
            key,
            command,
            timeout,
            group_id,
            owner,
        })
        .map_err(store_error)?;
    Ok(testcase_json(&testcase))
}

pub(super) fn testcase_update(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let request = TestcaseUpdateRequest {
        id: require_i64(args, "id")?,
        command: optional_string(args, "command")?,
        timeout: optional_i64(args, "timeout")?,
        status: optional_testcase_status(args, "status")?,
        group_id: optional_nullable_i64(args, "group")?,
        owner: optional_nullable_string(args, "owner")?,
    };
    let result = ctx.store.testcase_update(request).map_err(store_error)?;
    Ok(json!({
        "testcase": testcase_json(&result.testcase),
        "previous_status": result.previous_status.as_str(),
        "forced_candidate": result.forced_candidate,
        "recent_cleared": result.recent_cleared,
        "bucket_moved": result.bucket_moved,
    }))
}

pub(super) fn testcase_get(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let id = require_i64(args, "id")?;
    let testcase = ctx.store.testcase_get(id).map_err(store_error)?;
    Ok(testcase_json(&testcase))
}

pub(super) fn testcase_list(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let project = resolve_project(ctx, args)?;
    let request = TestcasesListRequest {
        project_id: project.id,
        status: optional_testcase_status(args, "status")?,
        limit: list_limit(args)?,
    };
    let testcases = ctx.store.testcases_list(request).map_err(store_error)?;
    Ok(json!({
        "testcases": testcases.iter().map(testcase_json).collect::<Vec<_>>(),
    }))
}
