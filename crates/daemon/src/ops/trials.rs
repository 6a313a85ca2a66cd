#![forbid(unsafe_code)]

use super::catalog::resolve_project;
use super::{OpContext, list_limit};
use crate::support::{
    Args, notifications_json, optional_i64, optional_string, optional_trial_status, require_i64,
    require_string, require_trial_status, store_error, testcase_json, trial_json,
};
use rg_channel::trial_view_json;
use rg_core::model::TrialStatus;
use rg_storage::{TrialCreateRequest, TrialStatusRequest, TrialWriteResult, TrialsListRequest};
use serde_json::{Value, json};

fn write_result_json(result: &TrialWriteResult) -> Value {
    json!({
        "trial": trial_json(&result.trial),
        "testcase": testcase_json(&result.testcase),
        "changed": result.changed,
        "notifications": notifications_json(&result.notifications),
    })
}

pub(super) fn trial_create(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let request = TrialCreateRequest {
        testcase_id: require_i64(args, "testcase")?,
        version_id: require_i64(args, "version")?,
        directory: require_string(args, "directory")?,
        backup: optional_string(args, "backup")?,
        build_number: optional_i64(args, "BUILD_NUMBER")?,
        workspace_id: optional_i64(args, "workspace")?,
        status: optional_trial_status(args, "status")?.unwrap_or(TrialStatus::Compiling),
    };
    let result = ctx.store.trial_create(request).map_err(store_error)?;
    Ok(write_result_json(&result))
}

pub(super) fn trial_get(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let id = require_i64(args, "id")?;
    let view = ctx.store.trial_view(id).map_err(store_error)?;
    Ok(trial_view_json(&view))
}

pub(super) fn trial_set_status(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let request = TrialStatusRequest {
        id: require_i64(args, "id")?,
        status: require_trial_status(args, "status")?,
    };
    let result = ctx.store.trial_set_status(request).map_err(store_error)?;
    Ok(write_result_json(&result))
}

pub(super) fn trial_list(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let project_id = if args.get("project").is_some_and(|v| !v.is_null()) {
        Some(resolve_project(ctx, args)?.id)
    } else {
        None
    };
    let request = TrialsListRequest {
        project_id,
        build_number: optional_i64(args, "BUILD_NUMBER")?,
        status: optional_trial_status(args, "status")?,
        command_prefix: optional_string(args, "command_prefix")?,
        command_contains: optional_string(args, "command_contains")?,
        limit: list_limit(args)?,
    };
    let views = ctx.store.trials_list(request).map_err(store_error)?;
    Ok(json!({
        "trials": views.iter().map(trial_view_json).collect::<Vec<_>>(),
    }))
}
