#![forbid(unsafe_code)]

//! Static operation table for the command loop.

mod builds;
mod catalog;
mod snapshots;
mod trials;

use crate::support::{Args, op_error};
use rg_channel::ControlChannel;
use rg_storage::SqliteStore;
use serde_json::Value;

const DEFAULT_LIST_LIMIT: usize = 100;

pub(crate) struct OpContext<'a> {
    pub(crate) store: &'a mut SqliteStore,
    pub(crate) channel: Option<&'a ControlChannel>,
}

type Handler = fn(&mut OpContext<'_>, &Args) -> Result<Value, Value>;

pub(crate) struct OpSpec {
    pub(crate) name: &'static str,
    handler: Handler,
    /// Successful calls may queue task-manager notifications.
    pub(crate) wakes_outbox: bool,
}

const fn op(name: &'static str, handler: Handler) -> OpSpec {
    OpSpec {
        name,
        handler,
        wakes_outbox: false,
    }
}

const fn notifying(name: &'static str, handler: Handler) -> OpSpec {
    OpSpec {
        name,
        handler,
        wakes_outbox: true,
    }
}

static OPS: &[OpSpec] = &[
    op("project.create", catalog::project_create),
    op("project.list", catalog::project_list),
    op("group.create", catalog::group_create),
    op("version.create", catalog::version_create),
    op("version.list", catalog::version_list),
    op("testcase.create", catalog::testcase_create),
    op("testcase.update", catalog::testcase_update),
    op("testcase.get", catalog::testcase_get),
    op("testcase.list", catalog::testcase_list),
    notifying("trial.create", trials::trial_create),
    op("trial.get", trials::trial_get),
    notifying("trial.set_status", trials::trial_set_status),
    op("trial.list", trials::trial_list),
    op("trials.create_for_build", builds::trials_create_for_build),
    op("workspace.post", builds::workspace_post),
    notifying("stub.finish", builds::stub_finish),
    op("workspace.try_delete", builds::workspace_try_delete),
    op("snapshot.live", snapshots::snapshot_live),
    op("snapshot.get", snapshots::snapshot_get),
    op("snapshot.take", snapshots::snapshot_take),
    op("snapshot.list", snapshots::snapshot_list),
    op("channel.status", snapshots::channel_status),
];

pub(crate) fn find(name: &str) -> Option<&'static OpSpec> {
    OPS.iter().find(|spec| spec.name == name)
}

pub(crate) fn dispatch(ctx: &mut OpContext<'_>, name: &str, args: &Args) -> Result<Value, Value> {
    let Some(spec) = find(name) else {
        return Err(op_error("UNKNOWN_OP", &format!("unknown op: {name}")));
    };
    (spec.handler)(ctx, args)
}

fn list_limit(args: &Args) -> Result<usize, Value> {
    Ok(crate::support::optional_usize(args, "limit")?.unwrap_or(DEFAULT_LIST_LIMIT))
}
