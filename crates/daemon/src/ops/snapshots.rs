#![forbid(unsafe_code)]

use super::OpContext;
use crate::support::{Args, optional_string, require_i64, snapshot_json, snapshot_view_json, store_error};
use rg_storage::SnapshotTakeRequest;
use serde_json::{Value, json};

pub(super) fn snapshot_live(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let version_id = require_i64(args, "version")?;
    let view = ctx.store.snapshot_live(version_id).map_err(store_error)?;
    Ok(snapshot_view_json(&view))
}

pub(super) fn snapshot_get(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let id = require_i64(args, "id")?;
    let view = ctx.store.snapshot_get(id).map_err(store_error)?;
    Ok(snapshot_view_json(&view))
}

pub(super) fn snapshot_take(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let request = SnapshotTakeRequest {
        version_id: require_i64(args, "version")?,
        date: optional_string(args, "date")?,
    };
    let result = ctx.store.snapshot_take(request).map_err(store_error)?;
    Ok(json!({
        "snapshot": snapshot_json(&result.snapshot),
        "created": result.created,
    }))
}

pub(super) fn snapshot_list(ctx: &mut OpContext<'_>, args: &Args) -> Result<Value, Value> {
    let version_id = require_i64(args, "version")?;
    let snapshots = ctx.store.snapshots_list(version_id).map_err(store_error)?;
    Ok(json!({
        "snapshots": snapshots.iter().map(snapshot_json).collect::<Vec<_>>(),
    }))
}

/// Connection state plus the number of notifications still waiting for
/// delivery.
pub(super) fn channel_status(ctx: &mut OpContext<'_>, _args: &Args) -> Result<Value, Value> {
    let backlog = ctx.store.outbox_backlog().map_err(store_error)?;
    let Some(channel) = ctx.channel else {
        return Ok(json!({
            "enabled": false,
            "backlog": backlog,
        }));
    };
    let status = channel.status();
    Ok(json!({
        "enabled": true,
        "backlog": backlog,
        "state": status.state,
        "url": status.url,
        "connects": status.connects,
        "delivered": status.delivered,
        "started": status.started,
    }))
}
