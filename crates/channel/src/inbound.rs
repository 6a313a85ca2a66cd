#![forbid(unsafe_code)]

use crate::client::SharedStore;
use crate::fanout::{FanoutHub, GroupMessage};
use crate::wire::InboundStart;
use rg_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("trial id must be positive, got {0}")]
    InvalidPk(i64),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

pub fn parse_start(text: &str) -> Result<InboundStart, InboundError> {
    let start: InboundStart = serde_json::from_str(text)?;
    if start.pk <= 0 {
        return Err(InboundError::InvalidPk(start.pk));
    }
    Ok(start)
}

/// Move the trial named by a start frame to running and publish its view.
///
/// Returns `None` when the trial was already running.
pub(crate) async fn handle_start(
    store: &SharedStore,
    fanout: &FanoutHub,
    text: &str,
) -> Result<Option<GroupMessage>, InboundError> {
    let start = parse_start(text)?;
    let (view, changed) = {
        let mut store = store.lock().await;
        store.trial_mark_running(start.pk)?
    };
    if !changed {
        tracing::debug!(trial_id = start.pk, "trial already running");
        return Ok(None);
    }
    let message = GroupMessage::trial(&view);
    let receivers = fanout.publish(message.clone());
    tracing::info!(trial_id = start.pk, group = %message.group, receivers, "trial started");
    Ok(Some(message))
}
