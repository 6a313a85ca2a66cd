#![forbid(unsafe_code)]

use rg_storage::TrialView;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

pub const MESSAGING: &str = "messaging";

/// One notification for the subscribers of `group`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub group: String,
    /// Serialized JSON payload, passed through untouched.
    pub message: String,
}

impl GroupMessage {
    pub fn messaging(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: MESSAGING,
            group: group.into(),
            message: message.into(),
        }
    }

    pub fn trial(view: &TrialView) -> Self {
        Self::messaging(view.group(), trial_view_json(view).to_string())
    }
}

/// Wire view of a trial as live build watchers see it.
pub fn trial_view_json(view: &TrialView) -> Value {
    json!({
        "id": view.trial.id,
        "command": view.command,
        "recent": view.recent,
        "owner": view.owner,
        "project": view.project_id,
        "testcase": view.trial.testcase_id,
        "version": view.trial.version_id,
        "directory": view.trial.directory,
        "status": view.trial.status.as_str(),
        "backup": view.trial.backup,
        "BUILD_NUMBER": view.trial.build_number,
        "workspace": view.trial.workspace_id,
    })
}

/// In-process fan-out to real-time subscribers. Slow subscribers lag and lose
/// messages; publishers never block.
#[derive(Clone, Debug)]
pub struct FanoutHub {
    tx: broadcast::Sender<GroupMessage>,
}

impl FanoutHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupMessage> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers that received the message.
    pub fn publish(&self, message: GroupMessage) -> usize {
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("no fan-out subscribers");
                0
            }
        }
    }
}
