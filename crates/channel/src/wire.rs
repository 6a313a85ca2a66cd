#![forbid(unsafe_code)]

use rg_storage::{OutboxAction, OutboxRow};
use serde::{Deserialize, Serialize};

/// Frames sent to the task manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OutboundMessage {
    Add {
        owner: Option<String>,
        project: i64,
        command: String,
        build: Option<i64>,
        pk: i64,
    },
    Complete {
        project: i64,
        command: String,
        build: Option<i64>,
    },
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&OutboxRow> for OutboundMessage {
    fn from(row: &OutboxRow) -> Self {
        match row.action {
            OutboxAction::Add => OutboundMessage::Add {
                owner: row.owner.clone(),
                project: row.project_id,
                command: row.command.clone(),
                build: row.build_number,
                pk: row.trial_id,
            },
            OutboxAction::Complete => OutboundMessage::Complete {
                project: row.project_id,
                command: row.command.clone(),
                build: row.build_number,
            },
        }
    }
}

/// "Trial `pk` started executing." Other fields are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct InboundStart {
    pub pk: i64,
}
