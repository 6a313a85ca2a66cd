#![forbid(unsafe_code)]

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxAction {
    /// Trial is ready to run.
    Add,
    /// Trial finished.
    Complete,
}

impl OutboxAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxAction::Add => "add",
            OutboxAction::Complete => "complete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "add" => Some(OutboxAction::Add),
            "complete" => Some(OutboxAction::Complete),
            _ => None,
        }
    }
}

/// A task-manager notification waiting for (or past) delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboxRow {
    pub seq: i64,
    pub action: OutboxAction,
    pub trial_id: i64,
    pub owner: Option<String>,
    pub project_id: i64,
    pub command: String,
    pub build_number: Option<i64>,
    pub created_at_ms: i64,
    pub sent_at_ms: Option<i64>,
}
