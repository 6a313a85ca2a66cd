#![forbid(unsafe_code)]

use super::{OutboxRow, TrialRow};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceRow {
    pub id: i64,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub workspace_id: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct WorkspacePostRequest {
    pub path: String,
    pub stub: String,
    pub project_id: i64,
    pub build_number: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct WorkspacePostResult {
    pub workspace: WorkspaceRow,
    pub stub: StubRow,
    pub trials: Vec<TrialRow>,
}

#[derive(Clone, Debug)]
pub struct StubFinishRequest {
    pub stub: String,
    pub build_number: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct StubFinishResult {
    pub trials: Vec<TrialRow>,
    pub notifications: Vec<OutboxRow>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkspaceDeleteOutcome {
    Deleted,
    InUse { active_trials: u64, stubs: u64 },
}
