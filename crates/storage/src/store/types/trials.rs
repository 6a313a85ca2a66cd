#![forbid(unsafe_code)]

use super::{OutboxRow, ProjectRow, TestcaseRow, VersionRow};
use rg_core::ids::Specifier;
use rg_core::model::TrialStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialRow {
    pub id: i64,
    pub testcase_id: i64,
    pub version_id: i64,
    pub status: TrialStatus,
    pub directory: String,
    pub backup: Option<String>,
    pub build_number: Option<i64>,
    pub workspace_id: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct TrialCreateRequest {
    pub testcase_id: i64,
    pub version_id: i64,
    pub directory: String,
    pub backup: Option<String>,
    pub build_number: Option<i64>,
    pub workspace_id: Option<i64>,
    pub status: TrialStatus,
}

#[derive(Clone, Debug)]
pub struct TrialStatusRequest {
    pub id: i64,
    pub status: TrialStatus,
}

/// Outcome of a trial write: the rows as committed plus the notifications
/// queued in the same transaction.
#[derive(Clone, Debug)]
pub struct TrialWriteResult {
    pub trial: TrialRow,
    pub testcase: TestcaseRow,
    pub changed: bool,
    pub notifications: Vec<OutboxRow>,
}

#[derive(Clone, Debug, Default)]
pub struct TrialsListRequest {
    pub project_id: Option<i64>,
    pub build_number: Option<i64>,
    pub status: Option<TrialStatus>,
    pub command_prefix: Option<String>,
    pub command_contains: Option<String>,
    pub limit: usize,
}

/// Trial joined with the testcase fields subscribers care about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialView {
    pub trial: TrialRow,
    pub command: String,
    pub recent: Option<i64>,
    pub owner: Option<String>,
    pub project_id: i64,
}

impl TrialView {
    /// Fan-out group for live build watchers.
    pub fn group(&self) -> String {
        match self.trial.build_number {
            Some(build) => format!("{}_{}", self.project_id, build),
            None => format!("{}_None", self.project_id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrialsForBuildRequest {
    pub project: Specifier,
    pub version: Specifier,
    pub build_number: Option<i64>,
    pub directory: String,
}

#[derive(Clone, Debug)]
pub struct TrialsForBuildResult {
    pub project: ProjectRow,
    pub version: VersionRow,
    pub trials: Vec<TrialRow>,
}
