#![forbid(unsafe_code)]

use super::SnapshotRow;
use rg_core::model::TestcaseStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug)]
pub struct ProjectCreateRequest {
    pub name: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct GroupCreateRequest {
    pub project_id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct VersionCreateRequest {
    pub project_id: i64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reclassified {
    pub testcase_id: i64,
    pub from: TestcaseStatus,
    pub to: TestcaseStatus,
}

/// Everything the new-version cascade changed, committed as one unit.
#[derive(Clone, Debug)]
pub struct VersionCreateResult {
    pub version: VersionRow,
    pub reclassified: Vec<Reclassified>,
    /// Stale in-flight trials removed from still-unverified testcases.
    pub invalidated_trials: Vec<i64>,
    pub snapshot: SnapshotRow,
}
