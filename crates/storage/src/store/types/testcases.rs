#![forbid(unsafe_code)]

use rg_core::ids::TestcaseKey;
use rg_core::model::TestcaseStatus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestcaseRow {
    pub id: i64,
    pub project_id: i64,
    pub key: String,
    pub command: String,
    pub timeout: i64,
    pub group_id: Option<i64>,
    pub owner: Option<String>,
    pub status: TestcaseStatus,
    /// Weak reference to the trial this testcase currently trusts.
    pub recent: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct TestcaseCreateRequest {
    pub project_id: i64,
    pub key: TestcaseKey,
    pub command: String,
    pub timeout: Option<i64>,
    pub group_id: Option<i64>,
    pub owner: Option<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Clone, Debug, Default)]
pub struct TestcaseUpdateRequest {
    pub id: i64,
    pub command: Option<String>,
    pub timeout: Option<i64>,
    pub status: Option<TestcaseStatus>,
    pub group_id: Option<Option<i64>>,
    pub owner: Option<Option<String>>,
}

#[derive(Clone, Debug)]
pub struct TestcaseUpdateResult {
    pub testcase: TestcaseRow,
    pub previous_status: TestcaseStatus,
    /// Command or timeout changed and the status was reset to candidate.
    pub forced_candidate: bool,
    pub recent_cleared: bool,
    /// Live snapshot membership changed.
    pub bucket_moved: bool,
}

#[derive(Clone, Debug)]
pub struct TestcasesListRequest {
    pub project_id: i64,
    pub status: Option<TestcaseStatus>,
    pub limit: usize,
}
