#![forbid(unsafe_code)]

use rg_core::model::Bucket;
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRow {
    pub id: i64,
    pub version_id: i64,
    pub date: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct SnapshotView {
    pub snapshot: SnapshotRow,
    pub passed: Vec<i64>,
    pub failed: Vec<i64>,
    pub todo: Vec<i64>,
    pub unverified: Vec<i64>,
}

impl SnapshotView {
    pub fn bucket(&self, bucket: Bucket) -> &[i64] {
        match bucket {
            Bucket::Passed => &self.passed,
            Bucket::Failed => &self.failed,
            Bucket::Todo => &self.todo,
            Bucket::Unverified => &self.unverified,
        }
    }

    /// Distinct testcases across all buckets.
    pub fn total(&self) -> BTreeSet<i64> {
        Bucket::ALL
            .into_iter()
            .flat_map(|bucket| self.bucket(bucket).iter().copied())
            .collect()
    }

    /// Buckets holding `testcase_id`; a consistent snapshot yields exactly one.
    pub fn buckets_of(&self, testcase_id: i64) -> Vec<Bucket> {
        Bucket::ALL
            .into_iter()
            .filter(|bucket| self.bucket(*bucket).contains(&testcase_id))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct SnapshotTakeRequest {
    pub version_id: i64,
    /// `YYYY-MM-DD`; defaults to today (UTC).
    pub date: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SnapshotTakeResult {
    pub snapshot: SnapshotRow,
    pub created: bool,
}
