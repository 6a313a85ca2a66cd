#![forbid(unsafe_code)]

//! Applies reconciler decisions inside the caller's transaction.

use super::outbox::enqueue_tx;
use super::snapshots::{move_testcase_tx, project_live_snapshot_tx};
use super::testcases::testcase_row;
use super::{OutboxAction, OutboxRow, StoreError, TestcaseRow, TrialRow};
use rg_core::model::TestcaseStatus;
use rg_core::reconcile::{TestcaseState, TrialEffect, decide_testcase_update};
use rusqlite::{Transaction, params};

pub(super) fn write_testcase_status_tx(
    tx: &Transaction<'_>,
    testcase_id: i64,
    status: TestcaseStatus,
    clear_recent: bool,
    now_ms: i64,
) -> Result<(), StoreError> {
    if clear_recent {
        tx.execute(
            "UPDATE testcases SET status=?2, recent_trial_id=NULL, updated_at_ms=?3 WHERE id=?1",
            params![testcase_id, status.as_str(), now_ms],
        )?;
    } else {
        tx.execute(
            "UPDATE testcases SET status=?2, updated_at_ms=?3 WHERE id=?1",
            params![testcase_id, status.as_str(), now_ms],
        )?;
    }
    Ok(())
}

/// Keep the testcase in exactly one bucket of its project's live snapshot.
/// Projects without a version have no snapshot to sync.
pub(super) fn sync_bucket_tx(
    tx: &Transaction<'_>,
    project_id: i64,
    testcase_id: i64,
    status: TestcaseStatus,
    now_ms: i64,
) -> Result<bool, StoreError> {
    let Some(snapshot) = project_live_snapshot_tx(tx, project_id, now_ms)? else {
        return Ok(false);
    };
    move_testcase_tx(tx, snapshot.id, testcase_id, status.bucket())
}

/// Run trial effects in order and return the notifications they queued.
pub(super) fn apply_trial_effects_tx(
    tx: &Transaction<'_>,
    trial: &TrialRow,
    testcase: &TestcaseRow,
    effects: &[TrialEffect],
    now_ms: i64,
) -> Result<Vec<OutboxRow>, StoreError> {
    let mut notifications = Vec::new();
    for effect in effects {
        match *effect {
            TrialEffect::Dispatch => {
                notifications.push(enqueue_tx(tx, OutboxAction::Add, trial, testcase, now_ms)?);
            }
            TrialEffect::Propagate(verdict) => {
                let stored = testcase_row(tx, testcase.id)?;
                let decision = decide_testcase_update(
                    TestcaseState {
                        status: stored.status,
                        command: &stored.command,
                        timeout: stored.timeout,
                    },
                    &stored.command,
                    stored.timeout,
                    Some(verdict),
                );
                write_testcase_status_tx(tx, stored.id, decision.status, decision.clear_recent, now_ms)?;
                sync_bucket_tx(tx, stored.project_id, stored.id, decision.status, now_ms)?;
                tracing::debug!(
                    trial_id = trial.id,
                    testcase_id = stored.id,
                    status = decision.status.as_str(),
                    "propagated verdict"
                );
            }
            TrialEffect::Complete => {
                notifications.push(enqueue_tx(tx, OutboxAction::Complete, trial, testcase, now_ms)?);
            }
        }
    }
    Ok(notifications)
}
