#![forbid(unsafe_code)]

//! Status reconciliation rules shared by every writer of testcases and trials.
//!
//! The functions here only decide; applying a decision (and keeping snapshot
//! buckets in sync) is the storage layer's job, inside the transaction that
//! performs the triggering write.

use crate::model::{TestcaseStatus, TrialStatus};

/// Stored testcase fields the upsert rule compares against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestcaseState<'a> {
    pub status: TestcaseStatus,
    pub command: &'a str,
    pub timeout: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpsertDecision {
    pub status: TestcaseStatus,
    /// Command or timeout changed, so the caller's status was overridden.
    pub forced: bool,
    pub clear_recent: bool,
}

/// Decide the outcome of saving `next` over `stored`.
///
/// `requested` is the status the caller wants; `None` keeps the stored one.
pub fn decide_testcase_update(
    stored: TestcaseState<'_>,
    next_command: &str,
    next_timeout: i64,
    requested: Option<TestcaseStatus>,
) -> UpsertDecision {
    let forced = stored.command != next_command || stored.timeout != next_timeout;
    let status = if forced {
        TestcaseStatus::Candidate
    } else {
        requested.unwrap_or(stored.status)
    };
    let clear_recent = status.is_unverified() && stored.status.is_verified();
    UpsertDecision {
        status,
        forced,
        clear_recent,
    }
}

/// Status a testcase takes when a new version of its project appears.
///
/// Verdicts are invalidated: a pass becomes `candidate2`, a failure `candidate`.
/// Everything else is left alone.
pub fn reclassify_for_new_version(status: TestcaseStatus) -> Option<TestcaseStatus> {
    match status {
        TestcaseStatus::Passed => Some(TestcaseStatus::Candidate2),
        TestcaseStatus::Failed => Some(TestcaseStatus::Candidate),
        _ => None,
    }
}

/// Downstream work a trial write requires, in the order it must be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialEffect {
    /// Tell the task manager the trial is ready to run.
    Dispatch,
    /// Copy the verdict onto the owning testcase.
    Propagate(TestcaseStatus),
    /// Tell the task manager the trial finished.
    Complete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Same status as stored; nothing to write, nothing to emit.
    Unchanged,
    Apply(Vec<TrialEffect>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: TrialStatus,
    pub to: TrialStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "trial cannot move from {} to {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl std::error::Error for TransitionError {}

/// Effects of entering `status`, either on creation or through a transition.
pub fn effects_on_enter(status: TrialStatus) -> Vec<TrialEffect> {
    match status {
        TrialStatus::Pending => vec![TrialEffect::Dispatch],
        TrialStatus::Passed | TrialStatus::Failed => match status.verdict() {
            Some(verdict) => vec![TrialEffect::Propagate(verdict), TrialEffect::Complete],
            None => Vec::new(),
        },
        TrialStatus::Compiling | TrialStatus::Running => Vec::new(),
    }
}

/// Validate a trial status change and list what it triggers.
///
/// Trials only move forward through compiling, pending, running and a verdict;
/// stages may be skipped, verdicts are final.
pub fn decide_trial_transition(
    from: TrialStatus,
    to: TrialStatus,
) -> Result<TransitionDecision, TransitionError> {
    if from == to {
        return Ok(TransitionDecision::Unchanged);
    }
    if from.is_terminal() || to.stage() <= from.stage() {
        return Err(TransitionError { from, to });
    }
    Ok(TransitionDecision::Apply(effects_on_enter(to)))
}
