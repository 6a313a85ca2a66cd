#![forbid(unsafe_code)]

use super::projects::{resolve_project, resolve_version, version_row};
use super::reconcile::apply_trial_effects_tx;
use super::support::{clamp_limit, normalize_required, now_ms, to_sqlite_i64, trial_status_column};
use super::testcases::{TESTCASE_COLUMNS, testcase_from_row, testcase_row};
use super::{
    SqliteStore, StoreError, TrialCreateRequest, TrialRow, TrialStatusRequest, TrialView,
    TrialWriteResult, TrialsForBuildRequest, TrialsForBuildResult, TrialsListRequest,
};
use rg_core::model::{TestcaseStatus, TrialStatus};
use rg_core::reconcile::{TransitionDecision, decide_trial_transition, effects_on_enter};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

const MAX_PATH_LEN: usize = 4_096;

pub(super) const TRIAL_COLUMNS: &str =
    "t.id, t.testcase_id, t.version_id, t.status, t.directory, t.backup, t.build_number, t.workspace_id";

pub(super) fn trial_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrialRow> {
    Ok(TrialRow {
        id: row.get(0)?,
        testcase_id: row.get(1)?,
        version_id: row.get(2)?,
        status: trial_status_column(row, 3)?,
        directory: row.get(4)?,
        backup: row.get(5)?,
        build_number: row.get(6)?,
        workspace_id: row.get(7)?,
    })
}

fn trial_view_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrialView> {
    Ok(TrialView {
        trial: trial_from_row(row)?,
        command: row.get(8)?,
        recent: row.get(9)?,
        owner: row.get(10)?,
        project_id: row.get(11)?,
    })
}

pub(super) fn trial_row(conn: &Connection, trial_id: i64) -> Result<TrialRow, StoreError> {
    conn.query_row(
        &format!("SELECT {TRIAL_COLUMNS} FROM trials t WHERE t.id=?1"),
        params![trial_id],
        trial_from_row,
    )
    .optional()?
    .ok_or(StoreError::UnknownId)
}

fn trial_view_row(conn: &Connection, trial_id: i64) -> Result<TrialView, StoreError> {
    conn.query_row(
        &format!(
            r#"
            SELECT {TRIAL_COLUMNS}, c.command, c.recent_trial_id, c.owner, c.project_id
            FROM trials t JOIN testcases c ON c.id = t.testcase_id
            WHERE t.id=?1
            "#
        ),
        params![trial_id],
        trial_view_from_row,
    )
    .optional()?
    .ok_or(StoreError::UnknownId)
}

fn normalize_directory(raw: &str) -> Result<String, StoreError> {
    normalize_required(
        raw,
        MAX_PATH_LEN,
        "trial.directory must not be empty",
        "trial.directory is too long",
    )
}

fn normalize_backup(raw: Option<&str>) -> Result<Option<String>, StoreError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    if raw.len() > MAX_PATH_LEN {
        return Err(StoreError::InvalidInput("trial.backup is too long"));
    }
    Ok(Some(raw.to_string()))
}

/// Insert a trial, make it its testcase's recent trial and apply the effects
/// of its initial status.
pub(super) fn insert_trial_tx(
    tx: &Transaction<'_>,
    request: &TrialCreateRequest,
    now_ms: i64,
) -> Result<TrialWriteResult, StoreError> {
    let directory = normalize_directory(&request.directory)?;
    let backup = normalize_backup(request.backup.as_deref())?;

    let testcase = testcase_row(tx, request.testcase_id)?;
    let version = version_row(tx, request.version_id)?;
    if version.project_id != testcase.project_id {
        return Err(StoreError::InvalidInput(
            "trial.version belongs to another project than its testcase",
        ));
    }
    if let Some(workspace_id) = request.workspace_id {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM workspaces WHERE id=?1)",
            params![workspace_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::UnknownId);
        }
    }

    tx.execute(
        r#"
        INSERT INTO trials(testcase_id, version_id, status, directory, backup, build_number, workspace_id, created_at_ms, updated_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
        "#,
        params![
            testcase.id,
            version.id,
            request.status.as_str(),
            directory,
            backup,
            request.build_number,
            request.workspace_id,
            now_ms
        ],
    )?;
    let trial = TrialRow {
        id: tx.last_insert_rowid(),
        testcase_id: testcase.id,
        version_id: version.id,
        status: request.status,
        directory,
        backup,
        build_number: request.build_number,
        workspace_id: request.workspace_id,
    };

    tx.execute(
        "UPDATE testcases SET recent_trial_id=?2, updated_at_ms=?3 WHERE id=?1",
        params![testcase.id, trial.id, now_ms],
    )?;
    tracing::debug!(trial_id = trial.id, testcase_id = testcase.id, "set recent trial");

    let testcase = testcase_row(tx, testcase.id)?;
    let notifications =
        apply_trial_effects_tx(tx, &trial, &testcase, &effects_on_enter(trial.status), now_ms)?;
    let testcase = testcase_row(tx, testcase.id)?;
    Ok(TrialWriteResult {
        trial,
        testcase,
        changed: true,
        notifications,
    })
}

pub(super) fn transition_trial_tx(
    tx: &Transaction<'_>,
    trial_id: i64,
    to: TrialStatus,
    now_ms: i64,
) -> Result<TrialWriteResult, StoreError> {
    let mut trial = trial_row(tx, trial_id)?;
    let effects = match decide_trial_transition(trial.status, to)? {
        TransitionDecision::Unchanged => {
            let testcase = testcase_row(tx, trial.testcase_id)?;
            return Ok(TrialWriteResult {
                trial,
                testcase,
                changed: false,
                notifications: Vec::new(),
            });
        }
        TransitionDecision::Apply(effects) => effects,
    };

    tx.execute(
        "UPDATE trials SET status=?2, updated_at_ms=?3 WHERE id=?1",
        params![trial.id, to.as_str(), now_ms],
    )?;
    let from = trial.status;
    trial.status = to;

    let testcase = testcase_row(tx, trial.testcase_id)?;
    let notifications = apply_trial_effects_tx(tx, &trial, &testcase, &effects, now_ms)?;
    let testcase = testcase_row(tx, trial.testcase_id)?;
    tracing::info!(
        trial_id = trial.id,
        from = from.as_str(),
        to = to.as_str(),
        notifications = notifications.len(),
        "trial status changed"
    );
    Ok(TrialWriteResult {
        trial,
        testcase,
        changed: true,
        notifications,
    })
}

impl SqliteStore {
    pub fn trial_create(&mut self, request: TrialCreateRequest) -> Result<TrialWriteResult, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let result = insert_trial_tx(&tx, &request, now_ms)?;
        tx.commit()?;
        tracing::info!(
            trial_id = result.trial.id,
            testcase_id = result.trial.testcase_id,
            status = result.trial.status.as_str(),
            "created trial"
        );
        Ok(result)
    }

    pub fn trial_set_status(&mut self, request: TrialStatusRequest) -> Result<TrialWriteResult, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let result = transition_trial_tx(&tx, request.id, request.status, now_ms)?;
        tx.commit()?;
        Ok(result)
    }

    /// Record that the task manager started the trial. Returns the committed
    /// view and whether the status actually changed.
    pub fn trial_mark_running(&mut self, trial_id: i64) -> Result<(TrialView, bool), StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let result = transition_trial_tx(&tx, trial_id, TrialStatus::Running, now_ms)?;
        let view = trial_view_row(&tx, trial_id)?;
        tx.commit()?;
        Ok((view, result.changed))
    }

    pub fn trial_get(&self, trial_id: i64) -> Result<TrialRow, StoreError> {
        trial_row(&self.conn, trial_id)
    }

    pub fn trial_view(&self, trial_id: i64) -> Result<TrialView, StoreError> {
        trial_view_row(&self.conn, trial_id)
    }

    pub fn trials_list(&self, request: TrialsListRequest) -> Result<Vec<TrialView>, StoreError> {
        let limit = to_sqlite_i64(clamp_limit(request.limit))?;
        let status = request.status.map(TrialStatus::as_str);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {TRIAL_COLUMNS}, c.command, c.recent_trial_id, c.owner, c.project_id
            FROM trials t JOIN testcases c ON c.id = t.testcase_id
            WHERE (?1 IS NULL OR c.project_id=?1)
              AND (?2 IS NULL OR t.build_number=?2)
              AND (?3 IS NULL OR t.status=?3)
              AND (?4 IS NULL OR instr(c.command, ?4)=1)
              AND (?5 IS NULL OR instr(c.command, ?5)>0)
            ORDER BY t.id ASC
            LIMIT ?6
            "#
        ))?;
        let rows = stmt.query_map(
            params![
                request.project_id,
                request.build_number,
                status,
                request.command_prefix,
                request.command_contains,
                limit
            ],
            trial_view_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Open one compiling trial per unverified testcase that has no recent
    /// trial yet.
    pub fn trials_create_for_build(
        &mut self,
        request: TrialsForBuildRequest,
    ) -> Result<TrialsForBuildResult, StoreError> {
        let directory = normalize_directory(&request.directory)?;
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        let project = resolve_project(&tx, &request.project)?;
        let version = resolve_version(&tx, project.id, &request.version)?;

        let targets = {
            let mut stmt = tx.prepare(&format!(
                r#"
                SELECT {TESTCASE_COLUMNS} FROM testcases
                WHERE project_id=?1 AND status IN (?2, ?3) AND recent_trial_id IS NULL
                ORDER BY id ASC
                "#
            ))?;
            let rows = stmt.query_map(
                params![
                    project.id,
                    TestcaseStatus::Candidate.as_str(),
                    TestcaseStatus::Candidate2.as_str()
                ],
                testcase_from_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut trials = Vec::with_capacity(targets.len());
        for testcase in &targets {
            let created = insert_trial_tx(
                &tx,
                &TrialCreateRequest {
                    testcase_id: testcase.id,
                    version_id: version.id,
                    directory: directory.clone(),
                    backup: None,
                    build_number: request.build_number,
                    workspace_id: None,
                    status: TrialStatus::Compiling,
                },
                now_ms,
            )?;
            trials.push(created.trial);
        }
        tx.commit()?;

        tracing::info!(
            project_id = project.id,
            version_id = version.id,
            build_number = ?request.build_number,
            trials = trials.len(),
            "created trials for build"
        );
        Ok(TrialsForBuildResult {
            project,
            version,
            trials,
        })
    }
}
