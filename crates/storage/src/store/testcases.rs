#![forbid(unsafe_code)]

use super::projects::project_row;
use super::reconcile::{sync_bucket_tx, write_testcase_status_tx};
use super::support::{clamp_limit, map_insert_conflict, normalize_required, now_ms, to_sqlite_i64};
use super::{
    SqliteStore, StoreError, TestcaseCreateRequest, TestcaseRow, TestcaseUpdateRequest,
    TestcaseUpdateResult, TestcasesListRequest,
};
use rg_core::model::TestcaseStatus;
use rg_core::reconcile::{TestcaseState, decide_testcase_update};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

const MAX_COMMAND_LEN: usize = 4_096;
const MAX_OWNER_LEN: usize = 320;
const NO_TIMEOUT: i64 = -1;

pub(super) const TESTCASE_COLUMNS: &str =
    "id, project_id, key, command, timeout, group_id, owner, status, recent_trial_id";

pub(super) fn testcase_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TestcaseRow> {
    Ok(TestcaseRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        key: row.get(2)?,
        command: row.get(3)?,
        timeout: row.get(4)?,
        group_id: row.get(5)?,
        owner: row.get(6)?,
        status: super::support::testcase_status_column(row, 7)?,
        recent: row.get(8)?,
    })
}

pub(super) fn testcase_row(conn: &Connection, testcase_id: i64) -> Result<TestcaseRow, StoreError> {
    conn.query_row(
        &format!("SELECT {TESTCASE_COLUMNS} FROM testcases WHERE id=?1"),
        params![testcase_id],
        testcase_from_row,
    )
    .optional()?
    .ok_or(StoreError::UnknownId)
}

pub(super) fn testcases_with_status_tx(
    conn: &Connection,
    project_id: i64,
    statuses: &[TestcaseStatus],
) -> Result<Vec<TestcaseRow>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TESTCASE_COLUMNS} FROM testcases WHERE project_id=?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![project_id], testcase_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        let row = row?;
        if statuses.contains(&row.status) {
            out.push(row);
        }
    }
    Ok(out)
}

fn normalize_command(raw: &str) -> Result<String, StoreError> {
    normalize_required(
        raw,
        MAX_COMMAND_LEN,
        "testcase.command must not be empty",
        "testcase.command is too long",
    )
}

fn normalize_timeout(timeout: i64) -> Result<i64, StoreError> {
    if timeout < NO_TIMEOUT {
        return Err(StoreError::InvalidInput("testcase.timeout must be >= -1"));
    }
    Ok(timeout)
}

fn normalize_owner(owner: Option<&str>) -> Result<Option<String>, StoreError> {
    let Some(owner) = owner.map(str::trim).filter(|owner| !owner.is_empty()) else {
        return Ok(None);
    };
    if owner.len() > MAX_OWNER_LEN {
        return Err(StoreError::InvalidInput("testcase.owner is too long"));
    }
    Ok(Some(owner.to_string()))
}

fn ensure_group_in_project(
    tx: &Transaction<'_>,
    group_id: Option<i64>,
    project_id: i64,
) -> Result<(), StoreError> {
    let Some(group_id) = group_id else {
        return Ok(());
    };
    let owner: Option<i64> = tx
        .query_row(
            "SELECT project_id FROM testcase_groups WHERE id=?1",
            params![group_id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        Some(owner) if owner == project_id => Ok(()),
        Some(_) => Err(StoreError::InvalidInput("testcase.group belongs to another project")),
        None => Err(StoreError::UnknownId),
    }
}

impl SqliteStore {
    /// New testcases always start unverified, whatever the caller intended.
    pub fn testcase_create(&mut self, request: TestcaseCreateRequest) -> Result<TestcaseRow, StoreError> {
        let command = normalize_command(&request.command)?;
        let timeout = normalize_timeout(request.timeout.unwrap_or(NO_TIMEOUT))?;
        let owner = normalize_owner(request.owner.as_deref())?;
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        project_row(&tx, request.project_id)?;
        ensure_group_in_project(&tx, request.group_id, request.project_id)?;
        tx.execute(
            r#"
            INSERT INTO testcases(project_id, key, command, timeout, group_id, owner, status, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
            params![
                request.project_id,
                request.key.as_str(),
                command,
                timeout,
                request.group_id,
                owner,
                TestcaseStatus::Candidate.as_str(),
                now_ms
            ],
        )
        .map_err(|err| map_insert_conflict(err, "testcase key already exists in project"))?;
        let testcase_id = tx.last_insert_rowid();
        sync_bucket_tx(&tx, request.project_id, testcase_id, TestcaseStatus::Candidate, now_ms)?;
        let testcase = testcase_row(&tx, testcase_id)?;
        tx.commit()?;

        tracing::info!(
            testcase_id = testcase.id,
            project_id = testcase.project_id,
            key = %testcase.key,
            "created testcase"
        );
        Ok(testcase)
    }

    /// Apply a partial update through the upsert rule: a changed command or
    /// timeout forces `candidate`, and leaving a verdict clears `recent`.
    pub fn testcase_update(
        &mut self,
        request: TestcaseUpdateRequest,
    ) -> Result<TestcaseUpdateResult, StoreError> {
        let command = request.command.as_deref().map(normalize_command).transpose()?;
        let timeout = request.timeout.map(normalize_timeout).transpose()?;
        let owner = match &request.owner {
            Some(owner) => Some(normalize_owner(owner.as_deref())?),
            None => None,
        };
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        let stored = testcase_row(&tx, request.id)?;
        let next_command = command.unwrap_or_else(|| stored.command.clone());
        let next_timeout = timeout.unwrap_or(stored.timeout);
        let next_group = request.group_id.unwrap_or(stored.group_id);
        let next_owner = owner.unwrap_or_else(|| stored.owner.clone());
        ensure_group_in_project(&tx, next_group, stored.project_id)?;

        let decision = decide_testcase_update(
            TestcaseState {
                status: stored.status,
                command: &stored.command,
                timeout: stored.timeout,
            },
            &next_command,
            next_timeout,
            request.status,
        );
        if decision.forced {
            tracing::debug!(testcase_id = stored.id, "command or timeout changed; forcing candidate");
        }

        tx.execute(
            "UPDATE testcases SET command=?2, timeout=?3, group_id=?4, owner=?5 WHERE id=?1",
            params![stored.id, next_command, next_timeout, next_group, next_owner],
        )?;
        write_testcase_status_tx(&tx, stored.id, decision.status, decision.clear_recent, now_ms)?;
        let bucket_moved = sync_bucket_tx(&tx, stored.project_id, stored.id, decision.status, now_ms)?;
        let testcase = testcase_row(&tx, stored.id)?;
        tx.commit()?;

        Ok(TestcaseUpdateResult {
            testcase,
            previous_status: stored.status,
            forced_candidate: decision.forced,
            recent_cleared: decision.clear_recent && stored.recent.is_some(),
            bucket_moved,
        })
    }

    pub fn testcase_get(&self, testcase_id: i64) -> Result<TestcaseRow, StoreError> {
        testcase_row(&self.conn, testcase_id)
    }

    pub fn testcases_list(&self, request: TestcasesListRequest) -> Result<Vec<TestcaseRow>, StoreError> {
        project_row(&self.conn, request.project_id)?;
        let limit = to_sqlite_i64(clamp_limit(request.limit))?;
        let status = request.status.map(TestcaseStatus::as_str);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {TESTCASE_COLUMNS} FROM testcases
            WHERE project_id=?1 AND (?2 IS NULL OR status=?2)
            ORDER BY id ASC
            LIMIT ?3
            "#
        ))?;
        let rows = stmt.query_map(params![request.project_id, status, limit], testcase_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
