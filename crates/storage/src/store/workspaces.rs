#![forbid(unsafe_code)]

use super::projects::project_row;
use super::support::{normalize_required, now_ms};
use super::trials::{TRIAL_COLUMNS, transition_trial_tx, trial_from_row};
use super::{
    SqliteStore, StoreError, StubFinishRequest, StubFinishResult, StubRow, WorkspaceDeleteOutcome,
    WorkspacePostRequest, WorkspacePostResult, WorkspaceRow,
};
use rg_core::ids::MAX_NAME_LEN;
use rg_core::model::TrialStatus;
use rusqlite::{Connection, OptionalExtension, params};

const MAX_PATH_LEN: usize = 4_096;

fn workspace_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceRow> {
    Ok(WorkspaceRow {
        id: row.get(0)?,
        path: row.get(1)?,
    })
}

fn workspace_row(conn: &Connection, workspace_id: i64) -> Result<WorkspaceRow, StoreError> {
    conn.query_row(
        "SELECT id, path FROM workspaces WHERE id=?1",
        params![workspace_id],
        workspace_from_row,
    )
    .optional()?
    .ok_or(StoreError::UnknownId)
}

fn normalize_stub(raw: &str) -> Result<String, StoreError> {
    normalize_required(
        raw,
        MAX_NAME_LEN,
        "stub must not be empty",
        "stub is too long",
    )
}

impl SqliteStore {
    /// Register a compile workspace for a stub and point the build's matching
    /// trials at it.
    pub fn workspace_post(
        &mut self,
        request: WorkspacePostRequest,
    ) -> Result<WorkspacePostResult, StoreError> {
        let path = normalize_required(
            &request.path,
            MAX_PATH_LEN,
            "workspace.path must not be empty",
            "workspace.path is too long",
        )?;
        let stub_name = normalize_stub(&request.stub)?;
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        project_row(&tx, request.project_id)?;

        tx.execute(
            "INSERT OR IGNORE INTO workspaces(path, created_at_ms) VALUES (?1, ?2)",
            params![path, now_ms],
        )?;
        let workspace = tx.query_row(
            "SELECT id, path FROM workspaces WHERE path=?1",
            params![path],
            workspace_from_row,
        )?;

        tx.execute(
            r#"
            INSERT INTO stubs(project_id, name, workspace_id) VALUES (?1, ?2, ?3)
            ON CONFLICT(project_id, name) DO UPDATE SET workspace_id=excluded.workspace_id
            "#,
            params![request.project_id, stub_name, workspace.id],
        )?;
        let stub = tx.query_row(
            "SELECT id, project_id, name, workspace_id FROM stubs WHERE project_id=?1 AND name=?2",
            params![request.project_id, stub_name],
            |row| {
                Ok(StubRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    workspace_id: row.get(3)?,
                })
            },
        )?;

        let match_sql = r#"
            FROM trials t JOIN testcases c ON c.id = t.testcase_id
            WHERE c.project_id=?1 AND t.build_number IS ?2 AND instr(c.command, ?3)=1
        "#;
        tx.execute(
            &format!("UPDATE trials SET workspace_id=?4, updated_at_ms=?5 WHERE id IN (SELECT t.id {match_sql})"),
            params![request.project_id, request.build_number, stub.name, workspace.id, now_ms],
        )?;
        let trials = {
            let mut stmt = tx.prepare(&format!("SELECT {TRIAL_COLUMNS} {match_sql} ORDER BY t.id ASC"))?;
            let rows = stmt.query_map(
                params![request.project_id, request.build_number, stub.name],
                trial_from_row,
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;

        tracing::info!(
            workspace_id = workspace.id,
            stub_id = stub.id,
            trials = trials.len(),
            "workspace posted"
        );
        Ok(WorkspacePostResult {
            workspace,
            stub,
            trials,
        })
    }

    /// Move the build's compiling trials whose command mentions the stub to
    /// pending, queueing a dispatch for each.
    pub fn stub_finish(&mut self, request: StubFinishRequest) -> Result<StubFinishResult, StoreError> {
        let stub_name = normalize_stub(&request.stub)?;
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        let ids = {
            let mut stmt = tx.prepare(
                r#"
                SELECT t.id FROM trials t JOIN testcases c ON c.id = t.testcase_id
                WHERE t.build_number IS ?1 AND t.status=?2 AND instr(c.command, ?3)>0
                ORDER BY t.id ASC
                "#,
            )?;
            let rows = stmt.query_map(
                params![request.build_number, TrialStatus::Compiling.as_str(), stub_name],
                |row| row.get::<_, i64>(0),
            )?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut trials = Vec::with_capacity(ids.len());
        let mut notifications = Vec::new();
        for trial_id in ids {
            let result = transition_trial_tx(&tx, trial_id, TrialStatus::Pending, now_ms)?;
            notifications.extend(result.notifications);
            trials.push(result.trial);
        }
        tx.commit()?;

        tracing::info!(
            stub = %stub_name,
            build_number = ?request.build_number,
            trials = trials.len(),
            "stub finished"
        );
        Ok(StubFinishResult {
            trials,
            notifications,
        })
    }

    pub fn workspace_get(&self, workspace_id: i64) -> Result<WorkspaceRow, StoreError> {
        workspace_row(&self.conn, workspace_id)
    }

    /// Delete the workspace once no active trial and no stub uses it.
    pub fn workspace_try_delete(
        &mut self,
        workspace_id: i64,
    ) -> Result<WorkspaceDeleteOutcome, StoreError> {
        let tx = self.conn.transaction()?;
        workspace_row(&tx, workspace_id)?;
        let active_trials: i64 = tx.query_row(
            "SELECT COUNT(*) FROM trials WHERE workspace_id=?1 AND status IN (?2, ?3, ?4)",
            params![
                workspace_id,
                TrialStatus::Compiling.as_str(),
                TrialStatus::Pending.as_str(),
                TrialStatus::Running.as_str()
            ],
            |row| row.get(0),
        )?;
        let stubs: i64 = tx.query_row(
            "SELECT COUNT(*) FROM stubs WHERE workspace_id=?1",
            params![workspace_id],
            |row| row.get(0),
        )?;
        if active_trials > 0 || stubs > 0 {
            return Ok(WorkspaceDeleteOutcome::InUse {
                active_trials: u64::try_from(active_trials).unwrap_or(0),
                stubs: u64::try_from(stubs).unwrap_or(0),
            });
        }
        tx.execute("DELETE FROM workspaces WHERE id=?1", params![workspace_id])?;
        tx.commit()?;
        tracing::info!(workspace_id, "deleted workspace");
        Ok(WorkspaceDeleteOutcome::Deleted)
    }
}
