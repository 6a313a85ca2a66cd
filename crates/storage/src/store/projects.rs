#![forbid(unsafe_code)]

use super::reconcile::write_testcase_status_tx;
use super::snapshots::create_snapshot_tx;
use super::support::{map_insert_conflict, normalize_required, now_ms, today_utc};
use super::testcases::testcases_with_status_tx;
use super::{
    GroupCreateRequest, GroupRow, ProjectCreateRequest, ProjectRow, Reclassified, SqliteStore,
    StoreError, VersionCreateRequest, VersionCreateResult, VersionRow,
};
use rg_core::ids::{MAX_NAME_LEN, Specifier};
use rg_core::model::TestcaseStatus;
use rg_core::reconcile::{TestcaseState, decide_testcase_update, reclassify_for_new_version};
use rusqlite::{Connection, OptionalExtension, params};

const MAX_URL_LEN: usize = 1_024;

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
    })
}

fn version_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok(VersionRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
    })
}

pub(super) fn project_row(conn: &Connection, project_id: i64) -> Result<ProjectRow, StoreError> {
    conn.query_row(
        "SELECT id, name, url FROM projects WHERE id=?1",
        params![project_id],
        project_from_row,
    )
    .optional()?
    .ok_or(StoreError::UnknownId)
}

pub(super) fn resolve_project(
    conn: &Connection,
    specifier: &Specifier,
) -> Result<ProjectRow, StoreError> {
    let row = match specifier {
        Specifier::Id(id) => conn
            .query_row(
                "SELECT id, name, url FROM projects WHERE id=?1",
                params![id],
                project_from_row,
            )
            .optional()?,
        Specifier::Name(name) => conn
            .query_row(
                "SELECT id, name, url FROM projects WHERE name=?1 ORDER BY id ASC LIMIT 1",
                params![name],
                project_from_row,
            )
            .optional()?,
    };
    row.ok_or_else(|| StoreError::NotFound {
        kind: "project",
        specifier: specifier.to_string(),
    })
}

pub(super) fn version_row(conn: &Connection, version_id: i64) -> Result<VersionRow, StoreError> {
    conn.query_row(
        "SELECT id, project_id, name FROM versions WHERE id=?1",
        params![version_id],
        version_from_row,
    )
    .optional()?
    .ok_or(StoreError::UnknownId)
}

/// Versions are only looked up inside their project.
pub(super) fn resolve_version(
    conn: &Connection,
    project_id: i64,
    specifier: &Specifier,
) -> Result<VersionRow, StoreError> {
    let row = match specifier {
        Specifier::Id(id) => conn
            .query_row(
                "SELECT id, project_id, name FROM versions WHERE project_id=?1 AND id=?2",
                params![project_id, id],
                version_from_row,
            )
            .optional()?,
        Specifier::Name(name) => conn
            .query_row(
                "SELECT id, project_id, name FROM versions WHERE project_id=?1 AND name=?2",
                params![project_id, name],
                version_from_row,
            )
            .optional()?,
    };
    row.ok_or_else(|| StoreError::NotFound {
        kind: "version",
        specifier: specifier.to_string(),
    })
}

pub(super) fn newest_version_id(
    conn: &Connection,
    project_id: i64,
) -> Result<Option<i64>, StoreError> {
    let id = conn
        .query_row(
            "SELECT id FROM versions WHERE project_id=?1 ORDER BY id DESC LIMIT 1",
            params![project_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(id)
}

impl SqliteStore {
    pub fn project_create(&mut self, request: ProjectCreateRequest) -> Result<ProjectRow, StoreError> {
        let name = normalize_required(
            &request.name,
            MAX_NAME_LEN,
            "project.name must not be empty",
            "project.name is too long",
        )?;
        let url = normalize_required(
            &request.url,
            MAX_URL_LEN,
            "project.url must not be empty",
            "project.url is too long",
        )?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO projects(name, url, created_at_ms) VALUES (?1, ?2, ?3)",
            params![name, url, now_ms()],
        )
        .map_err(|err| map_insert_conflict(err, "project url already registered"))?;
        let project = ProjectRow {
            id: tx.last_insert_rowid(),
            name,
            url,
        };
        tx.commit()?;
        tracing::info!(project_id = project.id, name = %project.name, "created project");
        Ok(project)
    }

    pub fn project_get(&self, project_id: i64) -> Result<ProjectRow, StoreError> {
        project_row(&self.conn, project_id)
    }

    pub fn project_resolve(&self, specifier: &Specifier) -> Result<ProjectRow, StoreError> {
        resolve_project(&self.conn, specifier)
    }

    pub fn projects_list(&self) -> Result<Vec<ProjectRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, url FROM projects ORDER BY id ASC")?;
        let rows = stmt.query_map([], project_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn group_create(&mut self, request: GroupCreateRequest) -> Result<GroupRow, StoreError> {
        let name = normalize_required(
            &request.name,
            MAX_NAME_LEN,
            "group.name must not be empty",
            "group.name is too long",
        )?;
        let tx = self.conn.transaction()?;
        project_row(&tx, request.project_id)?;
        tx.execute(
            "INSERT INTO testcase_groups(project_id, name) VALUES (?1, ?2)",
            params![request.project_id, name],
        )
        .map_err(|err| map_insert_conflict(err, "group name already exists in project"))?;
        let group = GroupRow {
            id: tx.last_insert_rowid(),
            project_id: request.project_id,
            name,
        };
        tx.commit()?;
        Ok(group)
    }

    /// Register a new version and re-open verification for the whole project.
    ///
    /// Within one transaction: verdicts are invalidated (passed to candidate2,
    /// failed to candidate), stale trials of still-unverified testcases are
    /// deleted, and a snapshot of the resulting state is created for the
    /// version. Any failure leaves the project untouched.
    pub fn version_create(
        &mut self,
        request: VersionCreateRequest,
    ) -> Result<VersionCreateResult, StoreError> {
        let name = normalize_required(
            &request.name,
            MAX_NAME_LEN,
            "version.name must not be empty",
            "version.name is too long",
        )?;
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        let project = project_row(&tx, request.project_id)?;
        tx.execute(
            "INSERT INTO versions(project_id, name, created_at_ms) VALUES (?1, ?2, ?3)",
            params![project.id, name, now_ms],
        )
        .map_err(|err| map_insert_conflict(err, "version name already exists in project"))?;
        let version = VersionRow {
            id: tx.last_insert_rowid(),
            project_id: project.id,
            name,
        };

        let mut reclassified = Vec::new();
        for testcase in testcases_with_status_tx(
            &tx,
            project.id,
            &[TestcaseStatus::Passed, TestcaseStatus::Failed],
        )? {
            let Some(next) = reclassify_for_new_version(testcase.status) else {
                continue;
            };
            let decision = decide_testcase_update(
                TestcaseState {
                    status: testcase.status,
                    command: &testcase.command,
                    timeout: testcase.timeout,
                },
                &testcase.command,
                testcase.timeout,
                Some(next),
            );
            write_testcase_status_tx(&tx, testcase.id, decision.status, decision.clear_recent, now_ms)?;
            reclassified.push(Reclassified {
                testcase_id: testcase.id,
                from: testcase.status,
                to: decision.status,
            });
        }

        let stale = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id, recent_trial_id FROM testcases
                WHERE project_id=?1 AND status IN ('candidate', 'candidate2') AND recent_trial_id IS NOT NULL
                ORDER BY id ASC
                "#,
            )?;
            let rows = stmt.query_map(params![project.id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let mut invalidated_trials = Vec::with_capacity(stale.len());
        for (testcase_id, trial_id) in stale {
            tx.execute(
                "UPDATE testcases SET recent_trial_id=NULL, updated_at_ms=?2 WHERE id=?1",
                params![testcase_id, now_ms],
            )?;
            tx.execute("DELETE FROM trials WHERE id=?1", params![trial_id])?;
            // An undelivered dispatch would start a trial that no longer exists.
            let superseded = tx.execute(
                "DELETE FROM outbox WHERE trial_id=?1 AND sent_at_ms IS NULL",
                params![trial_id],
            )?;
            if superseded > 0 {
                tracing::debug!(trial_id, superseded, "dropped queued notifications of invalidated trial");
            }
            invalidated_trials.push(trial_id);
        }

        let snapshot = create_snapshot_tx(&tx, version.id, project.id, &today_utc(), now_ms)?;
        tx.commit()?;

        tracing::info!(
            project_id = project.id,
            version_id = version.id,
            reclassified = reclassified.len(),
            invalidated = invalidated_trials.len(),
            snapshot_id = snapshot.id,
            "created version"
        );
        Ok(VersionCreateResult {
            version,
            reclassified,
            invalidated_trials,
            snapshot,
        })
    }

    pub fn version_get(&self, version_id: i64) -> Result<VersionRow, StoreError> {
        version_row(&self.conn, version_id)
    }

    pub fn version_resolve(
        &self,
        project_id: i64,
        specifier: &Specifier,
    ) -> Result<VersionRow, StoreError> {
        resolve_version(&self.conn, project_id, specifier)
    }

    pub fn versions_list(&self, project_id: i64) -> Result<Vec<VersionRow>, StoreError> {
        project_row(&self.conn, project_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, name FROM versions WHERE project_id=?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![project_id], version_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
