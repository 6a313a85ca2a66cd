#![forbid(unsafe_code)]

use super::projects::{newest_version_id, version_row};
use super::support::{map_insert_conflict, now_ms, today_utc, validate_snapshot_date};
use super::{SnapshotRow, SnapshotTakeRequest, SnapshotTakeResult, SnapshotView, SqliteStore, StoreError};
use rg_core::model::{Bucket, TestcaseStatus};
use rusqlite::{Connection, OptionalExtension, Transaction, params};

const SNAPSHOT_COLUMNS: &str = "id, version_id, date, created_at_ms";

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok(SnapshotRow {
        id: row.get(0)?,
        version_id: row.get(1)?,
        date: row.get(2)?,
        created_at_ms: row.get(3)?,
    })
}

/// Most recently created snapshot of a version: the one kept in sync.
pub(super) fn latest_snapshot(
    conn: &Connection,
    version_id: i64,
) -> Result<Option<SnapshotRow>, StoreError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE version_id=?1 ORDER BY id DESC LIMIT 1"
            ),
            params![version_id],
            snapshot_from_row,
        )
        .optional()?;
    Ok(row)
}

fn snapshot_row(conn: &Connection, snapshot_id: i64) -> Result<SnapshotRow, StoreError> {
    conn.query_row(
        &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id=?1"),
        params![snapshot_id],
        snapshot_from_row,
    )
    .optional()?
    .ok_or(StoreError::UnknownId)
}

/// Insert a dated snapshot and partition every project testcase into it by
/// its current status.
pub(super) fn create_snapshot_tx(
    tx: &Transaction<'_>,
    version_id: i64,
    project_id: i64,
    date: &str,
    now_ms: i64,
) -> Result<SnapshotRow, StoreError> {
    tx.execute(
        "INSERT INTO snapshots(version_id, date, created_at_ms) VALUES (?1, ?2, ?3)",
        params![version_id, date, now_ms],
    )
    .map_err(|err| map_insert_conflict(err, "snapshot already exists for version and date"))?;
    let snapshot = SnapshotRow {
        id: tx.last_insert_rowid(),
        version_id,
        date: date.to_string(),
        created_at_ms: now_ms,
    };
    seed_snapshot_tx(tx, snapshot.id, project_id)?;
    Ok(snapshot)
}

fn seed_snapshot_tx(
    tx: &Transaction<'_>,
    snapshot_id: i64,
    project_id: i64,
) -> Result<(), StoreError> {
    let members = {
        let mut stmt = tx.prepare("SELECT id, status FROM testcases WHERE project_id=?1")?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                super::support::testcase_status_column(row, 1)?,
            ))
        })?;
        rows.collect::<Result<Vec<(i64, TestcaseStatus)>, _>>()?
    };

    let mut insert = tx.prepare(
        "INSERT OR IGNORE INTO snapshot_members(snapshot_id, bucket, testcase_id) VALUES (?1, ?2, ?3)",
    )?;
    for (testcase_id, status) in &members {
        insert.execute(params![snapshot_id, status.bucket().as_str(), testcase_id])?;
    }
    tracing::debug!(snapshot_id, members = members.len(), "seeded snapshot");
    Ok(())
}

/// Live snapshot of a version, created (dated today) when the version has none.
pub(super) fn live_snapshot_tx(
    tx: &Transaction<'_>,
    version_id: i64,
    project_id: i64,
    now_ms: i64,
) -> Result<SnapshotRow, StoreError> {
    if let Some(snapshot) = latest_snapshot(tx, version_id)? {
        return Ok(snapshot);
    }
    create_snapshot_tx(tx, version_id, project_id, &today_utc(), now_ms)
}

/// Live snapshot of the project's newest version; `None` until the project
/// has a version.
pub(super) fn project_live_snapshot_tx(
    tx: &Transaction<'_>,
    project_id: i64,
    now_ms: i64,
) -> Result<Option<SnapshotRow>, StoreError> {
    let Some(version_id) = newest_version_id(tx, project_id)? else {
        return Ok(None);
    };
    live_snapshot_tx(tx, version_id, project_id, now_ms).map(Some)
}

/// Make `bucket` the only bucket of `snapshot_id` holding the testcase.
///
/// Returns `false` without writing when that is already the case.
pub(super) fn move_testcase_tx(
    tx: &Transaction<'_>,
    snapshot_id: i64,
    testcase_id: i64,
    bucket: Bucket,
) -> Result<bool, StoreError> {
    let current = {
        let mut stmt = tx.prepare(
            "SELECT bucket FROM snapshot_members WHERE snapshot_id=?1 AND testcase_id=?2",
        )?;
        let rows = stmt.query_map(params![snapshot_id, testcase_id], |row| {
            row.get::<_, String>(0)
        })?;
        rows.collect::<Result<Vec<String>, _>>()?
    };
    if current.len() == 1 && current[0] == bucket.as_str() {
        return Ok(false);
    }

    tx.execute(
        "DELETE FROM snapshot_members WHERE snapshot_id=?1 AND testcase_id=?2 AND bucket<>?3",
        params![snapshot_id, testcase_id, bucket.as_str()],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO snapshot_members(snapshot_id, bucket, testcase_id) VALUES (?1, ?2, ?3)",
        params![snapshot_id, bucket.as_str(), testcase_id],
    )?;
    tracing::debug!(snapshot_id, testcase_id, bucket = bucket.as_str(), "moved testcase");
    Ok(true)
}

fn snapshot_view(conn: &Connection, snapshot: SnapshotRow) -> Result<SnapshotView, StoreError> {
    let mut view = SnapshotView {
        snapshot,
        passed: Vec::new(),
        failed: Vec::new(),
        todo: Vec::new(),
        unverified: Vec::new(),
    };
    let mut stmt = conn.prepare(
        "SELECT bucket, testcase_id FROM snapshot_members WHERE snapshot_id=?1 ORDER BY testcase_id ASC",
    )?;
    let mut rows = stmt.query(params![view.snapshot.id])?;
    while let Some(row) = rows.next()? {
        let bucket: String = row.get(0)?;
        let testcase_id: i64 = row.get(1)?;
        match Bucket::parse(&bucket) {
            Some(Bucket::Passed) => view.passed.push(testcase_id),
            Some(Bucket::Failed) => view.failed.push(testcase_id),
            Some(Bucket::Todo) => view.todo.push(testcase_id),
            Some(Bucket::Unverified) => view.unverified.push(testcase_id),
            None => {
                tracing::warn!(snapshot_id = view.snapshot.id, bucket, "ignoring unknown bucket");
            }
        }
    }
    Ok(view)
}

impl SqliteStore {
    /// Live snapshot of a version, creating it if the version has none yet.
    pub fn snapshot_live(&mut self, version_id: i64) -> Result<SnapshotView, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let version = version_row(&tx, version_id)?;
        let snapshot = live_snapshot_tx(&tx, version.id, version.project_id, now_ms)?;
        let view = snapshot_view(&tx, snapshot)?;
        tx.commit()?;
        Ok(view)
    }

    pub fn snapshot_get(&self, snapshot_id: i64) -> Result<SnapshotView, StoreError> {
        let snapshot = snapshot_row(&self.conn, snapshot_id)?;
        snapshot_view(&self.conn, snapshot)
    }

    pub fn snapshots_list(&self, version_id: i64) -> Result<Vec<SnapshotRow>, StoreError> {
        version_row(&self.conn, version_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE version_id=?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![version_id], snapshot_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Start a new dated snapshot for the version unless the live one already
    /// carries that date.
    pub fn snapshot_take(
        &mut self,
        request: SnapshotTakeRequest,
    ) -> Result<SnapshotTakeResult, StoreError> {
        let date = match request.date.as_deref() {
            Some(raw) => validate_snapshot_date(raw)?,
            None => today_utc(),
        };
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let version = version_row(&tx, request.version_id)?;

        if let Some(live) = latest_snapshot(&tx, version.id)? {
            if live.date == date {
                return Ok(SnapshotTakeResult {
                    snapshot: live,
                    created: false,
                });
            }
            // ISO dates order lexicographically.
            if date < live.date {
                return Err(StoreError::InvalidInput(
                    "snapshot date precedes the live snapshot",
                ));
            }
        }

        let snapshot = create_snapshot_tx(&tx, version.id, version.project_id, &date, now_ms)?;
        tx.commit()?;
        tracing::info!(
            version_id = version.id,
            snapshot_id = snapshot.id,
            date = %snapshot.date,
            "took snapshot"
        );
        Ok(SnapshotTakeResult {
            snapshot,
            created: true,
        })
    }

    /// Place a testcase in exactly one bucket of a snapshot.
    pub fn snapshot_move_testcase(
        &mut self,
        snapshot_id: i64,
        testcase_id: i64,
        bucket: Bucket,
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        snapshot_row(&tx, snapshot_id)?;
        super::testcases::testcase_row(&tx, testcase_id)?;
        let moved = move_testcase_tx(&tx, snapshot_id, testcase_id, bucket)?;
        tx.commit()?;
        Ok(moved)
    }
}
