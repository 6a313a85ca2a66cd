#![forbid(unsafe_code)]

use super::support::{clamp_limit, now_ms, to_sqlite_i64};
use super::{OutboxAction, OutboxRow, SqliteStore, StoreError, TestcaseRow, TrialRow};
use rusqlite::{Transaction, params};
use rusqlite::types::Type;
use std::time::Duration;

const OUTBOX_COLUMNS: &str =
    "seq, action, trial_id, owner, project_id, command, build_number, created_at_ms, sent_at_ms";

fn outbox_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxRow> {
    let action: String = row.get(1)?;
    let action = OutboxAction::parse(&action).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, format!("unknown outbox action {action:?}").into())
    })?;
    Ok(OutboxRow {
        seq: row.get(0)?,
        action,
        trial_id: row.get(2)?,
        owner: row.get(3)?,
        project_id: row.get(4)?,
        command: row.get(5)?,
        build_number: row.get(6)?,
        created_at_ms: row.get(7)?,
        sent_at_ms: row.get(8)?,
    })
}

/// Queue a notification in the triggering transaction; the channel delivers it
/// after commit.
pub(super) fn enqueue_tx(
    tx: &Transaction<'_>,
    action: OutboxAction,
    trial: &TrialRow,
    testcase: &TestcaseRow,
    now_ms: i64,
) -> Result<OutboxRow, StoreError> {
    tx.execute(
        r#"
        INSERT INTO outbox(action, trial_id, owner, project_id, command, build_number, created_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            action.as_str(),
            trial.id,
            testcase.owner,
            testcase.project_id,
            testcase.command,
            trial.build_number,
            now_ms
        ],
    )?;
    let row = OutboxRow {
        seq: tx.last_insert_rowid(),
        action,
        trial_id: trial.id,
        owner: testcase.owner.clone(),
        project_id: testcase.project_id,
        command: testcase.command.clone(),
        build_number: trial.build_number,
        created_at_ms: now_ms,
        sent_at_ms: None,
    };
    tracing::debug!(seq = row.seq, action = action.as_str(), trial_id = trial.id, "queued notification");
    Ok(row)
}

impl SqliteStore {
    /// Undelivered notifications, oldest first.
    pub fn outbox_pending(&self, limit: usize) -> Result<Vec<OutboxRow>, StoreError> {
        let limit = to_sqlite_i64(clamp_limit(limit))?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE sent_at_ms IS NULL ORDER BY seq ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], outbox_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns `false` if the row was already marked.
    pub fn outbox_mark_sent(&mut self, seq: i64) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM outbox WHERE seq=?1)",
            params![seq],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::UnknownId);
        }
        let updated = tx.execute(
            "UPDATE outbox SET sent_at_ms=?2 WHERE seq=?1 AND sent_at_ms IS NULL",
            params![seq, now_ms()],
        )?;
        tx.commit()?;
        Ok(updated > 0)
    }

    /// Delete rows delivered at least `retention` ago. Undelivered rows are
    /// never pruned.
    pub fn outbox_prune_sent(&mut self, retention: Duration) -> Result<usize, StoreError> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms().saturating_sub(retention_ms);
        let pruned = self.conn.execute(
            "DELETE FROM outbox WHERE sent_at_ms IS NOT NULL AND sent_at_ms <= ?1",
            params![cutoff],
        )?;
        if pruned > 0 {
            tracing::debug!(pruned, "pruned delivered notifications");
        }
        Ok(pruned)
    }

    pub fn outbox_backlog(&self) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM outbox WHERE sent_at_ms IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
