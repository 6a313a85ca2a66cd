#![forbid(unsafe_code)]

use super::StoreError;
use rusqlite::{Connection, params};

const SCHEMA_VERSION: &str = "1";

pub(super) fn install(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          url TEXT NOT NULL UNIQUE,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS testcase_groups (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
          name TEXT NOT NULL,
          UNIQUE (project_id, name)
        );

        CREATE TABLE IF NOT EXISTS versions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
          name TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE (project_id, name)
        );

        CREATE TABLE IF NOT EXISTS testcases (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
          key TEXT NOT NULL,
          command TEXT NOT NULL,
          timeout INTEGER NOT NULL DEFAULT -1,
          group_id INTEGER REFERENCES testcase_groups(id) ON DELETE SET NULL,
          owner TEXT,
          status TEXT NOT NULL DEFAULT 'candidate',
          recent_trial_id INTEGER REFERENCES trials(id) ON DELETE SET NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          UNIQUE (project_id, key)
        );

        CREATE TABLE IF NOT EXISTS workspaces (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          path TEXT NOT NULL UNIQUE,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trials (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          testcase_id INTEGER NOT NULL REFERENCES testcases(id) ON DELETE CASCADE,
          version_id INTEGER NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
          status TEXT NOT NULL DEFAULT 'compiling',
          directory TEXT NOT NULL,
          backup TEXT,
          build_number INTEGER,
          workspace_id INTEGER REFERENCES workspaces(id) ON DELETE SET NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stubs (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
          name TEXT NOT NULL,
          workspace_id INTEGER REFERENCES workspaces(id) ON DELETE SET NULL,
          UNIQUE (project_id, name)
        );

        CREATE TABLE IF NOT EXISTS snapshots (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          version_id INTEGER NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
          date TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE (version_id, date)
        );

        CREATE TABLE IF NOT EXISTS snapshot_members (
          snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
          bucket TEXT NOT NULL,
          testcase_id INTEGER NOT NULL REFERENCES testcases(id) ON DELETE CASCADE,
          PRIMARY KEY (snapshot_id, bucket, testcase_id)
        );

        CREATE TABLE IF NOT EXISTS outbox (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          action TEXT NOT NULL,
          trial_id INTEGER NOT NULL,
          owner TEXT,
          project_id INTEGER NOT NULL,
          command TEXT NOT NULL,
          build_number INTEGER,
          created_at_ms INTEGER NOT NULL,
          sent_at_ms INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_testcases_project_status ON testcases(project_id, status);
        CREATE INDEX IF NOT EXISTS idx_trials_testcase ON trials(testcase_id);
        CREATE INDEX IF NOT EXISTS idx_trials_build_status ON trials(build_number, status);
        CREATE INDEX IF NOT EXISTS idx_snapshot_members_testcase ON snapshot_members(snapshot_id, testcase_id);
        CREATE INDEX IF NOT EXISTS idx_outbox_unsent ON outbox(sent_at_ms, seq);
        "#,
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", SCHEMA_VERSION],
    )?;
    Ok(())
}
