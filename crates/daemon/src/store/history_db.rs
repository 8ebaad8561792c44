use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use cadence_common::types::{AggregateStats, CommitAttempt, NewAttempt};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE commit_attempts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    ts              TEXT NOT NULL,
    success         INTEGER NOT NULL,
    commit_hash     TEXT NOT NULL,
    message         TEXT NOT NULL,
    files_changed   INTEGER NOT NULL DEFAULT 0,
    used_ai_message INTEGER NOT NULL DEFAULT 0,
    theme           TEXT NULL,
    push_success    INTEGER NULL,
    error_message   TEXT NULL
);

CREATE INDEX commit_attempts_ts_idx
    ON commit_attempts (ts DESC);

CREATE TABLE aggregate_stats (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    total_commits       INTEGER NOT NULL DEFAULT 0,
    successful_commits  INTEGER NOT NULL DEFAULT 0,
    failed_commits      INTEGER NOT NULL DEFAULT 0,
    total_files_changed INTEGER NOT NULL DEFAULT 0,
    ai_usage_count      INTEGER NOT NULL DEFAULT 0,
    last_commit_time    TEXT NULL
);

INSERT INTO aggregate_stats (id) VALUES (1);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

/// Append-only store of commit attempts plus the always-consistent
/// aggregate row. The attempt insert and the aggregate update happen in
/// one transaction, so readers never see one without the other.
#[derive(Debug)]
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history db parent directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open history db at `{}`", path.display()))?;
        Self::initialize(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("failed to open in-memory history db")?;
        Self::initialize(conn)
    }

    fn initialize(mut conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            ",
        )
        .context("failed to configure sqlite pragmas for history db")?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Persist one attempt and fold it into the aggregate row
    /// atomically. Returns the stored record with its assigned id and
    /// timestamp.
    pub fn append(&self, attempt: &NewAttempt) -> Result<CommitAttempt> {
        let now = Utc::now();
        let mut conn = self.lock();
        let tx = conn.transaction().context("failed to start append transaction")?;

        tx.execute(
            "INSERT INTO commit_attempts
                (ts, success, commit_hash, message, files_changed,
                 used_ai_message, theme, push_success, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                now.to_rfc3339(),
                attempt.success,
                attempt.commit_hash,
                attempt.message,
                attempt.files_changed,
                attempt.used_ai_message,
                attempt.theme,
                attempt.push_success,
                attempt.error_message,
            ],
        )
        .context("failed to insert commit attempt")?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE aggregate_stats SET
                total_commits       = total_commits + 1,
                successful_commits  = successful_commits + ?1,
                failed_commits      = failed_commits + ?2,
                total_files_changed = total_files_changed + ?3,
                ai_usage_count      = ai_usage_count + ?4,
                last_commit_time    = ?5
             WHERE id = 1",
            params![
                attempt.success as i64,
                (!attempt.success) as i64,
                attempt.files_changed,
                attempt.used_ai_message as i64,
                now.to_rfc3339(),
            ],
        )
        .context("failed to update aggregate stats")?;

        tx.commit().context("failed to commit append transaction")?;

        Ok(CommitAttempt {
            id,
            timestamp: now,
            success: attempt.success,
            commit_hash: attempt.commit_hash.clone(),
            message: attempt.message.clone(),
            files_changed: attempt.files_changed,
            used_ai_message: attempt.used_ai_message,
            theme: attempt.theme.clone(),
            push_success: attempt.push_success,
            error_message: attempt.error_message.clone(),
        })
    }

    /// Most recent attempts, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<CommitAttempt>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, ts, success, commit_hash, message, files_changed,
                        used_ai_message, theme, push_success, error_message
                 FROM commit_attempts
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .context("failed to prepare recent query")?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_attempt)
            .context("failed to query recent attempts")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read attempt rows")
    }

    /// Attempts whose message contains `term`, newest first.
    pub fn search(&self, term: &str, limit: usize) -> Result<Vec<CommitAttempt>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, ts, success, commit_hash, message, files_changed,
                        used_ai_message, theme, push_success, error_message
                 FROM commit_attempts
                 WHERE message LIKE ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .context("failed to prepare search query")?;
        let pattern = format!("%{term}%");
        let rows = stmt
            .query_map(params![pattern, limit as i64], row_to_attempt)
            .context("failed to query attempts by message")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to read attempt rows")
    }

    /// Total attempts ever recorded.
    pub fn total(&self) -> Result<u64> {
        let conn = self.lock();
        conn.query_row("SELECT COUNT(*) FROM commit_attempts", [], |row| row.get::<_, i64>(0))
            .map(|count| count as u64)
            .context("failed to count commit attempts")
    }

    /// The aggregate row.
    pub fn stats(&self) -> Result<AggregateStats> {
        let conn = self.lock();
        conn.query_row(
            "SELECT total_commits, successful_commits, failed_commits,
                    total_files_changed, ai_usage_count, last_commit_time
             FROM aggregate_stats WHERE id = 1",
            [],
            |row| {
                Ok(AggregateStats {
                    total_commits: row.get::<_, i64>(0)? as u64,
                    successful_commits: row.get::<_, i64>(1)? as u64,
                    failed_commits: row.get::<_, i64>(2)? as u64,
                    total_files_changed: row.get::<_, i64>(3)? as u64,
                    ai_usage_count: row.get::<_, i64>(4)? as u64,
                    last_commit_time: row
                        .get::<_, Option<String>>(5)?
                        .as_deref()
                        .and_then(parse_timestamp),
                })
            },
        )
        .context("failed to read aggregate stats")
    }

    /// Conventional-commit type histogram over successful commits
    /// ("feat(api): x" counts as "feat").
    pub fn commit_type_counts(&self) -> Result<BTreeMap<String, u64>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT message FROM commit_attempts WHERE success = 1")
            .context("failed to prepare commit type query")?;
        let messages = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("failed to query commit messages")?;

        let mut counts = BTreeMap::new();
        for message in messages {
            let message = message.context("failed to read commit message row")?;
            if let Some(commit_type) = conventional_type(&message) {
                *counts.entry(commit_type).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.lock();
        current_schema_version(&conn)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a writer panicked mid-operation; the
        // transaction it held has rolled back, so the data is intact.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<CommitAttempt> {
    let ts: String = row.get(1)?;
    Ok(CommitAttempt {
        id: row.get(0)?,
        timestamp: parse_timestamp(&ts).unwrap_or_else(Utc::now),
        success: row.get(2)?,
        commit_hash: row.get(3)?,
        message: row.get(4)?,
        files_changed: row.get::<_, i64>(5)? as u32,
        used_ai_message: row.get(6)?,
        theme: row.get(7)?,
        push_success: row.get(8)?,
        error_message: row.get(9)?,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).ok()
}

/// Extract the conventional-commit type from a message subject.
fn conventional_type(message: &str) -> Option<String> {
    let (head, _) = message.split_once(':')?;
    let commit_type = head.split('(').next()?.trim().to_lowercase();
    if commit_type.is_empty() || commit_type.contains(' ') {
        return None;
    }
    Some(commit_type)
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply history db migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    if current_version != MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0) {
        return Err(anyhow!("history db migrations did not reach the latest version"));
    }

    Ok(())
}
