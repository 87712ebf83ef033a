//! Storage layer for taskmgr: a single SQLite database.
//!
//! Reads go through `&self`. Writes that must be atomic go through a
//! transaction from [`Storage::begin_write`] and the associated functions
//! that take a `&Connection` (a `Transaction` derefs to one).

use crate::query::{HistoryFilter, TaskFilter, View};
use crate::reindex::{PriorityIndex, Shift, Slot};
use crate::types::{History, Schedule, Status, Task, TaskCounts, User};
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use eyre::{Context, Result, bail};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, ToSql, Transaction, TransactionBehavior, params};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Storage directory name.
pub const STORE_DIR: &str = ".taskmgr";

/// SQLite database file.
const DB_FILE: &str = "taskmgr.db";

/// Current schema version, kept in the meta table.
const SCHEMA_VERSION: u32 = 1;

/// Column list shared by every task SELECT; order matches `row_to_task`.
const TASK_COLUMNS: &str = "id, owner, title, description, status, priority, completed, deleted, created_at, updated_at";

/// Storage handle for reading/writing taskmgr data.
pub struct Storage {
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path, busy_timeout: Duration) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        fs::create_dir_all(&store_dir).context("Failed to create .taskmgr directory")?;

        let storage = Self::connect(root, busy_timeout)?;
        storage.init_schema()?;
        Ok(storage)
    }

    /// Open existing storage.
    pub fn open(root: &Path, busy_timeout: Duration) -> Result<Self> {
        let db_path = root.join(STORE_DIR).join(DB_FILE);
        if !db_path.exists() {
            bail!("No .taskmgr store found in {}. Run 'tm init' first.", root.display());
        }

        let storage = Self::connect(root, busy_timeout)?;
        storage.check_schema_version()?;
        Ok(storage)
    }

    fn connect(root: &Path, busy_timeout: Duration) -> Result<Self> {
        let db_path = root.join(STORE_DIR).join(DB_FILE);
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;

        db.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("Failed to set connection pragmas")?;
        db.busy_timeout(busy_timeout).context("Failed to set busy timeout")?;

        Ok(Self { db })
    }

    /// Initialize SQLite schema.
    fn init_schema(&self) -> Result<()> {
        self.db
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    username TEXT PRIMARY KEY,
                    email TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    owner TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL CHECK (status IN ('PENDING', 'IN_PROGRESS', 'COMPLETED', 'CANCELLED')),
                    priority INTEGER NOT NULL CHECK (priority >= 1),
                    completed INTEGER NOT NULL DEFAULT 0,
                    deleted INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_tasks_active_priority
                    ON tasks(owner, completed, deleted, priority);

                CREATE TABLE IF NOT EXISTS history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    previous_status TEXT NOT NULL,
                    new_status TEXT NOT NULL,
                    changed_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_history_task ON history(task_id);

                CREATE TABLE IF NOT EXISTS schedules (
                    owner TEXT PRIMARY KEY REFERENCES users(username) ON DELETE CASCADE,
                    time TEXT NOT NULL,
                    last_sent_at TEXT
                );

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
            "#,
            )
            .context("Failed to initialize schema")?;

        self.db.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        self.check_schema_version()
    }

    /// Refuse stores written by a newer schema. Takes no write lock.
    fn check_schema_version(&self) -> Result<()> {
        let stored: String = self
            .db
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))?;
        let stored: u32 = stored.parse().context("Corrupt schema_version in meta table")?;
        if stored > SCHEMA_VERSION {
            bail!(
                "Store schema version {} is newer than this build supports ({})",
                stored,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Start a write transaction.
    ///
    /// `BEGIN IMMEDIATE` takes SQLite's reserved lock up front, before any
    /// read, so a competing writer waits (up to the busy timeout) instead of
    /// reading priorities that are about to change.
    pub fn begin_write(&mut self) -> Result<Transaction<'_>> {
        self.db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin write transaction")
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.db
    }

    // ========================================================================
    // Task writes (inside a transaction)
    // ========================================================================

    /// Find a task by id regardless of owner or deleted flag.
    pub fn find_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        let task = conn.query_row(&sql, params![id], row_to_task).optional()?;
        Ok(task)
    }

    /// Insert or update a task row.
    ///
    /// Uses an upsert rather than `INSERT OR REPLACE`: replace deletes the old
    /// row first, which would cascade to its history.
    pub fn put_task(conn: &Connection, task: &Task) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO tasks (id, owner, title, description, status, priority, completed, deleted, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                priority = excluded.priority,
                completed = excluded.completed,
                deleted = excluded.deleted,
                updated_at = excluded.updated_at
            "#,
            params![
                task.id,
                task.user,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority,
                task.completed,
                task.deleted,
                format_ts(&task.created_at),
                format_ts(&task.updated_at),
            ],
        )
        .with_context(|| format!("Failed to write task {}", task.id))?;

        Ok(())
    }

    /// Append a status transition.
    pub fn append_history(
        conn: &Connection,
        task_id: &str,
        previous: Status,
        new: Status,
        changed_at: &DateTime<Utc>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO history (task_id, previous_status, new_status, changed_at) VALUES (?, ?, ?, ?)",
            params![task_id, previous.as_str(), new.as_str(), format_ts(changed_at)],
        )
        .context("Failed to append history")?;
        Ok(())
    }

    // ========================================================================
    // Task reads
    // ========================================================================

    /// Get a visible (owned, not deleted) task.
    pub fn get_task(&self, user: &str, id: &str) -> Result<Option<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE id = ? AND owner = ? AND deleted = 0",
            TASK_COLUMNS
        );
        let task = self.db.query_row(&sql, params![id, user], row_to_task).optional()?;
        Ok(task)
    }

    /// Query a user's tasks, highest priority first.
    pub fn query_tasks(&self, user: &str, filter: &TaskFilter) -> Result<Vec<Task>> {
        let (where_sql, mut args) = where_clause(user, filter);
        let mut sql = format!(
            "SELECT {} FROM tasks WHERE {} ORDER BY priority ASC, created_at ASC",
            TASK_COLUMNS, where_sql
        );

        match (filter.limit, filter.offset) {
            (Some(limit), offset) => {
                args.push(Box::new(limit as i64));
                sql.push_str(&format!(" LIMIT ?{}", args.len()));
                if let Some(offset) = offset {
                    args.push(Box::new(offset as i64));
                    sql.push_str(&format!(" OFFSET ?{}", args.len()));
                }
            }
            (None, Some(offset)) => {
                args.push(Box::new(offset as i64));
                sql.push_str(&format!(" LIMIT -1 OFFSET ?{}", args.len()));
            }
            (None, None) => {}
        }

        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let mut stmt = self.db.prepare(&sql)?;
        let tasks = stmt
            .query_map(arg_refs.as_slice(), row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tasks)
    }

    /// Count a user's tasks matching `filter`, ignoring limit and offset.
    pub fn count_tasks(&self, user: &str, filter: &TaskFilter) -> Result<usize> {
        let (where_sql, args) = where_clause(user, filter);
        let sql = format!("SELECT COUNT(*) FROM tasks WHERE {}", where_sql);

        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let count: i64 = self.db.query_row(&sql, arg_refs.as_slice(), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Total and completed counts over non-deleted tasks.
    pub fn counts(&self, user: &str) -> Result<TaskCounts> {
        let (total, completed): (i64, i64) = self.db.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(completed), 0)
            FROM tasks WHERE owner = ? AND deleted = 0
            "#,
            params![user],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(TaskCounts {
            total: total as usize,
            completed: completed as usize,
        })
    }

    /// Non-deleted task counts per status. Every status is present.
    pub fn status_counts(&self, user: &str) -> Result<HashMap<Status, usize>> {
        let mut counts: HashMap<Status, usize> = Status::ALL.iter().map(|s| (*s, 0)).collect();

        let mut stmt = self
            .db
            .prepare("SELECT status, COUNT(*) FROM tasks WHERE owner = ? AND deleted = 0 GROUP BY status")?;
        let rows = stmt.query_map(params![user], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((parse_status(0, &status)?, count as usize))
        })?;

        for row in rows {
            let (status, count) = row?;
            counts.insert(status, count);
        }

        Ok(counts)
    }

    /// Status transitions of a task matching `filter`, oldest first.
    pub fn history(&self, task_id: &str, filter: &HistoryFilter) -> Result<Vec<History>> {
        let mut sql = String::from(
            r#"
            SELECT h.task_id, t.title, h.previous_status, h.new_status, h.changed_at
            FROM history h
            JOIN tasks t ON t.id = h.task_id
            WHERE h.task_id = ?1"#,
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(task_id.to_string())];

        if let Some(status) = filter.previous_status {
            args.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND h.previous_status = ?{}", args.len()));
        }
        if let Some(status) = filter.new_status {
            args.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND h.new_status = ?{}", args.len()));
        }
        if let Some(day) = filter.changed_on {
            args.push(Box::new(day.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(" AND substr(h.changed_at, 1, 10) = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY h.id ASC");

        let mut stmt = self.db.prepare(&sql)?;
        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

        let history = stmt
            .query_map(arg_refs.as_slice(), |row| {
                let previous: String = row.get(2)?;
                let new: String = row.get(3)?;
                let changed_at: String = row.get(4)?;
                Ok(History {
                    task_id: row.get(0)?,
                    title: row.get(1)?,
                    previous_status: parse_status(2, &previous)?,
                    new_status: parse_status(3, &new)?,
                    changed_at: parse_ts(4, &changed_at)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(history)
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Insert a user. Returns false if the username is taken.
    pub fn insert_user(&self, user: &User) -> Result<bool> {
        let changed = self.db.execute(
            "INSERT OR IGNORE INTO users (username, email, created_at) VALUES (?, ?, ?)",
            params![user.username, user.email, format_ts(&user.created_at)],
        )?;
        Ok(changed == 1)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .db
            .query_row(
                "SELECT username, email, created_at FROM users WHERE username = ?",
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Check a user exists, from inside a transaction.
    pub fn user_exists(conn: &Connection, username: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .db
            .prepare("SELECT username, email, created_at FROM users ORDER BY username")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    // ========================================================================
    // Schedules
    // ========================================================================

    /// Set a user's digest time. `last_sent_at` is kept so a reschedule on
    /// the same day does not send twice.
    pub fn upsert_schedule(&self, user: &str, time: NaiveTime) -> Result<()> {
        self.db.execute(
            r#"
            INSERT INTO schedules (owner, time, last_sent_at) VALUES (?1, ?2, NULL)
            ON CONFLICT(owner) DO UPDATE SET time = excluded.time
            "#,
            params![user, format_time(&time)],
        )?;
        Ok(())
    }

    pub fn get_schedule(&self, user: &str) -> Result<Option<Schedule>> {
        let schedule = self
            .db
            .query_row(
                "SELECT owner, time, last_sent_at FROM schedules WHERE owner = ?",
                params![user],
                row_to_schedule,
            )
            .optional()?;
        Ok(schedule)
    }

    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let mut stmt = self
            .db
            .prepare("SELECT owner, time, last_sent_at FROM schedules ORDER BY owner")?;
        let schedules = stmt
            .query_map([], row_to_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schedules)
    }

    /// Record a successful digest hand-off.
    pub fn mark_sent(&self, user: &str, at: &DateTime<Utc>) -> Result<()> {
        self.db.execute(
            "UPDATE schedules SET last_sent_at = ? WHERE owner = ?",
            params![format_ts(at), user],
        )?;
        Ok(())
    }
}

/// The reindexer's view of the database.
///
/// Only valid inside a transaction opened by [`Storage::begin_write`]; the
/// reserved lock it holds is what keeps the candidate rows stable.
impl PriorityIndex for Connection {
    fn lock_candidates(&self, user: &str, from: u32, exclude_id: &str) -> Result<Vec<Slot>> {
        if self.is_autocommit() {
            bail!("priority reindexing requires an open write transaction");
        }

        let mut stmt = self.prepare_cached(
            r#"
            SELECT id, priority FROM tasks
            WHERE owner = ?1 AND completed = 0 AND deleted = 0 AND priority >= ?2 AND id != ?3
            ORDER BY priority ASC, created_at ASC
            "#,
        )?;

        let slots = stmt
            .query_map(params![user, from, exclude_id], |row| {
                Ok(Slot {
                    id: row.get(0)?,
                    priority: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(slots)
    }

    fn apply_shifts(&self, shifts: &[Shift]) -> Result<()> {
        if self.is_autocommit() {
            bail!("priority reindexing requires an open write transaction");
        }

        let now = format_ts(&Utc::now());
        let mut stmt = self.prepare_cached("UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3 AND priority = ?4")?;

        for shift in shifts {
            let changed = stmt
                .execute(params![shift.to, now, shift.id, shift.from])
                .with_context(|| format!("Failed to shift task {} to priority {}", shift.id, shift.to))?;
            if changed != 1 {
                bail!("task {} moved while being shifted from priority {}", shift.id, shift.from);
            }
        }

        Ok(())
    }
}

/// WHERE clause (without the keyword) and its positional arguments.
fn where_clause(user: &str, filter: &TaskFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut sql = String::from("owner = ?1 AND deleted = 0");
    let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(user.to_string())];

    match filter.view {
        View::All => {}
        View::Pending => sql.push_str(" AND completed = 0"),
        View::Completed => sql.push_str(" AND completed = 1"),
    }

    if let Some(status) = filter.status {
        args.push(Box::new(status.as_str().to_string()));
        sql.push_str(&format!(" AND status = ?{}", args.len()));
    }

    if let Some(needle) = &filter.title_contains {
        let escaped = needle
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        args.push(Box::new(format!("%{}%", escaped)));
        sql.push_str(&format!(" AND lower(title) LIKE ?{} ESCAPE '\\'", args.len()));
    }

    (sql, args)
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn format_time(time: &NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_status(idx: usize, s: &str) -> rusqlite::Result<Status> {
    Status::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown status '{}'", s).into())
    })
}

/// Convert a database row to a Task. Column order is `TASK_COLUMNS`.
fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Task {
        id: row.get(0)?,
        user: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: parse_status(4, &status)?,
        priority: row.get(5)?,
        completed: row.get(6)?,
        deleted: row.get(7)?,
        created_at: parse_ts(8, &created_at)?,
        updated_at: parse_ts(9, &updated_at)?,
    })
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let created_at: String = row.get(2)?;
    Ok(User {
        username: row.get(0)?,
        email: row.get(1)?,
        created_at: parse_ts(2, &created_at)?,
    })
}

fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<Schedule> {
    let time: String = row.get(1)?;
    let last_sent_at: Option<String> = row.get(2)?;

    Ok(Schedule {
        user: row.get(0)?,
        time: NaiveTime::parse_from_str(&time, "%H:%M:%S")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        last_sent_at: last_sent_at.map(|s| parse_ts(2, &s)).transpose()?,
    })
}
