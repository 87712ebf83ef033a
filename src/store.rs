//! High-level store API for taskmgr.

use crate::config::Config;
use crate::id::generate_id;
use crate::query::{HistoryFilter, TaskFilter, View};
use crate::reindex::reindex_on_write;
use crate::storage::Storage;
use crate::types::{History, Schedule, Status, Task, TaskCounts, User, ValidationError};
use chrono::{DateTime, NaiveTime, Utc};
use eyre::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Errors that can occur during store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Task not found, not owned by the user, or deleted.
    TaskNotFound(String),
    /// Unknown username.
    UserNotFound(String),
    /// Username already registered.
    UserExists(String),
    /// Validation error.
    Validation(ValidationError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::TaskNotFound(id) => write!(f, "task not found: {}", id),
            StoreError::UserNotFound(name) => write!(f, "user not found: {}", name),
            StoreError::UserExists(name) => write!(f, "user already exists: {}", name),
            StoreError::Validation(e) => write!(f, "validation error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Partial update of a task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// `Some(None)` clears the description
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Distinguish an explicit `null` from an absent field.
fn present<'de, D, T>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

impl TaskChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: Option<&str>) -> Self {
        self.description = Some(description.map(String::from));
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}

/// The main taskmgr store.
pub struct Store {
    storage: Storage,
}

impl Store {
    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        Self::init_with_config(root, &Config::default())
    }

    pub fn init_with_config(root: &Path, config: &Config) -> Result<Self> {
        let storage = Storage::init(root, config.store.busy_timeout())?;
        Ok(Self { storage })
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_with_config(root, &Config::default())
    }

    pub fn open_with_config(root: &Path, config: &Config) -> Result<Self> {
        let storage = Storage::open(root, config.store.busy_timeout())?;
        Ok(Self { storage })
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Register a new user.
    pub fn add_user(&mut self, username: &str, email: &str) -> Result<User> {
        let user = User {
            username: username.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
        };

        user.validate().map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;

        if !self.storage.insert_user(&user).context("Failed to persist user")? {
            return Err(eyre::eyre!(StoreError::UserExists(username.to_string())));
        }

        log::info!("Added user {}", username);
        Ok(user)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.storage.get_user(username)
    }

    /// All users, ordered by username.
    pub fn users(&self) -> Result<Vec<User>> {
        self.storage.list_users()
    }

    fn require_user(&self, username: &str) -> Result<()> {
        if self.storage.get_user(username)?.is_none() {
            return Err(eyre::eyre!(StoreError::UserNotFound(username.to_string())));
        }
        Ok(())
    }

    // ========================================================================
    // Task writes
    // ========================================================================

    /// Create a new pending task.
    pub fn create(&mut self, user: &str, title: &str, priority: u32, description: Option<&str>) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: generate_id(user, title, now),
            user: user.to_string(),
            title: title.to_string(),
            description: description.map(String::from),
            status: Status::Pending,
            priority,
            completed: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        };

        self.upsert_task(task)
    }

    /// Write a task as given, inserting or replacing by id.
    ///
    /// This is the single entry point for full-row writes: the previous row
    /// is read, the priority space is reindexed, the row is written and a
    /// status change is recorded, all in one transaction. An id that is
    /// soft-deleted or owned by another user is reported as not found.
    pub fn upsert_task(&mut self, mut task: Task) -> Result<Task> {
        let tx = self.storage.begin_write()?;

        if !Storage::user_exists(&tx, &task.user)? {
            return Err(eyre::eyre!(StoreError::UserNotFound(task.user.clone())));
        }

        let previous = Storage::find_task(&tx, &task.id)?;
        if let Some(prev) = &previous {
            if prev.user != task.user || prev.deleted {
                return Err(eyre::eyre!(StoreError::TaskNotFound(task.id.clone())));
            }
            task.created_at = prev.created_at;
            task.updated_at = Utc::now();
        }

        write_task(&tx, previous.as_ref(), &task)?;
        tx.commit().context("Failed to commit task write")?;

        log::info!("Wrote task {} for {} at priority {}", task.id, task.user, task.priority);
        Ok(task)
    }

    /// Apply `changes` to a task.
    pub fn update(&mut self, user: &str, id: &str, changes: TaskChanges) -> Result<Task> {
        self.modify(user, id, |task| changes.apply(task))
    }

    /// Change a task's status.
    pub fn set_status(&mut self, user: &str, id: &str, status: Status) -> Result<Task> {
        self.modify(user, id, |task| task.status = status)
    }

    /// Mark a task completed. Its priority is frozen from here on.
    pub fn complete(&mut self, user: &str, id: &str) -> Result<Task> {
        self.modify(user, id, |task| {
            task.completed = true;
            task.status = Status::Completed;
        })
    }

    /// Return a completed task to the active set at its frozen priority.
    pub fn reopen(&mut self, user: &str, id: &str) -> Result<Task> {
        self.modify(user, id, |task| {
            task.completed = false;
            if task.status == Status::Completed {
                task.status = Status::Pending;
            }
        })
    }

    /// Soft-delete a task.
    pub fn delete(&mut self, user: &str, id: &str) -> Result<()> {
        self.modify(user, id, |task| task.deleted = true)?;
        Ok(())
    }

    /// Read-modify-write of a visible task inside one write transaction.
    fn modify<F>(&mut self, user: &str, id: &str, change: F) -> Result<Task>
    where
        F: FnOnce(&mut Task),
    {
        let tx = self.storage.begin_write()?;

        let previous = Storage::find_task(&tx, id)?
            .filter(|t| t.user == user && !t.deleted)
            .ok_or_else(|| eyre::eyre!(StoreError::TaskNotFound(id.to_string())))?;

        let mut next = previous.clone();
        change(&mut next);
        next.updated_at = Utc::now();

        write_task(&tx, Some(&previous), &next)?;
        tx.commit().context("Failed to commit task write")?;

        log::debug!("Updated task {} for {}", id, user);
        Ok(next)
    }

    // ========================================================================
    // Task reads
    // ========================================================================

    /// Get a task by id. Deleted tasks and other users' tasks are `None`.
    pub fn get(&self, user: &str, id: &str) -> Result<Option<Task>> {
        self.storage.get_task(user, id)
    }

    /// List a user's tasks, highest priority first.
    pub fn list(&self, user: &str, view: View) -> Result<Vec<Task>> {
        self.storage.query_tasks(user, &TaskFilter::new().view(view))
    }

    pub fn counts(&self, user: &str) -> Result<TaskCounts> {
        self.storage.counts(user)
    }

    pub fn status_counts(&self, user: &str) -> Result<HashMap<Status, usize>> {
        self.storage.status_counts(user)
    }

    /// Status transitions of a task, oldest first.
    pub fn history(&self, user: &str, id: &str) -> Result<Vec<History>> {
        self.history_filtered(user, id, &HistoryFilter::new())
    }

    /// Status transitions of a task matching `filter`, oldest first.
    pub fn history_filtered(&self, user: &str, id: &str, filter: &HistoryFilter) -> Result<Vec<History>> {
        if self.storage.get_task(user, id)?.is_none() {
            return Err(eyre::eyre!(StoreError::TaskNotFound(id.to_string())));
        }
        self.storage.history(id, filter)
    }

    // ========================================================================
    // Digest schedules
    // ========================================================================

    pub fn set_schedule(&mut self, user: &str, time: NaiveTime) -> Result<Schedule> {
        self.require_user(user)?;
        self.storage
            .upsert_schedule(user, time)
            .context("Failed to persist schedule")?;
        self.storage
            .get_schedule(user)?
            .ok_or_else(|| eyre::eyre!("schedule for {} vanished after write", user))
    }

    pub fn schedule(&self, user: &str) -> Result<Option<Schedule>> {
        self.storage.get_schedule(user)
    }

    pub fn schedules(&self) -> Result<Vec<Schedule>> {
        self.storage.list_schedules()
    }

    pub fn mark_digest_sent(&mut self, user: &str, at: DateTime<Utc>) -> Result<()> {
        self.storage.mark_sent(user, &at)
    }
}

/// Validate, reindex, persist and record history for one task row.
///
/// Must run inside a write transaction; the caller commits.
fn write_task(conn: &Connection, previous: Option<&Task>, next: &Task) -> Result<()> {
    next.validate().map_err(|e| eyre::eyre!(StoreError::Validation(e)))?;

    reindex_on_write(conn, next)?;
    Storage::put_task(conn, next).context("Failed to persist task")?;

    if let Some(prev) = previous
        && prev.status != next.status
    {
        Storage::append_history(conn, &next.id, prev.status, next.status, &next.updated_at)?;
    }

    Ok(())
}
