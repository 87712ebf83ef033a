//! Builder pattern API for creating tasks.

use crate::id::generate_id;
use crate::store::Store;
use crate::types::{Status, Task};
use chrono::Utc;
use eyre::{Context, Result};

/// Builder for creating tasks with a fluent API.
///
/// # Example
///
/// ```ignore
/// let task = store.build("bruce", "Write quarterly report")
///     .priority(1)
///     .status(Status::InProgress)
///     .description("Numbers from finance first")
///     .create()?;
/// ```
pub struct TaskBuilder<'a> {
    store: &'a mut Store,
    user: String,
    title: String,
    priority: u32,
    status: Status,
    description: Option<String>,
}

impl<'a> TaskBuilder<'a> {
    /// Create a new builder for `user` with the given title.
    pub fn new(store: &'a mut Store, user: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            store,
            user: user.into(),
            title: title.into(),
            priority: 1, // Top of the list
            status: Status::Pending,
            description: None,
        }
    }

    /// Set the priority (1 = most important).
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the initial status.
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Create the task, shifting any colliding tasks.
    pub fn create(self) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            id: generate_id(&self.user, &self.title, now),
            user: self.user,
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            completed: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        };

        self.store.upsert_task(task).context("Failed to create task")
    }
}

/// Extension trait to add builder method to Store.
pub trait StoreBuilderExt {
    /// Start building a new task for `user` with the given title.
    fn build(&mut self, user: &str, title: impl Into<String>) -> TaskBuilder<'_>;
}

impl StoreBuilderExt for Store {
    fn build(&mut self, user: &str, title: impl Into<String>) -> TaskBuilder<'_> {
        TaskBuilder::new(self, user, title)
    }
}
