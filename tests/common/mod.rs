//! Shared test infrastructure for taskmgr integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use std::path::Path;
use taskmgr::{Status, Store, Task, View};
use tempfile::TempDir;

/// User registered in every TestEnv.
pub const USER: &str = "bruce";

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
}

impl TestEnv {
    /// Create a new test environment with an initialized store and one user.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut store = Store::init(temp_dir.path()).expect("Failed to init store");
        store
            .add_user(USER, "bruce@wayne.org")
            .expect("Failed to add user");
        Self { temp_dir, store }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Open a second, independent connection to the same store.
    pub fn open_another(&self) -> Store {
        Store::open(self.root()).expect("Failed to open store")
    }

    pub fn add_user(&mut self, username: &str) {
        self.store
            .add_user(username, &format!("{}@wayne.org", username))
            .expect("Failed to add user");
    }

    /// Create a task for the default user at `priority`.
    pub fn create_task(&mut self, title: &str, priority: u32) -> Task {
        self.store
            .create(USER, title, priority, None)
            .expect("Failed to create task")
    }

    /// Create a task with description.
    pub fn create_task_with_desc(&mut self, title: &str, description: &str) -> Task {
        self.store
            .create(USER, title, 1, Some(description))
            .expect("Failed to create task")
    }

    /// Create tasks "T1".."Tn" at priorities 1..=n.
    pub fn create_run(&mut self, n: u32) -> Vec<Task> {
        (1..=n).map(|p| self.create_task(&format!("T{}", p), p)).collect()
    }

    pub fn complete(&mut self, task: &Task) -> Task {
        self.store.complete(USER, &task.id).expect("Failed to complete task")
    }

    /// Current priority of a task.
    pub fn priority_of(&self, task: &Task) -> u32 {
        self.store
            .get(USER, &task.id)
            .expect("Failed to get task")
            .expect("Task vanished")
            .priority
    }

    /// Priorities of the default user's active tasks, ascending.
    pub fn active_priorities(&self) -> Vec<u32> {
        active_priorities_for(&self.store, USER)
    }

    /// Get all visible tasks count.
    pub fn total_count(&self) -> usize {
        self.store.list(USER, View::All).expect("Failed to list tasks").len()
    }

    /// Get tasks by status.
    pub fn count_by_status(&self, status: Status) -> usize {
        self.store
            .list(USER, View::All)
            .expect("Failed to list tasks")
            .iter()
            .filter(|t| t.status == status)
            .count()
    }

    /// Assert the active priority space has no duplicates.
    pub fn assert_unique_active(&self) {
        let priorities = self.active_priorities();
        let mut deduped = priorities.clone();
        deduped.dedup();
        assert_eq!(
            priorities, deduped,
            "Duplicate active priorities: {:?}",
            priorities
        );
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Priorities of a user's active tasks, ascending.
pub fn active_priorities_for(store: &Store, user: &str) -> Vec<u32> {
    store
        .list(user, View::Pending)
        .expect("Failed to list tasks")
        .into_iter()
        .map(|t| t.priority)
        .collect()
}
