//! Query API with flexible filtering.

use crate::storage::Storage;
use crate::store::Store;
use crate::types::{Status, Task};
use chrono::NaiveDate;
use eyre::Result;
use serde::{Deserialize, Serialize};

/// Which slice of a user's tasks to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Every non-deleted task
    #[default]
    All,
    /// Tasks still in the priority domain
    Pending,
    /// Tasks with the completed flag set
    Completed,
}

impl View {
    pub fn parse(s: &str) -> Option<View> {
        match s {
            "all" => Some(View::All),
            "pending" => Some(View::Pending),
            "completed" => Some(View::Completed),
            _ => None,
        }
    }
}

/// Filter criteria for listing tasks. Deleted tasks never match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskFilter {
    pub view: View,
    pub status: Option<Status>,
    pub title_contains: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Case-insensitive title substring.
    pub fn title_contains(mut self, substring: impl Into<String>) -> Self {
        self.title_contains = Some(substring.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Filter criteria for a task's status history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    pub previous_status: Option<Status>,
    pub new_status: Option<Status>,
    /// UTC calendar day of the change
    pub changed_on: Option<NaiveDate>,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_status(mut self, status: Status) -> Self {
        self.previous_status = Some(status);
        self
    }

    pub fn new_status(mut self, status: Status) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn changed_on(mut self, day: NaiveDate) -> Self {
        self.changed_on = Some(day);
        self
    }
}

/// Query builder for fluent queries over one user's tasks.
pub struct Query<'a> {
    storage: &'a Storage,
    user: String,
    filter: TaskFilter,
}

impl<'a> Query<'a> {
    pub(crate) fn new(storage: &'a Storage, user: impl Into<String>) -> Self {
        Self {
            storage,
            user: user.into(),
            filter: TaskFilter::new(),
        }
    }

    /// Only incomplete tasks.
    pub fn pending(mut self) -> Self {
        self.filter = self.filter.view(View::Pending);
        self
    }

    /// Only completed tasks.
    pub fn completed(mut self) -> Self {
        self.filter = self.filter.view(View::Completed);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.filter = self.filter.status(status);
        self
    }

    pub fn title_contains(mut self, substring: impl Into<String>) -> Self {
        self.filter = self.filter.title_contains(substring);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.filter = self.filter.limit(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.filter = self.filter.offset(offset);
        self
    }

    /// Execute the query and return matching tasks, highest priority first.
    pub fn execute(self) -> Result<Vec<Task>> {
        self.storage.query_tasks(&self.user, &self.filter)
    }

    /// Count matching tasks, ignoring limit and offset.
    pub fn count(self) -> Result<usize> {
        self.storage.count_tasks(&self.user, &self.filter)
    }
}

/// Extension trait to add query methods to Store.
pub trait StoreQueryExt {
    /// Start building a query over `user`'s tasks.
    fn query(&self, user: &str) -> Query<'_>;

    /// Query with a pre-built filter.
    fn query_with_filter(&self, user: &str, filter: &TaskFilter) -> Result<Vec<Task>>;
}

impl StoreQueryExt for Store {
    fn query(&self, user: &str) -> Query<'_> {
        Query::new(self.storage(), user)
    }

    fn query_with_filter(&self, user: &str, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.storage().query_tasks(user, filter)
    }
}
