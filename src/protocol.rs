//! IPC protocol types for daemon communication.
//!
//! One JSON object per line in each direction, tagged by `"type"`.

use crate::query::{HistoryFilter, TaskFilter};
use crate::store::TaskChanges;
use crate::types::{History, Status, Task, TaskCounts, User};
use serde::{Deserialize, Serialize};

/// Request sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Register a user.
    AddUser { username: String, email: String },

    /// Create a new task.
    Create {
        user: String,
        title: String,
        priority: u32,
        description: Option<String>,
    },

    /// Update an existing task.
    Update {
        user: String,
        id: String,
        changes: TaskChanges,
    },

    /// Set task status.
    SetStatus { user: String, id: String, status: Status },

    /// Mark a task completed.
    Complete { user: String, id: String },

    /// Reactivate a completed task.
    Reopen { user: String, id: String },

    /// Soft-delete a task.
    Delete { user: String, id: String },

    /// Get a task by ID.
    Get { user: String, id: String },

    /// List a user's tasks.
    List {
        user: String,
        #[serde(default)]
        filter: TaskFilter,
    },

    /// Total and completed counts.
    Counts { user: String },

    /// Status history of a task.
    History {
        user: String,
        id: String,
        #[serde(default)]
        filter: HistoryFilter,
    },

    /// Ping to check if daemon is alive.
    Ping,

    /// Shutdown the daemon.
    Shutdown,
}

impl Request {
    /// True for requests that go through the write path.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::AddUser { .. }
                | Request::Create { .. }
                | Request::Update { .. }
                | Request::SetStatus { .. }
                | Request::Complete { .. }
                | Request::Reopen { .. }
                | Request::Delete { .. }
        )
    }
}

/// Response sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Registered user.
    User { user: User },

    /// Single task response.
    Task { task: Task },

    /// Multiple tasks response.
    Tasks { tasks: Vec<Task> },

    /// Task totals.
    Counts { counts: TaskCounts },

    /// Status transitions.
    History { history: Vec<History> },

    /// Task not found.
    NotFound { id: String },

    /// Operation succeeded.
    Ok,

    /// Pong response to ping.
    Pong,

    /// Error response.
    Error { message: String },
}

impl Response {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
