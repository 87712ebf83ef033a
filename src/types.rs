//! Core data types for taskmgr.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 100;

/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 64;

/// A unit of work owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier: "tk-" + 10 hex chars from content hash + entropy
    pub id: String,

    /// Owning username
    pub user: String,

    /// Short description of the work
    pub title: String,

    /// Optional longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Workflow state, tracked in history
    pub status: Status,

    /// Ordering key, 1 = most important. Unique among the owner's active tasks.
    pub priority: u32,

    /// Completed tasks leave the priority domain; their priority is frozen
    #[serde(default)]
    pub completed: bool,

    /// Soft delete marker
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,

    /// When created
    pub created_at: DateTime<Utc>,

    /// Last modification
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// True if the task takes part in priority uniqueness.
    pub fn is_active(&self) -> bool {
        !self.completed && !self.deleted
    }
}

/// Task workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Pending, Status::InProgress, Status::Completed, Status::Cancelled];

    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// Parse the database representation. Accepts lowercase for CLI input.
    pub fn parse(s: &str) -> Option<Status> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "PENDING" => Some(Status::Pending),
            "IN_PROGRESS" => Some(Status::InProgress),
            "COMPLETED" => Some(Status::Completed),
            "CANCELLED" => Some(Status::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Validate username and email.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.is_empty() || self.username.chars().count() > MAX_USERNAME_LEN {
            return Err(ValidationError::InvalidUsername(self.username.clone()));
        }
        if !self
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ValidationError::InvalidUsername(self.username.clone()));
        }

        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !self.email.contains(' ') => Ok(()),
            _ => Err(ValidationError::InvalidEmail(self.email.clone())),
        }
    }
}

/// One recorded status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct History {
    pub task_id: String,

    /// Task title at the time the history was read
    pub title: String,

    pub previous_status: Status,
    pub new_status: Status,
    pub changed_at: DateTime<Utc>,
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changed from '{}' to '{}'",
            self.title, self.previous_status, self.new_status
        )
    }
}

/// Daily digest schedule for a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub user: String,

    /// Time of day (UTC)
    pub time: NaiveTime,

    /// Last successful hand-off to the mailer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schedule for {} daily", self.time.format("%H:%M:%S"))
    }
}

/// Per-user task totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    /// Non-deleted tasks
    pub total: usize,

    /// Non-deleted tasks with the completed flag set
    pub completed: usize,
}

impl TaskCounts {
    pub fn pending(&self) -> usize {
        self.total - self.completed
    }
}

/// Validation errors for tasks and users.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyTitle,
    TitleTooLong,
    InvalidCharacters,
    InvalidPriority,
    InvalidTimestamp,
    MissingUser,
    InvalidUsername(String),
    InvalidEmail(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyTitle => write!(f, "title cannot be empty"),
            ValidationError::TitleTooLong => write!(f, "title exceeds {} characters", MAX_TITLE_LEN),
            ValidationError::InvalidCharacters => write!(f, "title contains control characters"),
            ValidationError::InvalidPriority => write!(f, "priority must be a positive integer"),
            ValidationError::InvalidTimestamp => write!(f, "updated_at cannot be before created_at"),
            ValidationError::MissingUser => write!(f, "task has no owning user"),
            ValidationError::InvalidUsername(name) => {
                write!(
                    f,
                    "invalid username '{}': 1-{} chars of letters, digits, '.', '-', '_'",
                    name, MAX_USERNAME_LEN
                )
            }
            ValidationError::InvalidEmail(email) => write!(f, "invalid email address '{}'", email),
        }
    }
}

impl std::error::Error for ValidationError {}

impl Task {
    /// Validate the task's fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user.is_empty() {
            return Err(ValidationError::MissingUser);
        }

        // Title: required, 1-100 chars, no control characters
        if self.title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        if self.title.chars().any(|c| c.is_control()) {
            return Err(ValidationError::InvalidCharacters);
        }

        if self.priority == 0 {
            return Err(ValidationError::InvalidPriority);
        }

        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidTimestamp);
        }

        Ok(())
    }
}
