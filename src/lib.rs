//! taskmgr: a personal task tracker on SQLite.
//!
//! Each user keeps an ordered list of tasks. Priorities are unique among a
//! user's active tasks: writing a task at an occupied priority pushes the
//! occupant, and the unbroken run above it, down by one. The shift happens in
//! the same transaction as the write, so concurrent writers never observe or
//! produce duplicate priorities.
//!
//! # Example
//!
//! ```no_run
//! use taskmgr::{Store, View};
//! use std::path::Path;
//!
//! let mut store = Store::init(Path::new(".")).unwrap();
//! store.add_user("bruce", "bruce@wayne.org").unwrap();
//!
//! let report = store.create("bruce", "Write report", 1, None).unwrap();
//! let review = store.create("bruce", "Review PR", 1, None).unwrap();
//!
//! // The second task took priority 1; the report moved to 2
//! let pending = store.list("bruce", View::Pending).unwrap();
//! assert_eq!(pending[0].id, review.id);
//! assert_eq!(pending[1].id, report.id);
//! assert_eq!(pending[1].priority, 2);
//!
//! store.complete("bruce", &review.id).unwrap();
//! ```

mod id;
mod storage;

pub mod builder;
pub mod client;
pub mod config;
pub mod daemon;
pub mod digest;
pub mod protocol;
pub mod query;
pub mod reindex;
pub mod store;
pub mod types;

// Re-export public API
pub use builder::{StoreBuilderExt, TaskBuilder};
pub use client::Client;
pub use config::Config;
pub use daemon::{Daemon, DaemonConfig, is_daemon_running, start_daemon};
pub use protocol::{Request, Response};
pub use query::{HistoryFilter, Query, StoreQueryExt, TaskFilter, View};
pub use store::{Store, StoreError, TaskChanges};
pub use types::{History, Schedule, Status, Task, TaskCounts, User, ValidationError};
