//! CLI argument parsing for taskmgr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tm",
    about = "Personal task tracker with contention-free priorities",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/taskmgr/logs/taskmgr.log"
)]
pub struct Cli {
    /// Path to the taskmgr store directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Act as this user (default: default_user from the config file)
    #[arg(short = 'u', long, global = true)]
    pub user: Option<String>,

    /// Config file (default: ~/.config/taskmgr/taskmgr.yml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new taskmgr store in the current directory
    Init,

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Add a task; tasks at or below this priority move down to make room
    Add {
        /// Priority (1 = most important)
        priority: u32,

        /// Task title
        title: String,

        /// Description
        #[arg(short = 'D', long)]
        description: Option<String>,
    },

    /// List tasks
    Ls {
        /// Which tasks to show (all, pending, completed)
        #[arg(short, long, default_value = "all")]
        filter: String,

        /// Only tasks whose title contains this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Get a task by ID
    Get {
        /// Task ID
        id: String,
    },

    /// Edit a task
    Edit {
        /// Task ID
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        priority: Option<u32>,

        #[arg(short = 'D', long)]
        description: Option<String>,

        /// Remove the description
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
    },

    /// Set a task's status (pending, in_progress, completed, cancelled)
    Status {
        /// Task ID
        id: String,

        status: String,
    },

    /// Mark a task completed
    Done {
        /// Task ID
        id: String,
    },

    /// Reopen a completed task at its old priority
    Reopen {
        /// Task ID
        id: String,
    },

    /// Delete a task
    Del {
        /// Task ID
        id: String,
    },

    /// Show a task's status history
    History {
        /// Task ID
        id: String,

        /// Only changes out of this status
        #[arg(long)]
        from: Option<String>,

        /// Only changes into this status
        #[arg(long)]
        to: Option<String>,

        /// Only changes on this UTC day (YYYY-MM-DD)
        #[arg(long)]
        on: Option<String>,
    },

    /// Show task counts
    Report,

    /// Set the daily digest time (UTC)
    Schedule {
        /// HH:MM or HH:MM:SS
        time: String,
    },

    /// Send every digest that is due, printing them to stdout
    Digest,

    /// Run the daemon in foreground
    Daemon,

    /// Stop the running daemon
    DaemonStop,

    /// Check daemon status
    DaemonStatus,
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Register a user
    Add { username: String, email: String },

    /// List users
    List,
}
