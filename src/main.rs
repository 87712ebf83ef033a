//! taskmgr CLI - personal task tracker.

use chrono::{NaiveDate, NaiveTime, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use taskmgr::digest::{Email, Mailer, run_due};
use taskmgr::{
    Client, Config, Daemon, DaemonConfig, HistoryFilter, Status, Store, StoreQueryExt, TaskChanges, View,
    is_daemon_running,
};

mod cli;

use cli::{Cli, Command, UserCommand};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskmgr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("taskmgr.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Prints digests instead of delivering them.
struct StdoutMailer;

impl Mailer for StdoutMailer {
    fn send(&mut self, email: &Email) -> Result<()> {
        println!("{}\n", email);
        Ok(())
    }
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn get_user(cli_user: Option<String>, config: &Config) -> Result<String> {
    cli_user
        .or_else(|| config.default_user.clone())
        .ok_or_else(|| eyre!("No user given. Pass --user or set default_user in the config file."))
}

fn format_status(status: &Status) -> ColoredString {
    match status {
        Status::Pending => "pending".yellow(),
        Status::InProgress => "in_progress".blue(),
        Status::Completed => "completed".green(),
        Status::Cancelled => "cancelled".dimmed(),
    }
}

fn parse_status(s: &str) -> Result<Status> {
    Status::parse(s).ok_or_else(|| eyre!("Unknown status '{}'", s))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| eyre!("Invalid time '{}', expected HH:MM or HH:MM:SS", s))
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let open = || Store::open_with_config(&store_dir, &config).context("Failed to open store");

    match cli.command {
        Command::Init => {
            Store::init_with_config(&store_dir, &config).context("Failed to initialize taskmgr store")?;
            println!("{} Initialized taskmgr store in {}", "✓".green(), store_dir.display());
        }

        Command::User(UserCommand::Add { username, email }) => {
            let mut store = open()?;
            let user = store.add_user(&username, &email).context("Failed to add user")?;
            println!("{} Added user {} <{}>", "✓".green(), user.username.cyan(), user.email);
        }

        Command::User(UserCommand::List) => {
            let store = open()?;
            let users = store.users().context("Failed to list users")?;

            if users.is_empty() {
                println!("{}", "No users found".dimmed());
            }
            for user in users {
                println!("{} <{}>", user.username.cyan(), user.email);
            }
        }

        Command::Add {
            priority,
            title,
            description,
        } => {
            let user = get_user(cli.user, &config)?;
            let mut store = open()?;
            let task = store
                .create(&user, &title, priority, description.as_deref())
                .context("Failed to create task")?;

            println!("{} Created: {} P{} {}", "✓".green(), task.id.cyan(), task.priority, task.title);
        }

        Command::Ls { filter, search } => {
            let user = get_user(cli.user, &config)?;
            let view = View::parse(&filter).ok_or_else(|| eyre!("Unknown filter '{}'", filter))?;
            let store = open()?;

            let mut query = store.query(&user);
            query = match view {
                View::All => query,
                View::Pending => query.pending(),
                View::Completed => query.completed(),
            };
            if let Some(search) = search {
                query = query.title_contains(search);
            }
            let tasks = query.execute().context("Failed to list tasks")?;

            if tasks.is_empty() {
                println!("{}", "No tasks found".dimmed());
            } else {
                for task in tasks {
                    let done = if task.completed { "✓".green() } else { " ".normal() };
                    println!(
                        "{} {} {} P{} {}{}",
                        done,
                        format_status(&task.status),
                        task.id.cyan(),
                        task.priority,
                        task.title,
                        task.description
                            .map(|d| format!("\n    {}", d.dimmed()))
                            .unwrap_or_default()
                    );
                }
            }
        }

        Command::Get { id } => {
            let user = get_user(cli.user, &config)?;
            let store = open()?;

            match store.get(&user, &id).context("Failed to get task")? {
                Some(task) => {
                    println!("{}: {}", "ID".bold(), task.id.cyan());
                    println!("{}: {}", "Title".bold(), task.title);
                    println!("{}: {}", "Status".bold(), format_status(&task.status));
                    println!("{}: P{}", "Priority".bold(), task.priority);
                    println!("{}: {}", "Completed".bold(), task.completed);
                    if let Some(desc) = &task.description {
                        println!("{}: {}", "Description".bold(), desc);
                    }
                    println!("{}: {}", "Created".bold(), task.created_at);
                    println!("{}: {}", "Updated".bold(), task.updated_at);
                }
                None => {
                    eprintln!("{} Task not found: {}", "✗".red(), id);
                    std::process::exit(1);
                }
            }
        }

        Command::Edit {
            id,
            title,
            priority,
            description,
            clear_description,
        } => {
            let user = get_user(cli.user, &config)?;
            let mut changes = TaskChanges::new();
            if let Some(title) = title {
                changes = changes.with_title(title);
            }
            if let Some(priority) = priority {
                changes = changes.with_priority(priority);
            }
            if clear_description {
                changes = changes.with_description(None);
            } else if let Some(description) = description.as_deref() {
                changes = changes.with_description(Some(description));
            }
            if changes.is_empty() {
                bail!("Nothing to change");
            }

            let mut store = open()?;
            let task = store.update(&user, &id, changes).context("Failed to edit task")?;
            println!("{} Updated: {} P{} {}", "✓".green(), task.id.cyan(), task.priority, task.title);
        }

        Command::Status { id, status } => {
            let user = get_user(cli.user, &config)?;
            let status = parse_status(&status)?;
            let mut store = open()?;
            let task = store
                .set_status(&user, &id, status)
                .context("Failed to set status")?;

            println!("{} {} is now {}", "→".blue(), task.id.cyan(), format_status(&task.status));
        }

        Command::Done { id } => {
            let user = get_user(cli.user, &config)?;
            let mut store = open()?;
            let task = store.complete(&user, &id).context("Failed to complete task")?;

            println!("{} Completed: {} {}", "✓".green(), task.id.cyan(), task.title);
        }

        Command::Reopen { id } => {
            let user = get_user(cli.user, &config)?;
            let mut store = open()?;
            let task = store.reopen(&user, &id).context("Failed to reopen task")?;

            println!("{} Reopened: {} P{} {}", "→".blue(), task.id.cyan(), task.priority, task.title);
        }

        Command::Del { id } => {
            let user = get_user(cli.user, &config)?;
            let mut store = open()?;
            store.delete(&user, &id).context("Failed to delete task")?;

            println!("{} Deleted: {}", "✓".green(), id.cyan());
        }

        Command::History { id, from, to, on } => {
            let user = get_user(cli.user, &config)?;
            let mut filter = HistoryFilter::new();
            if let Some(from) = from {
                filter = filter.previous_status(parse_status(&from)?);
            }
            if let Some(to) = to {
                filter = filter.new_status(parse_status(&to)?);
            }
            if let Some(on) = on {
                let day = NaiveDate::parse_from_str(&on, "%Y-%m-%d")
                    .map_err(|_| eyre!("Invalid date '{}', expected YYYY-MM-DD", on))?;
                filter = filter.changed_on(day);
            }

            let store = open()?;
            let history = store
                .history_filtered(&user, &id, &filter)
                .context("Failed to read history")?;

            if history.is_empty() {
                println!("{}", "No status changes".dimmed());
            }
            for entry in history {
                println!("{} {}", entry.changed_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(), entry);
            }
        }

        Command::Report => {
            let user = get_user(cli.user, &config)?;
            let store = open()?;
            let counts = store.counts(&user).context("Failed to count tasks")?;
            let by_status = store.status_counts(&user).context("Failed to count tasks")?;

            println!("{}: {}", "Total".bold(), counts.total);
            println!("{}: {}", "Pending".bold(), counts.pending());
            println!("{}: {}", "Completed".bold(), counts.completed);
            for status in Status::ALL {
                println!("  {} {}", format_status(&status), by_status.get(&status).copied().unwrap_or(0));
            }
        }

        Command::Schedule { time } => {
            let user = get_user(cli.user, &config)?;
            let time = parse_time(&time)?;
            let mut store = open()?;
            let schedule = store.set_schedule(&user, time).context("Failed to set schedule")?;

            println!("{} {}", "✓".green(), schedule);
        }

        Command::Digest => {
            let mut store = open()?;
            let run = run_due(&mut store, &mut StdoutMailer, Utc::now(), &config.digest)
                .context("Failed to run digests")?;

            if run.sent.is_empty() && run.failed.is_empty() {
                println!("{}", "No digests due".dimmed());
            }
            for user in run.failed {
                eprintln!("{} Digest failed for {}", "✗".red(), user);
            }
        }

        Command::Daemon => {
            println!("{} Starting daemon for {}", "→".blue(), store_dir.display());

            let daemon_config = DaemonConfig::new(&store_dir).with_config(config.clone());
            let daemon = Daemon::new(daemon_config).context("Failed to create daemon")?;

            let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
            rt.block_on(async { daemon.run().await }).context("Daemon error")?;
        }

        Command::DaemonStop => {
            if !is_daemon_running(&store_dir) {
                println!("{} Daemon is not running", "✗".red());
                std::process::exit(1);
            }

            let mut client = Client::connect(&store_dir, false).context("Failed to connect to daemon")?;
            client.shutdown().context("Failed to shutdown daemon")?;
            println!("{} Daemon stopped", "✓".green());
        }

        Command::DaemonStatus => {
            if is_daemon_running(&store_dir) {
                println!("{} Daemon is running", "✓".green());

                if let Ok(mut client) = Client::connect(&store_dir, false)
                    && client.ping().is_ok()
                {
                    println!("  {} Responding to requests", "✓".green());
                }
            } else {
                println!("{} Daemon is not running", "✗".red());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
