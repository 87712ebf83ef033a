//! Client for connecting to the taskmgr daemon.

use crate::daemon::{DaemonConfig, is_daemon_running, start_daemon};
use crate::protocol::{Request, Response};
use crate::query::{HistoryFilter, TaskFilter};
use crate::store::TaskChanges;
use crate::types::{History, Status, Task, TaskCounts, User};
use eyre::{Context, Result, bail};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client for communicating with the taskmgr daemon.
pub struct Client {
    root: PathBuf,
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Client {
    /// Connect to the daemon, optionally auto-starting it if not running.
    pub fn connect(root: &Path, auto_start: bool) -> Result<Self> {
        let socket_path = DaemonConfig::new(root).socket_path();

        match UnixStream::connect(&socket_path) {
            Ok(stream) => Self::from_stream(root, stream),
            Err(_) if auto_start => {
                if !is_daemon_running(root) {
                    start_daemon(root).context("Failed to auto-start daemon")?;
                }
                Self::connect_with_retry(root, 20)
            }
            Err(e) => bail!("Failed to connect to daemon: {}. Is it running?", e),
        }
    }

    /// Connect, retrying every 50ms while the socket is not up yet.
    pub fn connect_with_retry(root: &Path, attempts: u32) -> Result<Self> {
        let socket_path = DaemonConfig::new(root).socket_path();

        for _ in 0..attempts {
            if let Ok(stream) = UnixStream::connect(&socket_path) {
                return Self::from_stream(root, stream);
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        bail!("Daemon failed to start in time")
    }

    fn from_stream(root: &Path, stream: UnixStream) -> Result<Self> {
        stream
            .set_read_timeout(Some(Duration::from_secs(30)))
            .context("Failed to set read timeout")?;
        let reader = BufReader::new(stream.try_clone().context("Failed to clone socket")?);

        Ok(Self {
            root: root.to_path_buf(),
            reader,
            writer: stream,
        })
    }

    /// Get the store root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Send a request and receive a response.
    fn request(&mut self, request: Request) -> Result<Response> {
        let request_json = serde_json::to_string(&request)?;
        writeln!(self.writer, "{}", request_json)?;
        self.writer.flush()?;

        let mut response_line = String::new();
        if self.reader.read_line(&mut response_line)? == 0 {
            bail!("Daemon closed the connection");
        }

        let response: Response = serde_json::from_str(&response_line)?;
        Ok(response)
    }

    /// Send a request that answers with a single task.
    fn task_request(&mut self, request: Request) -> Result<Task> {
        match self.request(request)? {
            Response::Task { task } => Ok(task),
            Response::NotFound { id } => bail!("task not found: {}", id),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Register a user.
    pub fn add_user(&mut self, username: &str, email: &str) -> Result<User> {
        let response = self.request(Request::AddUser {
            username: username.to_string(),
            email: email.to_string(),
        })?;

        match response {
            Response::User { user } => Ok(user),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Create a new task.
    pub fn create(&mut self, user: &str, title: &str, priority: u32, description: Option<&str>) -> Result<Task> {
        self.task_request(Request::Create {
            user: user.to_string(),
            title: title.to_string(),
            priority,
            description: description.map(String::from),
        })
    }

    /// Update an existing task.
    pub fn update(&mut self, user: &str, id: &str, changes: TaskChanges) -> Result<Task> {
        self.task_request(Request::Update {
            user: user.to_string(),
            id: id.to_string(),
            changes,
        })
    }

    /// Set a task's status.
    pub fn set_status(&mut self, user: &str, id: &str, status: Status) -> Result<Task> {
        self.task_request(Request::SetStatus {
            user: user.to_string(),
            id: id.to_string(),
            status,
        })
    }

    pub fn complete(&mut self, user: &str, id: &str) -> Result<Task> {
        self.task_request(Request::Complete {
            user: user.to_string(),
            id: id.to_string(),
        })
    }

    pub fn reopen(&mut self, user: &str, id: &str) -> Result<Task> {
        self.task_request(Request::Reopen {
            user: user.to_string(),
            id: id.to_string(),
        })
    }

    /// Soft-delete a task.
    pub fn delete(&mut self, user: &str, id: &str) -> Result<()> {
        let response = self.request(Request::Delete {
            user: user.to_string(),
            id: id.to_string(),
        })?;

        match response {
            Response::Ok => Ok(()),
            Response::NotFound { id } => bail!("task not found: {}", id),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Get a task by ID.
    pub fn get(&mut self, user: &str, id: &str) -> Result<Option<Task>> {
        let response = self.request(Request::Get {
            user: user.to_string(),
            id: id.to_string(),
        })?;

        match response {
            Response::Task { task } => Ok(Some(task)),
            Response::NotFound { .. } => Ok(None),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// List tasks matching `filter`.
    pub fn list(&mut self, user: &str, filter: TaskFilter) -> Result<Vec<Task>> {
        let response = self.request(Request::List {
            user: user.to_string(),
            filter,
        })?;

        match response {
            Response::Tasks { tasks } => Ok(tasks),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    pub fn counts(&mut self, user: &str) -> Result<TaskCounts> {
        let response = self.request(Request::Counts { user: user.to_string() })?;

        match response {
            Response::Counts { counts } => Ok(counts),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    pub fn history(&mut self, user: &str, id: &str, filter: HistoryFilter) -> Result<Vec<History>> {
        let response = self.request(Request::History {
            user: user.to_string(),
            id: id.to_string(),
            filter,
        })?;

        match response {
            Response::History { history } => Ok(history),
            Response::NotFound { id } => bail!("task not found: {}", id),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Shutdown the daemon.
    pub fn shutdown(&mut self) -> Result<()> {
        let response = self.request(Request::Shutdown)?;

        match response {
            Response::Ok => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Ping the daemon.
    pub fn ping(&mut self) -> Result<()> {
        let response = self.request(Request::Ping)?;

        match response {
            Response::Pong => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }
}
