//! Background daemon for concurrent access to the taskmgr store.
//!
//! Every client connection gets its own worker with its own `Store`
//! connection. Requests run on the blocking pool, so two clients writing at
//! the same time contend only through SQLite's write lock, which is exactly
//! what the priority reindexer relies on.

use crate::config::Config;
use crate::protocol::{Request, Response};
use crate::store::{Store, StoreError};
use crate::storage::STORE_DIR;
use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;

/// Socket file name within the .taskmgr directory.
const SOCKET_FILE: &str = "daemon.sock";

/// PID file name within the .taskmgr directory.
const PID_FILE: &str = "daemon.pid";

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Root directory containing .taskmgr
    pub root: PathBuf,

    /// Settings each worker opens its store with
    pub config: Config,
}

impl DaemonConfig {
    /// Create config with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(SOCKET_FILE)
    }

    /// Get the PID file path.
    pub fn pid_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(PID_FILE)
    }
}

/// The taskmgr daemon.
pub struct Daemon {
    config: DaemonConfig,
    shutdown: Arc<Notify>,
}

impl Daemon {
    /// Create a new daemon instance. Fails if the store cannot be opened.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        Store::open_with_config(&config.root, &config.config).context("Failed to open store")?;

        Ok(Self {
            config,
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Get a shutdown handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run the daemon until a `Shutdown` request or the shutdown handle fires.
    pub async fn run(&self) -> Result<()> {
        // Clean up any stale socket
        let socket_path = self.config.socket_path();
        if socket_path.exists() {
            fs::remove_file(&socket_path).ok();
        }

        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string()).context("Failed to write PID file")?;

        let listener = UnixListener::bind(&socket_path).context("Failed to bind to Unix socket")?;
        log::info!("Daemon listening on {:?}", socket_path);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    log::info!("Daemon shutting down");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_worker(stream),
                    Err(e) => {
                        log::error!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        fs::remove_file(&socket_path).ok();
        fs::remove_file(&pid_path).ok();

        Ok(())
    }

    fn spawn_worker(&self, stream: UnixStream) {
        let root = self.config.root.clone();
        let config = self.config.config.clone();
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let opened = tokio::task::spawn_blocking(move || Store::open_with_config(&root, &config)).await;
            let store = match opened {
                Ok(Ok(store)) => store,
                Ok(Err(e)) => {
                    log::error!("Failed to open store for connection: {}", e);
                    return;
                }
                Err(e) => {
                    log::error!("Store open task failed: {}", e);
                    return;
                }
            };

            if let Err(e) = handle_connection(stream, store, shutdown).await {
                log::warn!("Connection error: {}", e);
            }
        });
    }
}

/// Serve one client until it disconnects.
async fn handle_connection(stream: UnixStream, mut store: Store, shutdown: Arc<Notify>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read line")? {
        if line.trim().is_empty() {
            continue;
        }

        let (response, is_shutdown) = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let is_shutdown = matches!(request, Request::Shutdown);
                if request.is_write() {
                    log::debug!("Write request: {:?}", request);
                }

                // SQLite calls block, possibly on another writer's lock
                let (returned, response) = tokio::task::spawn_blocking(move || {
                    let response = dispatch(&mut store, request);
                    (store, response)
                })
                .await
                .context("Request worker panicked")?;
                store = returned;

                (response, is_shutdown)
            }
            Err(e) => (Response::error(format!("invalid request: {}", e)), false),
        };

        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;

        if is_shutdown {
            shutdown.notify_one();
            break;
        }
    }

    Ok(())
}

/// Run one request against the store.
pub fn dispatch(store: &mut Store, request: Request) -> Response {
    match request {
        Request::AddUser { username, email } => match store.add_user(&username, &email) {
            Ok(user) => Response::User { user },
            Err(e) => failure(e),
        },

        Request::Create {
            user,
            title,
            priority,
            description,
        } => match store.create(&user, &title, priority, description.as_deref()) {
            Ok(task) => Response::Task { task },
            Err(e) => failure(e),
        },

        Request::Update { user, id, changes } => match store.update(&user, &id, changes) {
            Ok(task) => Response::Task { task },
            Err(e) => failure(e),
        },

        Request::SetStatus { user, id, status } => match store.set_status(&user, &id, status) {
            Ok(task) => Response::Task { task },
            Err(e) => failure(e),
        },

        Request::Complete { user, id } => match store.complete(&user, &id) {
            Ok(task) => Response::Task { task },
            Err(e) => failure(e),
        },

        Request::Reopen { user, id } => match store.reopen(&user, &id) {
            Ok(task) => Response::Task { task },
            Err(e) => failure(e),
        },

        Request::Delete { user, id } => match store.delete(&user, &id) {
            Ok(()) => Response::Ok,
            Err(e) => failure(e),
        },

        Request::Get { user, id } => match store.get(&user, &id) {
            Ok(Some(task)) => Response::Task { task },
            Ok(None) => Response::NotFound { id },
            Err(e) => failure(e),
        },

        Request::List { user, filter } => match store.storage().query_tasks(&user, &filter) {
            Ok(tasks) => Response::Tasks { tasks },
            Err(e) => failure(e),
        },

        Request::Counts { user } => match store.counts(&user) {
            Ok(counts) => Response::Counts { counts },
            Err(e) => failure(e),
        },

        Request::History { user, id, filter } => match store.history_filtered(&user, &id, &filter) {
            Ok(history) => Response::History { history },
            Err(e) => failure(e),
        },

        Request::Ping => Response::Pong,

        // The connection handler signals the accept loop after replying
        Request::Shutdown => Response::Ok,
    }
}

fn failure(e: eyre::Report) -> Response {
    match e.downcast_ref::<StoreError>() {
        Some(StoreError::TaskNotFound(id)) => Response::NotFound { id: id.clone() },
        _ => Response::error(e.to_string()),
    }
}

/// Check if a daemon is running for the given store path.
pub fn is_daemon_running(root: &Path) -> bool {
    let config = DaemonConfig::new(root);
    let socket_path = config.socket_path();
    let pid_path = config.pid_path();

    // Check if socket exists
    if !socket_path.exists() {
        return false;
    }

    // Check if PID file exists and process is alive
    if let Ok(pid_str) = fs::read_to_string(&pid_path)
        && let Ok(pid) = pid_str.trim().parse::<i32>()
    {
        // Signal 0 only checks that the process exists
        unsafe {
            if libc::kill(pid, 0) == 0 {
                return true;
            }
        }
    }

    // Stale socket, clean up
    fs::remove_file(&socket_path).ok();
    fs::remove_file(&pid_path).ok();
    false
}

/// Start the daemon as a background process.
pub fn start_daemon(root: &Path) -> Result<()> {
    use std::process::Command;

    let exe = std::env::current_exe().context("Failed to get current executable")?;

    Command::new(exe)
        .args(["--dir", root.to_str().unwrap_or("."), "daemon"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("Failed to spawn daemon process")?;

    // Wait a bit for daemon to start
    std::thread::sleep(Duration::from_millis(100));

    Ok(())
}
