//! Process-backed host debugging subsystem.
//!
//! Realizes debug sessions as supervised local OS processes:
//! - Launch requests spawn the configured program with `kill_on_drop(true)`
//!   and a scrubbed environment (only the entries in the session config).
//! - Attach requests track an externally owned process by PID (Unix only).
//! - A watcher task polls tracked processes and emits `Terminated` events
//!   when they exit.
//! - Stop requests terminate gracefully: ask the process to exit, wait for
//!   the grace period, then force-kill.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::host::DebugHost;
use crate::models::session::{DebugRequest, DebugSessionConfig, SessionEvent, SessionHandle};
use crate::{AppError, Result};

/// Interval between polls for tracked process exits.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What backs a tracked session.
enum Backing {
    /// A child process this host spawned and owns.
    Spawned(Child),
    /// An externally owned process tracked by PID.
    Attached {
        /// Target process ID.
        pid: u32,
    },
    /// A session with no process at all; lives until explicitly stopped.
    Virtual,
}

struct Entry {
    handle: SessionHandle,
    backing: Backing,
}

type Sessions = Arc<Mutex<HashMap<String, Entry>>>;
type Subscribers = Arc<RwLock<Vec<mpsc::Sender<SessionEvent>>>>;

/// Host debugging subsystem backed by local OS processes.
pub struct ProcessHost {
    stop_grace: Duration,
    event_capacity: usize,
    sessions: Sessions,
    subscribers: Subscribers,
}

impl ProcessHost {
    /// Create a host with the given stop grace period and event channel
    /// capacity.
    #[must_use]
    pub fn new(stop_grace: Duration, event_capacity: usize) -> Self {
        Self {
            stop_grace,
            event_capacity,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Spawn the background task that watches tracked processes for exits
    /// and emits `Terminated` events. The task polls at [`POLL_INTERVAL`]
    /// until the `CancellationToken` fires.
    #[must_use]
    pub fn spawn_exit_watcher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let subscribers = Arc::clone(&self.subscribers);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("process exit watcher shutting down");
                        break;
                    }
                    () = tokio::time::sleep(POLL_INTERVAL) => {}
                }

                poll_sessions(&sessions, &subscribers).await;
            }
        })
    }

    async fn start_launch(&self, config: DebugSessionConfig) -> Result<SessionHandle> {
        let handle = SessionHandle::new(&config.name);

        info!(
            session_id = %handle.id,
            config = %render_config(&config),
            "starting debug session"
        );

        let backing = match &config.program {
            Some(program) => {
                let mut cmd = Command::new(program);
                cmd.args(&config.args);
                // The session config carries the authoritative environment;
                // nothing else from the supervisor's environment leaks in.
                cmd.env_clear();
                cmd.envs(&config.env);
                if let Some(cwd) = &config.cwd {
                    cmd.current_dir(cwd);
                }
                cmd.kill_on_drop(true);

                let child = cmd.spawn().map_err(|err| {
                    AppError::SessionStart(format!(
                        "failed to spawn {}: {err}",
                        program.display()
                    ))
                })?;
                Backing::Spawned(child)
            }
            None => {
                debug!(session_id = %handle.id, "no program configured; session is coordinator-only");
                Backing::Virtual
            }
        };

        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            handle.id.clone(),
            Entry {
                handle: handle.clone(),
                backing,
            },
        );
        drop(sessions);

        broadcast(
            &self.subscribers,
            SessionEvent::Started {
                session: handle.clone(),
                parent: config.parent.clone(),
                app_host: config.app_host,
            },
        )
        .await;

        info!(session_id = %handle.id, name = %handle.name, "session started");
        Ok(handle)
    }

    #[cfg(unix)]
    async fn start_attach(&self, config: DebugSessionConfig) -> Result<SessionHandle> {
        let pid = config
            .process_id
            .ok_or_else(|| AppError::SessionStart("attach request missing processId".into()))?;

        if !pid_alive(pid) {
            return Err(AppError::SessionStart(format!(
                "no running process with pid {pid}"
            )));
        }

        let handle = SessionHandle::new(&config.name);
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            handle.id.clone(),
            Entry {
                handle: handle.clone(),
                backing: Backing::Attached { pid },
            },
        );
        drop(sessions);

        broadcast(
            &self.subscribers,
            SessionEvent::Started {
                session: handle.clone(),
                parent: config.parent.clone(),
                app_host: config.app_host,
            },
        )
        .await;

        info!(session_id = %handle.id, pid, "attached to process");
        Ok(handle)
    }

    #[cfg(not(unix))]
    async fn start_attach(&self, _config: DebugSessionConfig) -> Result<SessionHandle> {
        Err(AppError::SessionStart(
            "attach is not supported on this platform".into(),
        ))
    }

    async fn stop_session(&self, id: String) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let Some(entry) = sessions.remove(&id) else {
            // Unknown or already-stopped session: harmless no-op.
            debug!(session_id = %id, "stop requested for untracked session; ignoring");
            return Ok(());
        };
        drop(sessions);

        let Entry { handle, backing } = entry;
        let mut exit_code = None;
        let mut outcome = Ok(());

        match backing {
            Backing::Spawned(mut child) => {
                exit_code = self.stop_spawned(&handle, &mut child).await;
            }
            Backing::Attached { pid } => {
                // Tracking is removed optimistically even if the signal
                // cannot be delivered.
                outcome = stop_attached(&handle, pid);
            }
            Backing::Virtual => {
                info!(session_id = %handle.id, "coordinator-only session stopped");
            }
        }

        broadcast(
            &self.subscribers,
            SessionEvent::Terminated {
                session: handle,
                exit_code,
            },
        )
        .await;

        outcome
    }

    /// Gracefully terminate a spawned child: ask it to exit, wait for the
    /// grace period, then force-kill. Returns the exit code when known.
    async fn stop_spawned(&self, handle: &SessionHandle, child: &mut Child) -> Option<i32> {
        request_exit(child);

        info!(
            session_id = %handle.id,
            grace_secs = self.stop_grace.as_secs(),
            "waiting for process to exit"
        );

        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(exit)) => {
                info!(session_id = %handle.id, ?exit, "process exited gracefully");
                exit.code()
            }
            Ok(Err(err)) => {
                warn!(session_id = %handle.id, %err, "error waiting for process");
                None
            }
            Err(_) => {
                warn!(
                    session_id = %handle.id,
                    "process did not exit within grace period, forcing kill"
                );
                if let Err(err) = child.kill().await {
                    warn!(session_id = %handle.id, %err, "failed to force-kill process");
                }
                None
            }
        }
    }
}

impl DebugHost for ProcessHost {
    fn request_start(
        &self,
        config: DebugSessionConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SessionHandle>> + Send + '_>> {
        Box::pin(async move {
            match config.request {
                DebugRequest::Launch => self.start_launch(config).await,
                DebugRequest::Attach => self.start_attach(config).await,
            }
        })
    }

    fn request_stop(
        &self,
        session: &SessionHandle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let id = session.id.clone();
        Box::pin(async move { self.stop_session(id).await })
    }

    fn subscribe_events(
        &self,
    ) -> Pin<Box<dyn Future<Output = mpsc::Receiver<SessionEvent>> + Send + '_>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(self.event_capacity);
            let mut subscribers = self.subscribers.write().await;
            // Drop subscriptions whose receivers are gone before adding the
            // new one, so stale senders do not accumulate across restarts.
            subscribers.retain(|existing| !existing.is_closed());
            subscribers.push(tx);
            rx
        })
    }
}

/// Check all tracked processes for exits. Exited entries are removed from
/// the registry and a `Terminated` event is broadcast for each.
async fn poll_sessions(sessions: &Sessions, subscribers: &Subscribers) {
    let mut guard = sessions.lock().await;
    let mut exited: Vec<(SessionHandle, Option<i32>)> = Vec::new();

    for entry in guard.values_mut() {
        match &mut entry.backing {
            Backing::Spawned(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    exited.push((entry.handle.clone(), status.code()));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(session_id = %entry.handle.id, %err, "failed to poll process status");
                    // Treat as exited to clean up the dead entry.
                    exited.push((entry.handle.clone(), None));
                }
            },
            Backing::Attached { pid } => {
                #[cfg(unix)]
                if !pid_alive(*pid) {
                    exited.push((entry.handle.clone(), None));
                }
                #[cfg(not(unix))]
                let _ = pid;
            }
            Backing::Virtual => {}
        }
    }

    for (handle, _) in &exited {
        guard.remove(&handle.id);
    }
    drop(guard);

    for (handle, exit_code) in exited {
        info!(session_id = %handle.id, name = %handle.name, ?exit_code, "tracked process exited");
        broadcast(
            subscribers,
            SessionEvent::Terminated {
                session: handle,
                exit_code,
            },
        )
        .await;
    }
}

/// Deliver an event to every live subscriber without blocking the host.
/// Subscribers that are full or gone lose the event with a warning.
async fn broadcast(subscribers: &Subscribers, event: SessionEvent) {
    let subs = subscribers.read().await;
    for tx in subs.iter() {
        if let Err(err) = tx.try_send(event.clone()) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(session_id = %event.session_id(), "event channel full, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

/// Ask a spawned child to exit cooperatively before the grace wait.
#[cfg(unix)]
fn request_exit(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Ok(raw) = i32::try_from(pid) {
            if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                debug!(pid, %err, "failed to deliver SIGTERM");
            }
        }
    }
}

#[cfg(not(unix))]
fn request_exit(_child: &Child) {
    // No cooperative shutdown signal available; the grace wait still gives
    // the process a chance to exit before the force-kill.
}

/// Send SIGTERM to an attached process.
#[cfg(unix)]
fn stop_attached(handle: &SessionHandle, pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| AppError::SessionStop(format!("pid {pid} out of range")))?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => {
            info!(session_id = %handle.id, pid, "sent SIGTERM to attached process");
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) => {
            // Already gone; stopping a dead process is a no-op.
            debug!(session_id = %handle.id, pid, "attached process already exited");
            Ok(())
        }
        Err(err) => Err(AppError::SessionStop(format!(
            "failed to signal pid {pid}: {err}"
        ))),
    }
}

#[cfg(not(unix))]
fn stop_attached(_handle: &SessionHandle, _pid: u32) -> Result<()> {
    Err(AppError::SessionStop(
        "attach is not supported on this platform".into(),
    ))
}

/// Probe whether a process with the given PID is running.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    i32::try_from(pid).is_ok_and(|raw| kill(Pid::from_raw(raw), None).is_ok())
}

fn render_config(config: &DebugSessionConfig) -> String {
    serde_json::to_string(config).unwrap_or_else(|_| "<unserializable>".into())
}
