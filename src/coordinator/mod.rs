//! Debug session lifecycle coordination.
//!
//! Tracks one root session and the child sessions started under it, and
//! cascades termination between them:
//! - When the root terminates, every tracked child receives a best-effort
//!   stop request, then tracking is cleared.
//! - When a child carrying the app-host role terminates, the root receives
//!   one best-effort stop request.
//!
//! All state lives behind a single async mutex and every transition runs as
//! an indivisible unit relative to the others, so a child starting during a
//! root cascade can never be retained against a cleared root.

pub mod pump;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::host::DebugHost;
use crate::launch;
use crate::models::session::{DebugSessionConfig, SessionHandle, TrackedSession};
use crate::{AppError, Result};

/// How many recently observed start identities are kept for establishment
/// re-checks. A start event that races ahead of the local root assignment is
/// honored as long as it is still in this window.
const RECENT_STARTS_CAP: usize = 32;

#[derive(Default)]
struct CoordinatorState {
    /// The single top-level session being coordinated, when established.
    root: Option<SessionHandle>,
    /// Tracked children keyed by session identity.
    children: HashMap<String, TrackedSession>,
    /// The attach-mode secondary session, at most one at a time.
    attached: Option<SessionHandle>,
    /// Identities of recently observed start events.
    recent_starts: VecDeque<String>,
    /// Establishment waiters keyed by the identity they corroborate.
    waiters: HashMap<String, oneshot::Sender<()>>,
}

impl CoordinatorState {
    fn record_start(&mut self, id: &str) {
        if self.recent_starts.len() == RECENT_STARTS_CAP {
            self.recent_starts.pop_front();
        }
        self.recent_starts.push_back(id.to_owned());
        if let Some(tx) = self.waiters.remove(id) {
            let _ = tx.send(());
        }
    }

    /// Register an establishment waiter for `id`, unless the start event was
    /// already observed (in which case no wait is needed).
    fn register_waiter(&mut self, id: &str) -> Option<oneshot::Receiver<()>> {
        if self.recent_starts.iter().any(|seen| seen == id) {
            debug!(session_id = %id, "start event already observed; no establishment wait");
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id.to_owned(), tx);
        Some(rx)
    }
}

/// Coordinates parent/child debug session lifecycles against a host
/// debugging subsystem.
pub struct SessionCoordinator {
    host: Arc<dyn DebugHost>,
    debugger_type: String,
    establishment_timeout: Duration,
    state: Mutex<CoordinatorState>,
}

impl SessionCoordinator {
    /// Create a coordinator with empty state.
    #[must_use]
    pub fn new(host: Arc<dyn DebugHost>, config: &GlobalConfig) -> Self {
        Self {
            host,
            debugger_type: config.debugger_type.clone(),
            establishment_timeout: config.establishment_timeout(),
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    /// Handle a session-start event from the host.
    ///
    /// A session whose parent is the current root becomes a tracked child.
    /// Anything else is ignored so unrelated debug activity in the same host
    /// never leaks into the registry.
    pub async fn on_session_started(
        &self,
        session: SessionHandle,
        parent: Option<&str>,
        app_host: bool,
    ) {
        let mut state = self.state.lock().await;
        state.record_start(&session.id);

        let Some(root) = &state.root else {
            debug!(session_id = %session.id, "start event with no root established; ignoring");
            return;
        };

        if parent == Some(root.id.as_str()) {
            info!(
                session_id = %session.id,
                name = %session.name,
                app_host,
                "tracking child session"
            );
            let parent_id = root.id.clone();
            state
                .children
                .insert(session.id.clone(), TrackedSession::new(session, parent_id, app_host));
        } else {
            debug!(session_id = %session.id, "start event unrelated to root; ignoring");
        }
    }

    /// Handle a session-terminate event from the host.
    ///
    /// Root termination cascades a best-effort stop to every tracked child
    /// and clears all tracking. Termination of an app-host child bubbles a
    /// single best-effort stop up to the root. Unknown identities are
    /// ignored.
    pub async fn on_session_terminated(&self, session: &SessionHandle, exit_code: Option<i32>) {
        let mut state = self.state.lock().await;

        if state.root.as_ref().is_some_and(|root| root.id == session.id) {
            info!(
                session_id = %session.id,
                children = state.children.len(),
                ?exit_code,
                "root session terminated; stopping child sessions"
            );
            self.cascade_teardown(&mut state).await;
            return;
        }

        if let Some(tracked) = state.children.remove(&session.id) {
            info!(
                session_id = %session.id,
                name = %tracked.handle.name,
                app_host = tracked.app_host,
                ?exit_code,
                "child session terminated"
            );
            if tracked.app_host {
                if let Some(root) = state.root.clone() {
                    info!(root_id = %root.id, "app-host child ended; stopping root session");
                    if let Err(err) = self.host.request_stop(&root).await {
                        warn!(root_id = %root.id, %err, "failed to stop root session");
                    }
                }
            }
            return;
        }

        if state
            .attached
            .as_ref()
            .is_some_and(|attached| attached.id == session.id)
        {
            info!(session_id = %session.id, "attach-mode session ended");
            state.attached = None;
            return;
        }

        debug!(session_id = %session.id, "terminate event for untracked session; ignoring");
    }

    /// Stop every tracked child (best effort, failures logged, loop always
    /// completes), then clear the registry and the root slot — in that
    /// order, while the state lock is held.
    async fn cascade_teardown(&self, state: &mut CoordinatorState) {
        for tracked in state.children.values() {
            if let Err(err) = self.host.request_stop(&tracked.handle).await {
                warn!(
                    session_id = %tracked.handle.id,
                    name = %tracked.handle.name,
                    %err,
                    "failed to stop child session"
                );
            }
        }
        state.children.clear();
        state.root = None;
    }

    /// Start and establish the root session.
    ///
    /// Requests the start, assigns the root slot, then waits for the
    /// corroborating start event. If the event does not arrive within the
    /// establishment window (or `cancel` fires first), the half-established
    /// root is torn down and the call resolves to a start failure.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionStart`] if the host refuses the start, a
    /// root is already established, or no corroborating start event arrives
    /// in time.
    pub async fn start_root(
        &self,
        config: DebugSessionConfig,
        cancel: &CancellationToken,
    ) -> Result<SessionHandle> {
        {
            let state = self.state.lock().await;
            if state.root.is_some() {
                return Err(AppError::SessionStart(
                    "a root session is already established".into(),
                ));
            }
        }

        let name = config.name.clone();
        let handle = self.host.request_start(config).await?;

        let waiter = {
            let mut state = self.state.lock().await;
            if state.root.is_some() {
                // Another caller won the slot while the start request was in
                // flight; release the session we just started.
                drop(state);
                if let Err(err) = self.host.request_stop(&handle).await {
                    warn!(session_id = %handle.id, %err, "failed to stop surplus root session");
                }
                return Err(AppError::SessionStart(
                    "a root session is already established".into(),
                ));
            }
            state.root = Some(handle.clone());
            state.register_waiter(&handle.id)
        };

        info!(root_id = %handle.id, name = %name, "root session requested");

        if let Err(err) = self.await_corroboration(waiter, cancel).await {
            warn!(root_id = %handle.id, %err, "root session not established; tearing down");
            self.teardown_unestablished_root(&handle).await;
            return Err(err);
        }

        info!(root_id = %handle.id, name = %name, "root session established");
        Ok(handle)
    }

    /// Attach to an external process as the secondary app-host session.
    ///
    /// If a previous attach-mode session is live it is stopped first and the
    /// acknowledgment awaited, so at most one attach-mode session exists at
    /// a time.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionStart`] if the attach request fails or is
    /// never corroborated by a start event.
    pub async fn attach(
        &self,
        process_id: u32,
        source_root: Option<std::path::PathBuf>,
        cancel: &CancellationToken,
    ) -> Result<SessionHandle> {
        let previous = {
            let mut state = self.state.lock().await;
            state.attached.take()
        };

        if let Some(old) = previous {
            info!(session_id = %old.id, "stopping existing app-host attach session");
            if let Err(err) = self.host.request_stop(&old).await {
                warn!(session_id = %old.id, %err, "failed to stop superseded attach session");
            }
            info!(session_id = %old.id, "stopped existing app-host attach session");
        }

        info!(pid = process_id, "attaching to app host");
        let config = launch::attach_configuration(&self.debugger_type, process_id, source_root);
        let handle = self.host.request_start(config).await?;

        let waiter = {
            let mut state = self.state.lock().await;
            state.register_waiter(&handle.id)
        };

        if let Err(err) = self.await_corroboration(waiter, cancel).await {
            warn!(session_id = %handle.id, %err, "attach session not established");
            if let Err(stop_err) = self.host.request_stop(&handle).await {
                warn!(session_id = %handle.id, %stop_err, "failed to stop unestablished attach session");
            }
            return Err(err);
        }

        let mut state = self.state.lock().await;
        state.attached = Some(handle.clone());
        drop(state);

        info!(session_id = %handle.id, pid = process_id, "attach session established");
        Ok(handle)
    }

    /// Issue a best-effort stop request for the root session, if one is
    /// established. Tracking is only cleared once the host reports the
    /// termination back through the event feed.
    pub async fn stop_root(&self) {
        let root = {
            let state = self.state.lock().await;
            state.root.clone()
        };

        let Some(root) = root else {
            debug!("stop_root requested with no root established");
            return;
        };

        if let Err(err) = self.host.request_stop(&root).await {
            warn!(root_id = %root.id, %err, "failed to stop root session");
        }
    }

    /// Handle of the established root session, if any.
    pub async fn root(&self) -> Option<SessionHandle> {
        self.state.lock().await.root.clone()
    }

    /// Number of currently tracked child sessions.
    pub async fn child_count(&self) -> usize {
        self.state.lock().await.children.len()
    }

    /// Snapshot of the tracked children, in no particular order.
    pub async fn tracked_children(&self) -> Vec<TrackedSession> {
        self.state.lock().await.children.values().cloned().collect()
    }

    /// Handle of the current attach-mode session, if any.
    pub async fn attached(&self) -> Option<SessionHandle> {
        self.state.lock().await.attached.clone()
    }

    /// Wait for a registered establishment waiter to fire, bounded by the
    /// establishment timeout and the caller's cancellation token.
    async fn await_corroboration(
        &self,
        waiter: Option<oneshot::Receiver<()>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(rx) = waiter else {
            return Ok(());
        };

        tokio::select! {
            () = cancel.cancelled() => Err(AppError::SessionStart(
                "establishment wait cancelled".into(),
            )),
            corroborated = tokio::time::timeout(self.establishment_timeout, rx) => {
                match corroborated {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(AppError::SessionStart(
                        "establishment waiter dropped".into(),
                    )),
                    Err(_) => Err(AppError::SessionStart(format!(
                        "no start event within {}s",
                        self.establishment_timeout.as_secs()
                    ))),
                }
            }
        }
    }

    /// Tear down a root whose start event never arrived: stop any children
    /// that slipped in, clear tracking, and best-effort stop the root handle
    /// itself so a half-started session does not linger in the host.
    async fn teardown_unestablished_root(&self, handle: &SessionHandle) {
        let mut state = self.state.lock().await;
        state.waiters.remove(&handle.id);
        self.cascade_teardown(&mut state).await;
        drop(state);

        if let Err(err) = self.host.request_stop(handle).await {
            warn!(root_id = %handle.id, %err, "failed to stop unestablished root session");
        }
    }
}
