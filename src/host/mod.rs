//! Host debugging subsystem abstraction.
//!
//! The [`DebugHost`] trait decouples the session coordinator from whatever
//! subsystem actually runs debug sessions. Implementations expose start and
//! stop requests plus a multiplexed event feed of session starts and
//! terminations. All coordinator-side tracking is driven from that feed.

pub mod process;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::models::session::{DebugSessionConfig, SessionEvent, SessionHandle};
use crate::Result;

/// Interface to the host debugging subsystem.
///
/// Implementations deliver events on their own internal tasks; consumers are
/// expected to drain the subscription channel from a single task so events
/// are observed in delivery order.
pub trait DebugHost: Send + Sync {
    /// Request that a session be started with the given configuration.
    ///
    /// Returns the handle for the new session. The corresponding
    /// [`SessionEvent::Started`] is emitted on the event feed, possibly
    /// before this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionStart`](crate::AppError::SessionStart) if
    /// the host refuses or fails to start the session.
    fn request_start(
        &self,
        config: DebugSessionConfig,
    ) -> Pin<Box<dyn Future<Output = Result<SessionHandle>> + Send + '_>>;

    /// Request that a session be stopped.
    ///
    /// Stopping an unknown or already-stopped session is a harmless no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionStop`](crate::AppError::SessionStop) if the
    /// host acknowledged the request but failed to carry it out.
    fn request_stop(
        &self,
        session: &SessionHandle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Subscribe to the start/terminate event feed.
    ///
    /// The channel is bounded; a subscriber that stops draining it loses
    /// events rather than blocking the host.
    fn subscribe_events(
        &self,
    ) -> Pin<Box<dyn Future<Output = mpsc::Receiver<SessionEvent>> + Send + '_>>;
}
