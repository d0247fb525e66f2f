//! Single-consumer bridge between the host event feed and the coordinator.
//!
//! Draining the subscription from one task guarantees the coordinator sees
//! start and terminate events strictly in delivery order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::coordinator::SessionCoordinator;
use crate::models::session::SessionEvent;

/// Spawn the background task that applies host events to the coordinator in
/// arrival order. The task runs until the `CancellationToken` fires or the
/// host closes the event channel.
#[must_use]
pub fn spawn_event_pump(
    coordinator: Arc<SessionCoordinator>,
    mut events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    info!("event pump shutting down");
                    break;
                }
                event = events.recv() => event,
            };

            match event {
                Some(SessionEvent::Started {
                    session,
                    parent,
                    app_host,
                }) => {
                    coordinator
                        .on_session_started(session, parent.as_deref(), app_host)
                        .await;
                }
                Some(SessionEvent::Terminated { session, exit_code }) => {
                    coordinator.on_session_terminated(&session, exit_code).await;
                }
                None => {
                    info!("host event channel closed; event pump exiting");
                    break;
                }
            }
        }
    })
}
