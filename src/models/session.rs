//! Debug session domain model: handles, configurations, events, and the
//! coordinator's per-child tracking record.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle to a live debug session, supplied by the host subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    /// Unique session identity.
    pub id: String,
    /// Display name the session was started with.
    pub name: String,
}

impl SessionHandle {
    /// Construct a handle with a generated identity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }
}

/// Whether a session is launched fresh or attached to a running process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DebugRequest {
    /// Start a new process under the debugger.
    Launch,
    /// Attach to an already-running process.
    Attach,
}

/// Configuration blob handed to the host subsystem when starting a session.
///
/// Serialized as camelCase to match the debug-configuration JSON shape the
/// host subsystem consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebugSessionConfig {
    /// Debugger backend identifier.
    #[serde(rename = "type")]
    pub debugger_type: String,
    /// Launch or attach.
    pub request: DebugRequest,
    /// Display name for the session.
    pub name: String,
    /// Program path for launch requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    /// Program arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables for the launched process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Working directory for the launched process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Target process ID for attach requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Restrict stepping to user code only.
    #[serde(default)]
    pub just_my_code: bool,
    /// Break at the program entry point.
    #[serde(default)]
    pub stop_at_entry: bool,
    /// Marks the primary process whose termination cascades to the root.
    #[serde(default)]
    pub app_host: bool,
    /// Optional source-path remapping root for attach requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,
    /// Identity of the parent session, if this session is a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Event emitted by the host subsystem's start/terminate feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session began running.
    Started {
        /// Handle of the new session.
        session: SessionHandle,
        /// Identity of the session that spawned it, if any.
        parent: Option<String>,
        /// Whether the session's configuration carried the app-host marker.
        app_host: bool,
    },
    /// A session stopped running.
    Terminated {
        /// Handle of the terminated session.
        session: SessionHandle,
        /// Process exit code, when the host knows it.
        exit_code: Option<i32>,
    },
}

impl SessionEvent {
    /// Identity of the session the event refers to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Started { session, .. } | Self::Terminated { session, .. } => &session.id,
        }
    }
}

/// A child session currently tracked by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSession {
    /// Handle of the tracked child.
    pub handle: SessionHandle,
    /// Identity of the root session it was started under.
    pub parent_id: String,
    /// Whether this child is the primary process of the launch.
    pub app_host: bool,
    /// When the coordinator observed the start event.
    pub started_at: DateTime<Utc>,
}

impl TrackedSession {
    /// Record a child observed via a start event.
    #[must_use]
    pub fn new(handle: SessionHandle, parent_id: String, app_host: bool) -> Self {
        Self {
            handle,
            parent_id,
            app_host,
            started_at: Utc::now(),
        }
    }
}
