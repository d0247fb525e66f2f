//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Host debugging subsystem transport or request failure.
    Host(String),
    /// A session could not be started, or its start event was never
    /// corroborated within the establishment window.
    SessionStart(String),
    /// A best-effort stop request failed. Logged at the call site during
    /// cascades; surfaced only where the caller awaits the acknowledgment.
    SessionStop(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Host(msg) => write!(f, "host: {msg}"),
            Self::SessionStart(msg) => write!(f, "session start: {msg}"),
            Self::SessionStop(msg) => write!(f, "session stop: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
