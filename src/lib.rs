#![forbid(unsafe_code)]

//! Supervisor for composite debug launches.
//!
//! Tracks the parent/child debug sessions a launch produces and cascades
//! termination between them: root death stops every child, and the death of
//! the app-host child stops the root.

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod host;
pub mod launch;
pub mod models;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
