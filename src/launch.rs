//! Debug configuration builders for launch and attach requests.
//!
//! Launch configs inherit the supervisor's environment with profile entries
//! layered on top; attach configs carry the target PID and an optional
//! source-path remapping root.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::{GlobalConfig, RootProfile, ServiceProfile};
use crate::models::session::{DebugRequest, DebugSessionConfig};

/// Display name used for the attach-mode secondary session.
pub const ATTACH_SESSION_NAME: &str = "Attach to app host";

/// Inputs for building a launch-request configuration.
#[derive(Debug, Clone, Default)]
pub struct ProgramLaunch {
    /// Display name for the session.
    pub name: String,
    /// Program to run, absent for a pure coordinator session.
    pub program: Option<PathBuf>,
    /// Program arguments.
    pub args: Vec<String>,
    /// Environment overrides merged over the supervisor's environment.
    pub env: HashMap<String, String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Identity of the parent session, if any.
    pub parent: Option<String>,
    /// Whether this session is the primary process of the launch.
    pub app_host: bool,
}

/// Merge environment overrides over a base map. Override entries win.
#[must_use]
pub fn merge_envs(
    base: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Build a launch-request configuration for a program.
///
/// The launch's environment entries are merged over the supervisor's own
/// environment. Stepping is unrestricted (`just_my_code = false`) and the
/// debugger does not break at entry.
#[must_use]
pub fn program_configuration(debugger_type: &str, launch: ProgramLaunch) -> DebugSessionConfig {
    let inherited: HashMap<String, String> = std::env::vars().collect();
    let env = if launch.program.is_some() {
        merge_envs(&inherited, &launch.env)
    } else {
        HashMap::new()
    };

    DebugSessionConfig {
        debugger_type: debugger_type.to_owned(),
        request: DebugRequest::Launch,
        name: launch.name,
        program: launch.program,
        args: launch.args,
        env,
        cwd: launch.cwd,
        process_id: None,
        just_my_code: false,
        stop_at_entry: false,
        app_host: launch.app_host,
        source_root: None,
        parent: launch.parent,
    }
}

/// Build an attach-request configuration for the app-host attach role.
#[must_use]
pub fn attach_configuration(
    debugger_type: &str,
    process_id: u32,
    source_root: Option<PathBuf>,
) -> DebugSessionConfig {
    DebugSessionConfig {
        debugger_type: debugger_type.to_owned(),
        request: DebugRequest::Attach,
        name: ATTACH_SESSION_NAME.to_owned(),
        program: None,
        args: Vec::new(),
        env: HashMap::new(),
        cwd: None,
        process_id: Some(process_id),
        just_my_code: false,
        stop_at_entry: false,
        app_host: false,
        source_root,
        parent: None,
    }
}

/// Build the root session's configuration from the launch profile.
#[must_use]
pub fn root_configuration(config: &GlobalConfig, root: &RootProfile) -> DebugSessionConfig {
    program_configuration(
        &config.debugger_type,
        ProgramLaunch {
            name: root.name.clone(),
            program: root.program.clone(),
            args: root.args.clone(),
            env: root.env.clone(),
            cwd: root.cwd.clone(),
            parent: None,
            app_host: false,
        },
    )
}

/// Build a service session's configuration as a child of `parent_id`.
#[must_use]
pub fn service_configuration(
    config: &GlobalConfig,
    service: &ServiceProfile,
    parent_id: &str,
) -> DebugSessionConfig {
    program_configuration(
        &config.debugger_type,
        ProgramLaunch {
            name: service.name.clone(),
            program: Some(service.program.clone()),
            args: service.args.clone(),
            env: service.env.clone(),
            cwd: service.cwd.clone(),
            parent: Some(parent_id.to_owned()),
            app_host: service.app_host,
        },
    )
}
