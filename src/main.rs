#![forbid(unsafe_code)]

//! `debug-marshal` — composite debug launch supervisor binary.
//!
//! Bootstraps configuration, starts the process-backed host, establishes the
//! root session, launches the profiled services as its children, and runs
//! until the launch ends or a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use debug_marshal::config::GlobalConfig;
use debug_marshal::coordinator::pump::spawn_event_pump;
use debug_marshal::coordinator::SessionCoordinator;
use debug_marshal::host::process::ProcessHost;
use debug_marshal::host::DebugHost;
use debug_marshal::launch;
use debug_marshal::{AppError, Result};

/// How often the run loop re-checks whether the root session is still live.
const ROOT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "debug-marshal", about = "Composite debug launch supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML launch profile.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Attach to an already-running app-host process by PID.
    #[arg(long)]
    attach_pid: Option<u32>,

    /// Source-path remapping root for the attach session.
    #[arg(long)]
    source_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("debug-marshal supervisor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(root = %config.root.name, services = config.services.len(), "launch profile loaded");

    // ── Build host, coordinator, and event pump ─────────
    let ct = CancellationToken::new();
    let host = Arc::new(ProcessHost::new(
        config.stop_grace(),
        config.event_channel_capacity,
    ));
    let watcher_handle = host.spawn_exit_watcher(ct.clone());
    let events = host.subscribe_events().await;

    let coordinator = Arc::new(SessionCoordinator::new(
        Arc::clone(&host) as Arc<dyn DebugHost>,
        &config,
    ));
    let pump_handle = spawn_event_pump(Arc::clone(&coordinator), events, ct.clone());

    // ── Establish the root session ──────────────────────
    let root_config = launch::root_configuration(&config, &config.root);
    let root = match coordinator.start_root(root_config, &ct).await {
        Ok(root) => root,
        Err(err) => {
            error!(%err, "failed to start the root session");
            ct.cancel();
            let _ = tokio::join!(pump_handle, watcher_handle);
            return Err(err);
        }
    };

    // ── Launch services under the root ──────────────────
    for service in &config.services {
        let service_config = launch::service_configuration(&config, service, &root.id);
        match host.request_start(service_config).await {
            Ok(handle) => {
                info!(name = %service.name, session_id = %handle.id, "service started");
            }
            Err(err) => {
                error!(name = %service.name, %err, "failed to start service");
            }
        }
    }

    // ── Optional attach to an external app host ─────────
    if let Some(pid) = args.attach_pid {
        if let Err(err) = coordinator.attach(pid, args.source_root.clone(), &ct).await {
            error!(pid, %err, "failed to attach to app host");
        }
    }

    info!("launch running; press Ctrl-C to stop");

    // ── Run until the launch ends or a signal arrives ───
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut signal_seen = false;
    loop {
        tokio::select! {
            () = &mut shutdown, if !signal_seen => {
                info!("shutdown signal received; stopping root session");
                coordinator.stop_root().await;
                signal_seen = true;
            }
            () = tokio::time::sleep(ROOT_POLL_INTERVAL) => {
                if coordinator.root().await.is_none() {
                    info!("root session ended");
                    break;
                }
            }
        }
    }

    // ── Drain background tasks ──────────────────────────
    ct.cancel();
    let _ = tokio::join!(pump_handle, watcher_handle);
    info!("debug-marshal shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
