use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize file logging. Safe to call more than once.
///
/// `RUST_LOG` takes precedence; otherwise `default_level` applies.
pub fn init(default_level: &str) -> Result<()> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let log_path = determine_log_path(
        std::env::var("AGENTBOX_LOG").ok(),
        std::env::var("XDG_STATE_HOME").ok(),
        home::home_dir(),
    )?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory at {}", parent.display()))?;
    }

    let (directory, file_name) = split_path(&log_path)?;
    let file_appender = rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

/// Pick the log file: explicit AGENTBOX_LOG, then XDG state dir, then
/// ~/.local/state, then the current directory.
fn determine_log_path(
    explicit: Option<String>,
    state_home: Option<String>,
    home_dir: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    if let Some(state_home) = state_home.filter(|s| !s.is_empty()) {
        return Ok(PathBuf::from(state_home)
            .join("agentbox")
            .join("agentbox.log"));
    }

    if let Some(home_dir) = home_dir {
        return Ok(home_dir
            .join(".local")
            .join("state")
            .join("agentbox")
            .join("agentbox.log"));
    }

    Ok(std::env::current_dir()?.join("agentbox.log"))
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name: {}", path.display()))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
