use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_FILE_NAME: &str = "spot-agent.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
  pub level: String,
  pub dir: Option<PathBuf>,
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
      retention_days: 14,
    }
  }
}

impl LoggingConfig {
  /// Reads `SPOT_AGENT_LOG_LEVEL`, `SPOT_AGENT_LOG_DIR` and
  /// `SPOT_AGENT_LOG_RETENTION_DAYS` through `env`.
  pub fn from_env<F>(env: F) -> Self
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut cfg = Self::default();
    if let Some(level) = env("SPOT_AGENT_LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
      cfg.level = level;
    }
    cfg.dir = env("SPOT_AGENT_LOG_DIR")
      .filter(|d| !d.trim().is_empty())
      .map(PathBuf::from);
    if let Some(days) = env("SPOT_AGENT_LOG_RETENTION_DAYS").and_then(|d| d.trim().parse().ok()) {
      cfg.retention_days = days;
    }
    cfg
  }
}

/// Installs the global subscriber: stderr always, plus a daily file when `dir` is set.
pub fn init(cfg: &LoggingConfig) -> anyhow::Result<()> {
  let (dispatch, guard) = build_dispatch(cfg)?;
  if let Some(guard) = guard {
    let _ = FILE_GUARD.set(guard);
  }
  dispatch.init();
  Ok(())
}

/// The guard, when present, must live as long as the file layer is expected to flush.
fn build_dispatch(cfg: &LoggingConfig) -> anyhow::Result<(tracing::Dispatch, Option<WorkerGuard>)> {
  let filter = tracing_subscriber::EnvFilter::try_new(&cfg.level)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  let (file_layer, guard) = match cfg.dir.as_deref() {
    Some(log_dir) => {
      fs::create_dir_all(log_dir)?;
      if let Some(cutoff) = retention_cutoff(SystemTime::now(), cfg.retention_days) {
        for path in expired_logs(log_dir, cutoff) {
          let _ = fs::remove_file(&path);
        }
      }

      let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME));
      let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .with_target(true);

  let subscriber = tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer);
  Ok((tracing::Dispatch::new(subscriber), guard))
}

/// `None` means keep everything.
fn retention_cutoff(now: SystemTime, retention_days: u64) -> Option<SystemTime> {
  if retention_days == 0 {
    return None;
  }
  let window = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60));
  Some(now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH))
}

/// Rotated agent logs in `log_dir` last written before `cutoff`. Unreadable entries are skipped.
fn expired_logs(log_dir: &Path, cutoff: SystemTime) -> Vec<PathBuf> {
  let Ok(entries) = fs::read_dir(log_dir) else {
    return Vec::new();
  };
  entries
    .flatten()
    .filter(|entry| is_agent_log_file(&entry.path()))
    .filter(|entry| {
      entry
        .metadata()
        .and_then(|m| m.modified())
        .is_ok_and(|modified| modified < cutoff)
    })
    .map(|entry| entry.path())
    .collect()
}

fn is_agent_log_file(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|n| n.to_str())
    .is_some_and(|name| name == LOG_FILE_NAME || name.starts_with(&format!("{LOG_FILE_NAME}.")))
}
