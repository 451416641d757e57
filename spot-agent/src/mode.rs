use crate::bootstrap::Ready;
use crate::engine::Engine;
use std::path::{Path, PathBuf};

/// How the process was invoked. Exactly one applies per process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
  /// Hosted by the managed-function runtime; events arrive per invocation.
  ManagedFunction,
  /// A single event replayed from a local file.
  OfflineReplay(PathBuf),
  /// No trigger at all: one unattended full pass.
  DirectRun,
}

impl RunMode {
  /// First match wins: managed runtime, then a non-empty event file, then direct run.
  /// Under the managed runtime the platform supplies events, so a configured file
  /// is ignored there.
  pub fn classify(managed: bool, event_file: Option<&Path>) -> Self {
    if managed {
      return Self::ManagedFunction;
    }
    match event_file {
      Some(p) if !p.as_os_str().is_empty() => Self::OfflineReplay(p.to_path_buf()),
      _ => Self::DirectRun,
    }
  }

  pub fn select<E: Engine>(ready: &Ready<E>) -> Self {
    let managed = ready.engine().running_under_managed_runtime();
    Self::classify(managed, ready.config().event_file.as_deref())
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::ManagedFunction => "managed-function",
      Self::OfflineReplay(_) => "offline-replay",
      Self::DirectRun => "direct-run",
    }
  }
}
