use crate::config::Config;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The capacity-management engine, as seen from the process bootstrap.
///
/// `populate_config` and `init` are each called once, in that order, by
/// [`crate::bootstrap::bootstrap`]. `handle_event` may then be called any number
/// of times through a shared reference.
pub trait Engine {
  fn running_under_managed_runtime(&self) -> bool;

  fn populate_config(&self, cfg: &mut Config) -> anyhow::Result<()>;

  fn init(&mut self, cfg: &Config) -> anyhow::Result<()>;

  fn handle_event(&self, ctx: &InvocationContext, event: Option<&RawEvent>) -> anyhow::Result<()>;
}

/// Undecoded event bytes, exactly as delivered by the platform or read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent(Vec<u8>);

impl RawEvent {
  pub fn new(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<Vec<u8>> for RawEvent {
  fn from(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }
}

/// Stop flag shared by the signal handler and every dispatch, plus a count of
/// engine calls currently running.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
  in_flight: Arc<AtomicUsize>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }

  /// Counts as in flight until the returned guard is dropped.
  pub fn begin_work(&self) -> WorkGuard {
    self.in_flight.fetch_add(1, Ordering::SeqCst);
    WorkGuard(self.in_flight.clone())
  }

  pub fn is_idle(&self) -> bool {
    self.in_flight.load(Ordering::SeqCst) == 0
  }
}

#[derive(Debug)]
pub struct WorkGuard(Arc<AtomicUsize>);

impl Drop for WorkGuard {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

/// Per-invocation metadata handed to the engine untouched.
#[derive(Debug, Clone)]
pub struct InvocationContext {
  pub request_id: String,
  pub deadline_unix_ms: Option<u64>,
  pub invoked_function_arn: Option<String>,
  pub trace_id: Option<String>,
  pub cancel: CancelToken,
}

impl InvocationContext {
  /// Context for a run that was not triggered by the platform.
  pub fn local(cancel: CancelToken) -> Self {
    Self {
      request_id: uuid::Uuid::new_v4().to_string(),
      deadline_unix_ms: None,
      invoked_function_arn: None,
      trace_id: None,
      cancel,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Time left before the platform deadline, `None` when there is no deadline.
  pub fn remaining(&self) -> Option<Duration> {
    let deadline = self.deadline_unix_ms?;
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_millis() as u64;
    Some(Duration::from_millis(deadline.saturating_sub(now)))
  }
}
