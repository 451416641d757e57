use crate::engine::CancelToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Conventional exit status for a process stopped by SIGINT.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
  /// Nothing worth finishing is running, or the signal was repeated.
  ExitNow,
  /// Let the running engine call finish; callers stop before taking more work.
  Drain,
}

/// Decides what a Ctrl-C or SIGTERM does to the process.
#[derive(Debug, Clone)]
pub struct StopSignal {
  cancel: CancelToken,
  received: Arc<AtomicUsize>,
}

impl StopSignal {
  pub fn new(cancel: CancelToken) -> Self {
    Self {
      cancel,
      received: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Always cancels the token. Exits unless this is the first signal and an
  /// engine call is in flight.
  pub fn on_signal(&self) -> SignalAction {
    let earlier = self.received.fetch_add(1, Ordering::SeqCst);
    self.cancel.cancel();
    if earlier > 0 || self.cancel.is_idle() {
      SignalAction::ExitNow
    } else {
      SignalAction::Drain
    }
  }
}

/// Installs the process-wide handler. A blocked long-poll has no work in
/// flight, so the first signal there ends the process immediately.
pub fn install(cancel: &CancelToken) -> anyhow::Result<()> {
  let stop = StopSignal::new(cancel.clone());
  ctrlc::set_handler(move || match stop.on_signal() {
    SignalAction::Drain => {
      tracing::warn!("stop requested; finishing the running invocation, signal again to exit now");
    }
    SignalAction::ExitNow => {
      tracing::warn!("stop requested; exiting");
      std::process::exit(INTERRUPTED_EXIT_CODE);
    }
  })?;
  Ok(())
}
