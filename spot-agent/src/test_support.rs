use crate::config::Config;
use crate::engine::{Engine, InvocationContext, RawEvent};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  Populate,
  Init,
  Handle {
    event: Option<Vec<u8>>,
    request_id: String,
  },
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
  fn push(&self, call: Call) {
    self.0.lock().unwrap().push(call);
  }

  pub fn snapshot(&self) -> Vec<Call> {
    self.0.lock().unwrap().clone()
  }

  pub fn handled(&self) -> Vec<Option<Vec<u8>>> {
    self
      .snapshot()
      .into_iter()
      .filter_map(|c| match c {
        Call::Handle { event, .. } => Some(event),
        _ => None,
      })
      .collect()
  }
}

/// Engine double that records every call and can be told to fail at any step.
#[derive(Debug, Default)]
pub struct FakeEngine {
  calls: CallLog,
  managed: bool,
  event_file: Option<PathBuf>,
  fail_populate: bool,
  fail_init: bool,
  fail_handle: bool,
  initialized: Option<Config>,
}

impl FakeEngine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn managed(mut self) -> Self {
    self.managed = true;
    self
  }

  pub fn with_event_file(mut self, path: &str) -> Self {
    self.event_file = Some(PathBuf::from(path));
    self
  }

  pub fn failing_populate(mut self) -> Self {
    self.fail_populate = true;
    self
  }

  pub fn failing_init(mut self) -> Self {
    self.fail_init = true;
    self
  }

  pub fn failing_handle(mut self) -> Self {
    self.fail_handle = true;
    self
  }

  pub fn calls(&self) -> CallLog {
    self.calls.clone()
  }

  pub fn initialized_with(&self) -> Option<&Config> {
    self.initialized.as_ref()
  }
}

impl Engine for FakeEngine {
  fn running_under_managed_runtime(&self) -> bool {
    self.managed
  }

  fn populate_config(&self, cfg: &mut Config) -> anyhow::Result<()> {
    self.calls.push(Call::Populate);
    if self.fail_populate {
      anyhow::bail!("populate failed");
    }
    if self.event_file.is_some() {
      cfg.event_file = self.event_file.clone();
    }
    Ok(())
  }

  fn init(&mut self, cfg: &Config) -> anyhow::Result<()> {
    self.calls.push(Call::Init);
    if self.fail_init {
      anyhow::bail!("init failed");
    }
    self.initialized = Some(cfg.clone());
    Ok(())
  }

  fn handle_event(&self, ctx: &InvocationContext, event: Option<&RawEvent>) -> anyhow::Result<()> {
    self.calls.push(Call::Handle {
      event: event.map(|e| e.as_bytes().to_vec()),
      request_id: ctx.request_id.clone(),
    });
    anyhow::ensure!(self.initialized.is_some(), "event handled before init");
    if self.fail_handle {
      anyhow::bail!("handler failed");
    }
    Ok(())
  }
}

#[derive(Clone, Default)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Runs `f` with a thread-local subscriber and returns everything it logged.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
  let writer = CaptureWriter::default();
  let sink = writer.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_ansi(false)
    .with_max_level(tracing::Level::TRACE)
    .with_writer(move || sink.clone())
    .finish();

  let out = tracing::subscriber::with_default(subscriber, f);
  let logs = String::from_utf8_lossy(&writer.0.lock().unwrap()).into_owned();
  (out, logs)
}
