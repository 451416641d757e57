use crate::bootstrap::Ready;
use crate::engine::{CancelToken, Engine, InvocationContext, RawEvent};
use crate::lambda::{self, HttpRuntimeApi};
use crate::mode::RunMode;
use std::fs;

/// Runs the path for `mode`. Replay and direct runs dispatch exactly once; the
/// managed path dispatches once per platform invocation.
pub fn dispatch<E: Engine>(
  ready: &Ready<E>,
  mode: &RunMode,
  cancel: &CancelToken,
) -> anyhow::Result<()> {
  tracing::info!(mode = mode.label(), "runtime mode selected");
  match mode {
    RunMode::ManagedFunction => {
      let api = HttpRuntimeApi::from_env()?;
      lambda::serve(&api, ready, cancel)
    }
    RunMode::OfflineReplay(path) => {
      let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
          tracing::error!(path = %path.display(), error = %e, "cannot read event file");
          return Err(anyhow::Error::new(e).context(format!("read event file {}", path.display())));
        }
      };
      let ctx = InvocationContext::local(cancel.clone());
      dispatch_once(ready, &ctx, Some(&RawEvent::new(bytes)))
    }
    RunMode::DirectRun => {
      let ctx = InvocationContext::local(cancel.clone());
      dispatch_once(ready, &ctx, None)
    }
  }
}

/// One start marker, one engine call, one completion marker.
pub fn dispatch_once<E: Engine>(
  ready: &Ready<E>,
  ctx: &InvocationContext,
  event: Option<&RawEvent>,
) -> anyhow::Result<()> {
  let _work = ctx.cancel.begin_work();
  let cfg = ready.config();
  tracing::info!(
    version = %cfg.version,
    savings_cut = cfg.savings_cut,
    request_id = %ctx.request_id,
    "starting spot agent, build {}, charging {} percent of savings",
    cfg.version,
    cfg.savings_cut
  );
  tracing::info!(config = ?cfg, "configuration flags");

  ready.engine().handle_event(ctx, event)?;

  tracing::info!(request_id = %ctx.request_id, "execution completed, nothing left to do");
  Ok(())
}
