use crate::config::{self, Config, EngineSettings, Overrides};
use crate::engine::{Engine, InvocationContext, RawEvent};
use crate::events::EventKind;

/// Set by the managed-function platform in every function process.
pub const FUNCTION_NAME_ENV: &str = "AWS_LAMBDA_FUNCTION_NAME";

/// Built-in engine front. It owns settings resolution and event routing and
/// records the work each event asks for.
pub struct Agent {
  overrides: Overrides,
  env: Box<dyn Fn(&str) -> Option<String>>,
  settings: Option<EngineSettings>,
}

impl Agent {
  pub fn new(overrides: Overrides) -> Self {
    Self::with_env(overrides, |key| std::env::var(key).ok())
  }

  pub fn with_env<F>(overrides: Overrides, env: F) -> Self
  where
    F: Fn(&str) -> Option<String> + 'static,
  {
    Self {
      overrides,
      env: Box::new(env),
      settings: None,
    }
  }

  fn regions_label(settings: &EngineSettings) -> String {
    if settings.regions.is_empty() {
      "all".to_string()
    } else {
      settings.regions.join(",")
    }
  }
}

impl Engine for Agent {
  fn running_under_managed_runtime(&self) -> bool {
    (self.env)(FUNCTION_NAME_ENV)
      .map(|name| !name.is_empty())
      .unwrap_or(false)
  }

  fn populate_config(&self, cfg: &mut Config) -> anyhow::Result<()> {
    config::populate(cfg, &self.overrides, |key| (self.env)(key))
  }

  fn init(&mut self, cfg: &Config) -> anyhow::Result<()> {
    if self.settings.is_some() {
      anyhow::bail!("agent already initialized");
    }
    tracing::info!(
      regions = %Self::regions_label(&cfg.settings),
      bidding_policy = ?cfg.settings.bidding_policy,
      tag_filtering_mode = ?cfg.settings.tag_filtering_mode,
      "agent initialized"
    );
    self.settings = Some(cfg.settings.clone());
    Ok(())
  }

  fn handle_event(&self, ctx: &InvocationContext, event: Option<&RawEvent>) -> anyhow::Result<()> {
    let settings = self
      .settings
      .as_ref()
      .ok_or_else(|| anyhow::anyhow!("agent not initialized"))?;

    if ctx.is_cancelled() {
      tracing::warn!(request_id = %ctx.request_id, "cancelled before handling; skipping event");
      return Ok(());
    }

    let kind = EventKind::classify(event);
    match &kind {
      EventKind::FullScan | EventKind::Scheduled => {
        tracing::info!(
          kind = kind.label(),
          regions = %Self::regions_label(settings),
          schedule = %settings.cron_schedule,
          timezone = %settings.cron_timezone,
          "full scan requested"
        );
      }
      EventKind::SpotInterruption { instance_id }
      | EventKind::RebalanceRecommendation { instance_id } => {
        tracing::info!(
          kind = kind.label(),
          instance_id = instance_id.as_deref().unwrap_or("<none>"),
          "spot instance replacement requested"
        );
      }
      EventKind::InstanceStateChange { instance_id, state } => {
        tracing::info!(
          kind = kind.label(),
          instance_id = instance_id.as_deref().unwrap_or("<none>"),
          state = state.as_deref().unwrap_or("<none>"),
          "instance state change received"
        );
      }
      EventKind::AutoScalingApiCall { event_name } => {
        tracing::info!(
          kind = kind.label(),
          event_name = event_name.as_deref().unwrap_or("<none>"),
          "auto scaling API call received"
        );
      }
      EventKind::Unknown { detail_type } => {
        tracing::warn!(
          detail_type = detail_type.as_deref().unwrap_or("<none>"),
          "unrecognized event; nothing to do"
        );
      }
    }

    if let Some(left) = ctx.remaining() {
      tracing::debug!(remaining_ms = left.as_millis() as u64, "time left before deadline");
    }
    Ok(())
  }
}
