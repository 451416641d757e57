use crate::config::Config;
use crate::engine::Engine;
use anyhow::Context;

/// Build label used when the build did not stamp one in.
pub const DEFAULT_VERSION: &str = "number missing";

/// Savings cut used when the build did not stamp one in.
pub const DEFAULT_SAVINGS_CUT: &str = "0";

/// Inputs fixed at compile time through `SPOT_AGENT_VERSION` and
/// `SPOT_AGENT_SAVINGS_CUT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
  pub version: String,
  pub savings_cut: String,
}

impl BuildInfo {
  pub fn from_build_env() -> Self {
    Self {
      version: option_env!("SPOT_AGENT_VERSION")
        .unwrap_or(DEFAULT_VERSION)
        .to_string(),
      savings_cut: option_env!("SPOT_AGENT_SAVINGS_CUT")
        .unwrap_or(DEFAULT_SAVINGS_CUT)
        .to_string(),
    }
  }
}

/// Parsed savings percentage. `diagnostic` is set when the raw value was rejected
/// and `percent` fell back to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsCut {
  pub percent: f64,
  pub diagnostic: Option<String>,
}

impl SavingsCut {
  pub fn is_degraded(&self) -> bool {
    self.diagnostic.is_some()
  }
}

// Zero on failure is kept as the no-charge default; startup must not stop here.
pub fn parse_savings_cut(raw: &str) -> SavingsCut {
  match raw.parse::<f64>() {
    Ok(percent) => SavingsCut {
      percent,
      diagnostic: None,
    },
    Err(e) => SavingsCut {
      percent: 0.0,
      diagnostic: Some(format!("failed to convert savings cut {raw:?} to float: {e}")),
    },
  }
}

/// An engine that has been configured and initialized. Only [`bootstrap`] builds one.
pub struct Ready<E> {
  engine: E,
  config: Config,
}

impl<E: Engine> Ready<E> {
  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn config(&self) -> &Config {
    &self.config
  }
}

pub fn bootstrap<E: Engine>(mut engine: E, build: &BuildInfo) -> anyhow::Result<Ready<E>> {
  let cut = parse_savings_cut(&build.savings_cut);
  if let Some(diagnostic) = cut.diagnostic.as_deref() {
    tracing::warn!(
      raw = %build.savings_cut,
      reason = %diagnostic,
      "savings cut is not a number; charging 0 percent"
    );
  }

  let mut config = Config {
    version: build.version.clone(),
    savings_cut: cut.percent,
    ..Config::default()
  };

  engine
    .populate_config(&mut config)
    .context("populate configuration")?;
  engine.init(&config).context("initialize engine")?;

  Ok(Ready { engine, config })
}
