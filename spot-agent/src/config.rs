use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Process-wide configuration. Built once by bootstrap, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Config {
  pub version: String,
  pub savings_cut: f64,
  pub event_file: Option<PathBuf>,
  pub settings: EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiddingPolicy {
  Normal,
  Aggressive,
}

impl BiddingPolicy {
  fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "normal" => Some(Self::Normal),
      "aggressive" => Some(Self::Aggressive),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagFilteringMode {
  OptIn,
  OptOut,
}

impl TagFilteringMode {
  fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "opt-in" => Some(Self::OptIn),
      "opt-out" => Some(Self::OptOut),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
  #[serde(default)]
  pub regions: Vec<String>,

  #[serde(default)]
  pub min_on_demand_number: u64,

  #[serde(default)]
  pub min_on_demand_percentage: f64,

  #[serde(default = "default_bidding_policy")]
  pub bidding_policy: BiddingPolicy,

  #[serde(default = "default_spot_price_buffer_percentage")]
  pub spot_price_buffer_percentage: f64,

  #[serde(default)]
  pub allowed_instance_types: Vec<String>,

  #[serde(default)]
  pub disallowed_instance_types: Vec<String>,

  #[serde(default = "default_tag_filtering_mode")]
  pub tag_filtering_mode: TagFilteringMode,

  #[serde(default = "default_tag_filters")]
  pub tag_filters: Vec<String>,

  #[serde(default = "default_cron_schedule")]
  pub cron_schedule: String,

  #[serde(default = "default_cron_timezone")]
  pub cron_timezone: String,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      regions: Vec::new(),
      min_on_demand_number: 0,
      min_on_demand_percentage: 0.0,
      bidding_policy: default_bidding_policy(),
      spot_price_buffer_percentage: default_spot_price_buffer_percentage(),
      allowed_instance_types: Vec::new(),
      disallowed_instance_types: Vec::new(),
      tag_filtering_mode: default_tag_filtering_mode(),
      tag_filters: default_tag_filters(),
      cron_schedule: default_cron_schedule(),
      cron_timezone: default_cron_timezone(),
    }
  }
}

fn default_bidding_policy() -> BiddingPolicy {
  BiddingPolicy::Normal
}

fn default_spot_price_buffer_percentage() -> f64 {
  10.0
}

fn default_tag_filtering_mode() -> TagFilteringMode {
  TagFilteringMode::OptIn
}

fn default_tag_filters() -> Vec<String> {
  vec!["spot-enabled=true".to_string()]
}

fn default_cron_schedule() -> String {
  "* *".to_string()
}

fn default_cron_timezone() -> String {
  "UTC".to_string()
}

/// Explicit overrides taken from the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
  pub config_path: Option<PathBuf>,
  pub event_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  event_file: Option<PathBuf>,

  #[serde(default)]
  settings: Option<EngineSettings>,
}

/// Layers file, environment and overrides onto `cfg`, then validates the result.
///
/// `env` is the variable lookup, usually `std::env::var(..).ok()`.
pub fn populate<F>(cfg: &mut Config, overrides: &Overrides, env: F) -> anyhow::Result<()>
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(path) = overrides.config_path.as_deref() {
    apply_file(cfg, path);
  }
  apply_env(cfg, &env);

  if let Some(p) = overrides.event_file.as_ref() {
    cfg.event_file = Some(p.clone());
  }
  if cfg
    .event_file
    .as_ref()
    .map(|p| p.as_os_str().is_empty())
    .unwrap_or(false)
  {
    cfg.event_file = None;
  }

  validate(&mut cfg.settings);
  Ok(())
}

/// A missing, unreadable or malformed file leaves `cfg` untouched.
fn apply_file(cfg: &mut Config, path: &Path) {
  if !path.exists() {
    tracing::info!(path = %path.display(), "config file missing; using defaults");
    return;
  }

  let raw = match fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(e) => {
      tracing::warn!(
        path = %path.display(),
        error = %e,
        "unreadable config file ignored; using defaults"
      );
      return;
    }
  };
  match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      if let Some(settings) = file.settings {
        cfg.settings = settings;
      }
      if file.event_file.is_some() {
        cfg.event_file = file.event_file;
      }
    }
    Err(e) => {
      tracing::warn!(
        path = %path.display(),
        error = %e,
        "invalid config file ignored; using defaults"
      );
    }
  }
}

fn apply_env<F>(cfg: &mut Config, env: &F)
where
  F: Fn(&str) -> Option<String>,
{
  let s = &mut cfg.settings;

  if let Some(v) = env("REGIONS") {
    s.regions = split_list(&v);
  }
  if let Some(v) = env_parsed(env, "MIN_ON_DEMAND_NUMBER", |r| r.trim().parse::<u64>().ok()) {
    s.min_on_demand_number = v;
  }
  if let Some(v) = env_parsed(env, "MIN_ON_DEMAND_PERCENTAGE", |r| r.trim().parse::<f64>().ok()) {
    s.min_on_demand_percentage = v;
  }
  if let Some(v) = env_parsed(env, "BIDDING_POLICY", BiddingPolicy::parse) {
    s.bidding_policy = v;
  }
  if let Some(v) = env_parsed(env, "SPOT_PRICE_BUFFER_PERCENTAGE", |r| {
    r.trim().parse::<f64>().ok()
  }) {
    s.spot_price_buffer_percentage = v;
  }
  if let Some(v) = env("ALLOWED_INSTANCE_TYPES") {
    s.allowed_instance_types = split_list(&v);
  }
  if let Some(v) = env("DISALLOWED_INSTANCE_TYPES") {
    s.disallowed_instance_types = split_list(&v);
  }
  if let Some(v) = env_parsed(env, "TAG_FILTERING_MODE", TagFilteringMode::parse) {
    s.tag_filtering_mode = v;
  }
  if let Some(v) = env("TAG_FILTERS") {
    s.tag_filters = split_list(&v);
  }
  if let Some(v) = env("CRON_SCHEDULE") {
    s.cron_schedule = v;
  }
  if let Some(v) = env("CRON_TIMEZONE") {
    s.cron_timezone = v;
  }
  if let Some(v) = env("EVENT_FILE") {
    cfg.event_file = Some(PathBuf::from(v));
  }
}

fn env_parsed<F, T>(env: &F, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T>
where
  F: Fn(&str) -> Option<String>,
{
  let raw = env(key)?;
  let parsed = parse(&raw);
  if parsed.is_none() {
    tracing::warn!(variable = key, value = %raw, "ignoring unparsable environment value");
  }
  parsed
}

fn split_list(raw: &str) -> Vec<String> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

fn validate(s: &mut EngineSettings) {
  if !(0.0..=100.0).contains(&s.min_on_demand_percentage) {
    tracing::warn!(
      value = s.min_on_demand_percentage,
      "min_on_demand_percentage must be within 0..=100; using 0"
    );
    s.min_on_demand_percentage = 0.0;
  }
  if s.spot_price_buffer_percentage.is_nan() || s.spot_price_buffer_percentage < 0.0 {
    tracing::warn!(
      value = s.spot_price_buffer_percentage,
      "spot_price_buffer_percentage must be >= 0; using default"
    );
    s.spot_price_buffer_percentage = default_spot_price_buffer_percentage();
  }
  if s.cron_schedule.trim().is_empty() {
    s.cron_schedule = default_cron_schedule();
  }
  if s.cron_timezone.trim().is_empty() {
    s.cron_timezone = default_cron_timezone();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::capture_logs;
  use std::collections::HashMap;

  fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |k: &str| map.get(k).cloned()
  }

  fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("spot-agent-{}-{name}", uuid::Uuid::new_v4()))
  }

  #[test]
  fn env_values_override_defaults() {
    let mut cfg = Config::default();
    let env = env_of(&[
      ("REGIONS", "eu-west-1, us-east-1,,"),
      ("MIN_ON_DEMAND_NUMBER", "2"),
      ("BIDDING_POLICY", "Aggressive"),
      ("TAG_FILTERING_MODE", "opt-out"),
      ("EVENT_FILE", "/tmp/event.json"),
    ]);
    populate(&mut cfg, &Overrides::default(), env).unwrap();

    assert_eq!(cfg.settings.regions, vec!["eu-west-1", "us-east-1"]);
    assert_eq!(cfg.settings.min_on_demand_number, 2);
    assert_eq!(cfg.settings.bidding_policy, BiddingPolicy::Aggressive);
    assert_eq!(cfg.settings.tag_filtering_mode, TagFilteringMode::OptOut);
    assert_eq!(cfg.event_file, Some(PathBuf::from("/tmp/event.json")));
  }

  #[test]
  fn unparsable_env_values_are_ignored() {
    let mut cfg = Config::default();
    let env = env_of(&[("MIN_ON_DEMAND_NUMBER", "lots"), ("BIDDING_POLICY", "greedy")]);
    populate(&mut cfg, &Overrides::default(), env).unwrap();

    assert_eq!(cfg.settings.min_on_demand_number, 0);
    assert_eq!(cfg.settings.bidding_policy, BiddingPolicy::Normal);
  }

  #[test]
  fn out_of_range_percentages_degrade_to_defaults() {
    let mut cfg = Config::default();
    let env = env_of(&[
      ("MIN_ON_DEMAND_PERCENTAGE", "150"),
      ("SPOT_PRICE_BUFFER_PERCENTAGE", "-3"),
    ]);
    populate(&mut cfg, &Overrides::default(), env).unwrap();

    assert_eq!(cfg.settings.min_on_demand_percentage, 0.0);
    assert_eq!(cfg.settings.spot_price_buffer_percentage, 10.0);
  }

  #[test]
  fn cli_event_file_wins_over_env_and_empty_means_none() {
    let mut cfg = Config::default();
    let overrides = Overrides {
      config_path: None,
      event_file: Some(PathBuf::from("/from/cli.json")),
    };
    populate(&mut cfg, &overrides, env_of(&[("EVENT_FILE", "/from/env.json")])).unwrap();
    assert_eq!(cfg.event_file, Some(PathBuf::from("/from/cli.json")));

    let mut cfg = Config::default();
    populate(&mut cfg, &Overrides::default(), env_of(&[("EVENT_FILE", "")])).unwrap();
    assert_eq!(cfg.event_file, None);
  }

  #[test]
  fn file_settings_are_layered_under_env() {
    let path = temp_path("config.toml");
    fs::write(
      &path,
      r#"
event_file = "/from/file.json"

[settings]
regions = ["ap-south-1"]
min_on_demand_number = 5
cron_schedule = "9-17 1-5"
"#,
    )
    .unwrap();

    let mut cfg = Config::default();
    let overrides = Overrides {
      config_path: Some(path.clone()),
      event_file: None,
    };
    populate(&mut cfg, &overrides, env_of(&[("MIN_ON_DEMAND_NUMBER", "1")])).unwrap();
    let _ = fs::remove_file(&path);

    assert_eq!(cfg.settings.regions, vec!["ap-south-1"]);
    assert_eq!(cfg.settings.min_on_demand_number, 1);
    assert_eq!(cfg.settings.cron_schedule, "9-17 1-5");
    assert_eq!(cfg.settings.tag_filters, default_tag_filters());
    assert_eq!(cfg.event_file, Some(PathBuf::from("/from/file.json")));
  }

  #[test]
  fn invalid_or_missing_file_keeps_defaults() {
    let path = temp_path("bad.toml");
    fs::write(&path, "settings = [[[").unwrap();
    let mut cfg = Config::default();
    let overrides = Overrides {
      config_path: Some(path.clone()),
      event_file: None,
    };
    populate(&mut cfg, &overrides, env_of(&[])).unwrap();
    let _ = fs::remove_file(&path);
    assert_eq!(cfg.settings, EngineSettings::default());

    let mut cfg = Config::default();
    let overrides = Overrides {
      config_path: Some(temp_path("missing.toml")),
      event_file: None,
    };
    populate(&mut cfg, &overrides, env_of(&[])).unwrap();
    assert_eq!(cfg.settings, EngineSettings::default());
  }

  #[test]
  fn unreadable_file_is_ignored_with_warning() {
    let dir = temp_path("config-dir");
    fs::create_dir_all(&dir).unwrap();
    let mut cfg = Config::default();
    let overrides = Overrides {
      config_path: Some(dir.clone()),
      event_file: None,
    };

    let env = env_of(&[("REGIONS", "eu-west-1")]);
    let (res, logs) = capture_logs(|| populate(&mut cfg, &overrides, env));
    let _ = fs::remove_dir_all(&dir);

    res.unwrap();
    assert!(logs.contains("unreadable config file ignored"));
    assert_eq!(cfg.settings.regions, vec!["eu-west-1".to_string()]);
  }
}
