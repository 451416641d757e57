use crate::bootstrap::BuildInfo;
use crate::config::Overrides;
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "SPOT_AGENT_CONFIG";

#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
  Run(CliOptions),
  PrintVersion,
  PrintHelp,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
  pub event_file: Option<PathBuf>,
  pub config_path: Option<PathBuf>,
}

impl CliOptions {
  /// `--config` wins; otherwise `config_env` (the value of `SPOT_AGENT_CONFIG`) is used.
  pub fn into_overrides(self, config_env: Option<String>) -> Overrides {
    let config_path = self.config_path.or_else(|| {
      config_env
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
    });
    Overrides {
      config_path,
      event_file: self.event_file,
    }
  }
}

pub fn parse_args(args: &[String]) -> anyhow::Result<CliAction> {
  let args = args.get(1..).unwrap_or_default();

  if args.iter().any(|a| a == "--help" || a == "-h") {
    return Ok(CliAction::PrintHelp);
  }
  if args.iter().any(|a| a == "--version") {
    return Ok(CliAction::PrintVersion);
  }

  let mut opts = CliOptions::default();
  let mut i = 0;
  while i < args.len() {
    match args[i].as_str() {
      "--event-file" => {
        opts.event_file = Some(PathBuf::from(flag_value(args, i)?));
        i += 2;
      }
      "--config" => {
        opts.config_path = Some(PathBuf::from(flag_value(args, i)?));
        i += 2;
      }
      other => anyhow::bail!("unknown argument `{other}`; see --help"),
    }
  }

  Ok(CliAction::Run(opts))
}

fn flag_value(args: &[String], i: usize) -> anyhow::Result<&str> {
  args
    .get(i + 1)
    .map(|s| s.as_str())
    .filter(|v| !v.starts_with("--"))
    .ok_or_else(|| anyhow::anyhow!("expected a value after `{}`", args[i]))
}

pub fn print_help(build: &BuildInfo) {
  println!("spot-agent {}", build.version);
  println!();
  println!("Replaces on-demand capacity with spot capacity.");
  println!();
  println!("USAGE:");
  println!("  spot-agent [--event-file <path>] [--config <path>]");
  println!("  spot-agent --version");
  println!();
  println!("With no event file and outside a function runtime, runs one full scan.");
  println!("The config path defaults to ${CONFIG_PATH_ENV}; EVENT_FILE is also honored.");
}
