pub mod agent;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod lambda;
pub mod logging;
pub mod mode;
pub mod shutdown;

#[cfg(test)]
mod test_support;

use crate::agent::Agent;
use crate::bootstrap::BuildInfo;
use crate::cli::CliAction;
use crate::engine::{CancelToken, Engine};
use crate::lambda::{HttpRuntimeApi, RuntimeApi};
use crate::mode::RunMode;

/// Composition root: bootstrap the built-in agent, pick the runtime mode, dispatch.
pub fn run(args: &[String]) -> anyhow::Result<()> {
  let build = BuildInfo::from_build_env();
  let opts = match cli::parse_args(args)? {
    CliAction::PrintVersion => {
      println!("{}", build.version);
      return Ok(());
    }
    CliAction::PrintHelp => {
      cli::print_help(&build);
      return Ok(());
    }
    CliAction::Run(opts) => opts,
  };

  logging::init(&logging::LoggingConfig::from_env(|key: &str| {
    std::env::var(key).ok()
  }))?;

  let overrides = opts.into_overrides(std::env::var(cli::CONFIG_PATH_ENV).ok());
  let agent = Agent::new(overrides);
  let managed = agent.running_under_managed_runtime();

  let ready = match bootstrap::bootstrap(agent, &build) {
    Ok(ready) => ready,
    Err(e) => {
      tracing::error!(error = ?e, "bootstrap failed");
      if managed {
        report_init_failure(&e);
      }
      return Err(e);
    }
  };

  let cancel = CancelToken::new();
  shutdown::install(&cancel)?;

  let mode = RunMode::select(&ready);
  dispatch::dispatch(&ready, &mode, &cancel)
}

fn report_init_failure(error: &anyhow::Error) {
  let res = HttpRuntimeApi::from_env().and_then(|api| api.report_init_failure(error));
  if let Err(e) = res {
    tracing::warn!(error = ?e, "could not report init failure to the runtime API");
  }
}
