use anyhow::Context;

fn main() -> anyhow::Result<()> {
  let args: Vec<String> = std::env::args().collect();
  spot_agent::run(&args).context("run spot agent")
}
