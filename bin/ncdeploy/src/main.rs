use clap::Parser;

mod cli;
mod utils;
mod error;
mod config;
mod models;
mod version;
mod commands;
mod orchestrator;

use cli::{Cli, Commands};
use config::DeployConfig;
use error::DeployResult;
use ncdeploy_error::io::IoError;
use orchestrator::Orchestrator;
use utils::process::{ProcessRunner, SystemRunner};

/// Load the dotenv file before the deployment file gets rendered.
/// An explicit file must exist, the default `.env` is optional.
fn load_env_file(env_file: Option<&str>) -> DeployResult<()> {
  match env_file {
    Some(path) => {
      dotenvy::from_filename(path).map_err(|err| {
        IoError::invalid_input(format!("Env file {path}"), err)
      })?;
    }
    None => match dotenvy::dotenv() {
      Ok(path) => log::debug!("env: loaded {}", path.display()),
      Err(err) if err.not_found() => {}
      Err(err) => {
        return Err(IoError::invalid_input("Env file .env", err).into());
      }
    },
  }
  Ok(())
}

async fn execute_args<R>(args: &Cli, runner: &R) -> DeployResult<()>
where
  R: ProcessRunner,
{
  if let Commands::Version = &args.command {
    commands::exec_version();
    return Ok(());
  }
  load_env_file(args.env_file.as_deref())?;
  let config = DeployConfig::from_file(&args.config)?;
  let orchestrator = Orchestrator::new(config, runner);
  match &args.command {
    Commands::Rollout => commands::exec_rollout(&orchestrator).await,
    Commands::Bootstrap(opts) => {
      commands::exec_bootstrap(&orchestrator, opts).await
    }
    Commands::Cert => commands::exec_cert(&orchestrator).await,
    Commands::Version => Ok(()),
  }
}

#[ntex::main]
async fn main() -> std::io::Result<()> {
  let args = Cli::parse();
  ncdeploy_utils::logger::enable_logger("ncdeploy", args.verbose);
  log::debug!("ncdeploy: {args:?}");
  if let Err(err) = execute_args(&args, &SystemRunner).await {
    err.exit();
  }
  Ok(())
}
