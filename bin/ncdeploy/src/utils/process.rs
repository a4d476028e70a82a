use std::process::Stdio;

use ncdeploy_error::io::{FromIo, IoResult};

use crate::error::{DeployError, DeployResult};
use crate::models::{ProcessCmd, ProcessOutput};

/// Executes external commands.
///
/// A non-zero exit code is not an error at this level,
/// callers decide what an exit code means.
#[allow(async_fn_in_trait)]
pub trait ProcessRunner: Clone {
  async fn run(&self, cmd: &ProcessCmd) -> IoResult<ProcessOutput>;

  /// Same as `run` but a non-zero exit becomes [`DeployError::ExecutionFailed`]
  async fn run_or_fail(&self, cmd: &ProcessCmd) -> DeployResult<ProcessOutput> {
    let output = self.run(cmd).await?;
    if !output.success() {
      return Err(DeployError::ExecutionFailed {
        command: cmd.to_string(),
        exit_code: output.code,
        stderr: output.combined(),
      });
    }
    Ok(output)
  }
}

/// Runs commands on the host
#[derive(Clone, Debug, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
  async fn run(&self, cmd: &ProcessCmd) -> IoResult<ProcessOutput> {
    log::debug!("process::run: {cmd}");
    let output = tokio::process::Command::new(&cmd.program)
      .args(&cmd.args)
      .envs(&cmd.envs)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|err| err.map_err_context(|| format!("Unable to run {cmd}")))?;
    let output = ProcessOutput::from(output);
    log::debug!("process::run: {} exited with {}", cmd.program, output.code);
    Ok(output)
  }
}
