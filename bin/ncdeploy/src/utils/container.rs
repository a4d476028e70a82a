use std::time::{Duration, Instant};

use crate::config::RolloutConfig;
use crate::error::{DeployError, DeployResult};
use crate::models::{
  ProcessCmd, ProcessOutput, ServiceSpec, VolumeRef, ImageRef, ContainerState,
  ContainerStatus, ContainerInstance, SERVICE_LABEL,
};

use super::process::ProcessRunner;

const STATUS_FORMAT: &str =
  "{{.State.Status}}|{{if .State.Health}}{{.State.Health.Status}}{{end}}";

fn is_not_found(output: &ProcessOutput) -> bool {
  output.combined().to_lowercase().contains("no such container")
}

/// Where and under which name an instance gets started
#[derive(Clone, Debug)]
pub struct Slot {
  pub name: String,
  pub host_port: u16,
}

impl Slot {
  pub fn new(name: &str, host_port: u16) -> Self {
    Self {
      name: name.to_owned(),
      host_port,
    }
  }
}

/// Stops, starts and watches the containers of the service
#[derive(Clone)]
pub struct ContainerManager<R> {
  engine: String,
  runner: R,
}

impl<R: ProcessRunner> ContainerManager<R> {
  pub fn new(engine: &str, runner: &R) -> Self {
    Self {
      engine: engine.to_owned(),
      runner: runner.clone(),
    }
  }

  fn cmd(&self) -> ProcessCmd {
    ProcessCmd::new(&self.engine)
  }

  /// Run a step where a missing container counts as done
  async fn run_tolerant(&self, cmd: ProcessCmd) -> DeployResult<bool> {
    let output = self.runner.run(&cmd).await?;
    if output.success() {
      return Ok(true);
    }
    if is_not_found(&output) {
      return Ok(false);
    }
    Err(DeployError::ExecutionFailed {
      command: cmd.to_string(),
      exit_code: output.code,
      stderr: output.combined(),
    })
  }

  /// Stop then remove the container called `name` if there is one
  pub async fn teardown(&self, name: &str) -> DeployResult<()> {
    let stopped = self.run_tolerant(self.cmd().arg("stop").arg(name)).await?;
    let removed = self.run_tolerant(self.cmd().arg("rm").arg(name)).await?;
    match (stopped, removed) {
      (false, false) => log::info!("container::teardown: {name} is absent"),
      _ => log::info!("container::teardown: {name} removed"),
    }
    Ok(())
  }

  /// Names of the running containers publishing `port` on the host
  pub async fn port_holders(&self, port: u16) -> DeployResult<Vec<String>> {
    let cmd = self
      .cmd()
      .args(["container", "ls", "--filter"])
      .arg(format!("publish={port}"))
      .args(["--format", "{{.Names}}"]);
    let output = self.runner.run_or_fail(&cmd).await?;
    let names = output
      .stdout
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(ToOwned::to_owned)
      .collect();
    Ok(names)
  }

  /// Fail when something still listens on the host port we are about to bind
  pub async fn ensure_port_free(&self, port: u16) -> DeployResult<()> {
    let holders = self.port_holders(port).await?;
    if holders.is_empty() {
      return Ok(());
    }
    Err(DeployError::DeploymentFailed {
      container: holders.join(","),
      reason: format!("host port {port} is still published"),
      logs: String::new(),
    })
  }

  /// Start a detached instance of `image` in `slot`.
  ///
  /// Environment values are handed to the engine through its own
  /// environment, the command line only carries the keys.
  pub async fn launch(
    &self,
    spec: &ServiceSpec,
    slot: &Slot,
    volume: &VolumeRef,
    image: &ImageRef,
  ) -> DeployResult<ContainerInstance> {
    let mount = format!("{}:{}", volume.name, spec.mount_path);
    let mut cmd = self
      .cmd()
      .args(["run", "--detach", "--name"])
      .arg(&slot.name)
      .arg("--publish")
      .arg(format!("{}:{}", slot.host_port, spec.container_port))
      .arg("--volume")
      .arg(&mount)
      .arg("--restart")
      .arg(spec.restart_policy.to_string())
      .arg("--label")
      .arg(format!("{SERVICE_LABEL}={}", spec.name));
    for (key, value) in &spec.env {
      cmd = cmd.arg("--env").arg(key).env(key, value);
    }
    let cmd = cmd.arg(image.to_string());
    log::info!(
      "container::launch: {} from {image} on port {}",
      slot.name,
      slot.host_port
    );
    let output = self.runner.run_or_fail(&cmd).await?;
    let id = match output.stdout.trim() {
      "" => slot.name.clone(),
      id => id.to_owned(),
    };
    Ok(ContainerInstance {
      id,
      name: slot.name.clone(),
      image: image.clone(),
      host_port: slot.host_port,
      container_port: spec.container_port,
      mounts: vec![mount],
      env: spec.env.keys().cloned().collect(),
      state: ContainerState::Created,
    })
  }

  /// Current state of a container, absent when the engine does not know it
  pub async fn status(&self, name: &str) -> DeployResult<ContainerStatus> {
    let cmd = self
      .cmd()
      .args(["container", "inspect", "--format", STATUS_FORMAT])
      .arg(name);
    let output = self.runner.run(&cmd).await?;
    if output.success() {
      return Ok(ContainerStatus::parse(&output.stdout)?);
    }
    if is_not_found(&output) {
      return Ok(ContainerStatus::absent());
    }
    Err(DeployError::ExecutionFailed {
      command: cmd.to_string(),
      exit_code: output.code,
      stderr: output.combined(),
    })
  }

  /// Last `tail` lines of the container output, empty when unavailable
  pub async fn logs(&self, name: &str, tail: usize) -> String {
    let cmd = self
      .cmd()
      .args(["logs", "--tail"])
      .arg(tail.to_string())
      .arg(name);
    match self.runner.run(&cmd).await {
      Ok(output) if output.success() => output.tail(tail),
      Ok(output) => {
        log::warn!("container::logs: {name} {}", output.combined());
        String::new()
      }
      Err(err) => {
        log::warn!("container::logs: {name} {err}");
        String::new()
      }
    }
  }

  /// Wait until the container is ready, the reason is returned otherwise
  async fn wait_ready(
    &self,
    name: &str,
    timeout: Duration,
    poll: Duration,
  ) -> DeployResult<Result<ContainerStatus, String>> {
    let started = Instant::now();
    loop {
      let status = self.status(name).await?;
      log::debug!(
        "container::verify: {name} is {} health {:?}",
        status.state,
        status.health
      );
      if status.is_ready() {
        return Ok(Ok(status));
      }
      if status.is_failed() {
        let reason = match status.health.as_deref() {
          Some("unhealthy") => "container is unhealthy".to_owned(),
          _ => format!("container is {}", status.state),
        };
        return Ok(Err(reason));
      }
      if started.elapsed() >= timeout {
        return Ok(Err(format!(
          "still {} after {}s",
          status.state,
          timeout.as_secs()
        )));
      }
      ntex::time::sleep(poll).await;
    }
  }

  /// Poll the instance until it runs, or fail with its latest output
  pub async fn verify_running(
    &self,
    instance: &ContainerInstance,
    rollout: &RolloutConfig,
  ) -> DeployResult<ContainerInstance> {
    let name = &instance.name;
    match self
      .wait_ready(name, rollout.verify_timeout(), rollout.poll_interval())
      .await?
    {
      Ok(status) => {
        log::info!("container::verify: {name} is running");
        Ok(ContainerInstance {
          state: status.state,
          ..instance.clone()
        })
      }
      Err(reason) => {
        log::error!("container::verify: {name} {reason}");
        let logs = self.logs(name, rollout.log_tail).await;
        Err(DeployError::DeploymentFailed {
          container: name.clone(),
          reason,
          logs,
        })
      }
    }
  }
}
