use std::collections::HashMap;

use crate::error::{DeployError, DeployResult};
use crate::models::{ProcessCmd, VolumeRef, SERVICE_LABEL};

use super::process::ProcessRunner;

/// Keeps the persistent volume of the service around.
///
/// It never issues a destructive command: an existing volume
/// is returned untouched.
#[derive(Clone)]
pub struct VolumeManager<R> {
  engine: String,
  runner: R,
}

impl<R: ProcessRunner> VolumeManager<R> {
  pub fn new(engine: &str, runner: &R) -> Self {
    Self {
      engine: engine.to_owned(),
      runner: runner.clone(),
    }
  }

  fn unavailable(volume: &str, output: String) -> DeployError {
    DeployError::VolumeUnavailable {
      volume: volume.to_owned(),
      output,
    }
  }

  async fn exists(&self, name: &str) -> DeployResult<bool> {
    let cmd = ProcessCmd::new(&self.engine).args(["volume", "ls", "--quiet"]);
    let output = self
      .runner
      .run(&cmd)
      .await
      .map_err(|err| Self::unavailable(name, err.to_string()))?;
    if !output.success() {
      return Err(Self::unavailable(name, output.combined()));
    }
    Ok(output.stdout.lines().any(|line| line.trim() == name))
  }

  /// Create the volume unless it already exists
  pub async fn ensure_volume(
    &self,
    name: &str,
    service: &str,
  ) -> DeployResult<VolumeRef> {
    if self.exists(name).await? {
      log::info!("volume::ensure: {name} exists, keeping it");
      self.describe(name, service).await;
      return Ok(VolumeRef {
        name: name.to_owned(),
        existed: true,
      });
    }
    log::info!("volume::ensure: creating {name}");
    let cmd = ProcessCmd::new(&self.engine)
      .args(["volume", "create", "--label"])
      .arg(format!("{SERVICE_LABEL}={service}"))
      .arg(name);
    let output = self
      .runner
      .run(&cmd)
      .await
      .map_err(|err| Self::unavailable(name, err.to_string()))?;
    if !output.success() {
      return Err(Self::unavailable(name, output.combined()));
    }
    Ok(VolumeRef {
      name: name.to_owned(),
      existed: false,
    })
  }

  /// Log the labels of a volume, diagnostics only
  async fn describe(&self, name: &str, service: &str) {
    let cmd = ProcessCmd::new(&self.engine)
      .args(["volume", "inspect", "--format", "{{json .Labels}}"])
      .arg(name);
    let output = match self.runner.run(&cmd).await {
      Ok(output) if output.success() => output,
      Ok(output) => {
        log::warn!("volume::describe: {name} {}", output.combined());
        return;
      }
      Err(err) => {
        log::warn!("volume::describe: {name} {err}");
        return;
      }
    };
    let labels: Option<HashMap<String, String>> =
      match serde_json::from_str(output.stdout.trim()) {
        Ok(labels) => labels,
        Err(err) => {
          log::warn!("volume::describe: {name} unreadable labels {err}");
          return;
        }
      };
    let labels = labels.unwrap_or_default();
    log::debug!("volume::describe: {name} labels {labels:?}");
    match labels.get(SERVICE_LABEL) {
      Some(owner) if owner == service => {}
      Some(owner) => {
        log::warn!("volume::describe: {name} was created for {owner}")
      }
      None => log::debug!("volume::describe: {name} was not created by us"),
    }
  }
}
