use crate::config::BuildConfig;
use crate::error::{DeployError, DeployResult};
use crate::models::{ImageRef, ProcessCmd};

use super::process::ProcessRunner;

/// Lines of build output kept in a [`DeployError::BuildFailed`]
const BUILD_OUTPUT_TAIL: usize = 50;

/// Builds images under a staging tag and promotes them
#[derive(Clone)]
pub struct ImageManager<R> {
  engine: String,
  runner: R,
}

impl<R: ProcessRunner> ImageManager<R> {
  pub fn new(engine: &str, runner: &R) -> Self {
    Self {
      engine: engine.to_owned(),
      runner: runner.clone(),
    }
  }

  fn cmd(&self) -> ProcessCmd {
    ProcessCmd::new(&self.engine)
  }

  /// Build the image from scratch under `staging`
  pub async fn build_staged(
    &self,
    build: &BuildConfig,
    staging: &ImageRef,
  ) -> DeployResult<ImageRef> {
    log::info!("image::build: {staging} from {}", build.context);
    let mut cmd = self
      .cmd()
      .args(["build", "--no-cache", "--tag"])
      .arg(staging.to_string());
    if let Some(dockerfile) = &build.dockerfile {
      cmd = cmd.arg("--file").arg(dockerfile);
    }
    let cmd = cmd.arg(&build.context);
    let output = self.runner.run(&cmd).await?;
    if !output.success() {
      return Err(DeployError::BuildFailed {
        image: staging.to_string(),
        output: output.tail(BUILD_OUTPUT_TAIL),
      });
    }
    log::info!("image::build: {staging} done");
    Ok(staging.clone())
  }

  /// Id of an image, `None` when it does not exist
  pub async fn image_id(&self, image: &ImageRef) -> Option<String> {
    let cmd = self
      .cmd()
      .args(["image", "inspect", "--format", "{{.Id}}"])
      .arg(image.to_string());
    match self.runner.run(&cmd).await {
      Ok(output) if output.success() => {
        Some(output.stdout.trim().to_owned()).filter(|id| !id.is_empty())
      }
      _ => None,
    }
  }

  /// Point `promoted` at the staged image then drop the staging tag.
  ///
  /// Only called with a fully built `staging` image.
  pub async fn promote(
    &self,
    staging: &ImageRef,
    promoted: &ImageRef,
  ) -> DeployResult<ImageRef> {
    match self.image_id(promoted).await {
      Some(id) => log::info!("image::promote: {promoted} was {id}"),
      None => log::info!("image::promote: no previous {promoted}"),
    }
    let cmd = self
      .cmd()
      .arg("tag")
      .arg(staging.to_string())
      .arg(promoted.to_string());
    self.runner.run_or_fail(&cmd).await?;
    // The final tag keeps the image alive, this only drops a reference
    let cmd = self.cmd().arg("rmi").arg(staging.to_string());
    match self.runner.run(&cmd).await {
      Ok(output) if output.success() => {}
      Ok(output) => {
        log::warn!("image::promote: untag {staging}: {}", output.combined())
      }
      Err(err) => log::warn!("image::promote: untag {staging}: {err}"),
    }
    log::info!("image::promote: {promoted} is now {staging}");
    Ok(promoted.clone())
  }

  /// Remove unreferenced layers, failures only get logged
  pub async fn prune_dangling(&self) {
    let cmd = self.cmd().args(["image", "prune", "--force"]);
    match self.runner.run(&cmd).await {
      Ok(output) if output.success() => {
        let reclaimed = output
          .stdout
          .lines()
          .find(|line| line.starts_with("Total reclaimed space"))
          .unwrap_or("nothing reclaimed")
          .to_owned();
        log::info!("image::prune: {reclaimed}");
      }
      Ok(output) => log::warn!("image::prune: {}", output.combined()),
      Err(err) => log::warn!("image::prune: {err}"),
    }
  }
}
