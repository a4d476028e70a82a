use futures::StreamExt;
use futures::stream::FuturesUnordered;

use ncdeploy_error::io::{FromIo, IoResult};

use crate::config::ProxyConfig;
use crate::error::{DeployError, DeployResult};
use crate::models::{ProcessCmd, VHostConfig, VHostMode, CHECK_TEMPLATE};

use super::process::ProcessRunner;

/// Directory under `AvailableDir` holding staged files and backups
const STAGING_DIR: &str = ".ncdeploy";

/// Paths involved in replacing the vhost of a domain
#[derive(Clone, Debug)]
pub struct ConfPaths {
  pub live: String,
  pub enabled: Option<String>,
  pub staged: String,
  pub backup: String,
  /// Where a regular file found at `enabled` is moved aside
  pub enabled_backup: String,
  /// Minimal main config including only the staged file
  pub check: String,
}

/// What `swap_in` replaced
#[derive(Clone, Copy, Debug, Default)]
struct Swapped {
  /// A live file existed and was backed up
  live: bool,
  /// A regular file stood at the enabled path and was moved aside
  enabled: bool,
}

/// Writes, validates and activates the vhost files of nginx
#[derive(Clone)]
pub struct Nginx<R> {
  config: ProxyConfig,
  runner: R,
}

impl<R: ProcessRunner> Nginx<R> {
  pub fn new(config: &ProxyConfig, runner: &R) -> Self {
    Self {
      config: config.clone(),
      runner: runner.clone(),
    }
  }

  fn staging_dir(&self) -> String {
    format!("{}/{STAGING_DIR}", self.config.available_dir)
  }

  pub fn gen_conf_path(&self, domain: &str) -> ConfPaths {
    let staging = self.staging_dir();
    ConfPaths {
      live: format!("{}/{domain}.conf", self.config.available_dir),
      enabled: self
        .config
        .enabled_dir
        .as_ref()
        .map(|dir| format!("{dir}/{domain}.conf")),
      staged: format!("{staging}/{domain}.conf"),
      backup: format!("{staging}/{domain}.conf.bak"),
      enabled_backup: format!("{staging}/{domain}.enabled.bak"),
      check: format!("{staging}/{domain}.check.conf"),
    }
  }

  async fn ensure_dir(&self, path: String) -> IoResult<()> {
    tokio::fs::create_dir_all(&path).await.map_err(|err| {
      err.map_err_context(|| format!("Unable to create {path} directory"))
    })?;
    Ok(())
  }

  /// ## Ensure
  ///
  /// Create the available, enabled and staging directories
  ///
  pub async fn ensure(&self) -> IoResult<()> {
    let mut dirs = vec![self.config.available_dir.clone(), self.staging_dir()];
    if let Some(enabled_dir) = &self.config.enabled_dir {
      dirs.push(enabled_dir.clone());
    }
    dirs
      .into_iter()
      .map(|dir| self.ensure_dir(dir))
      .collect::<FuturesUnordered<_>>()
      .collect::<Vec<IoResult<()>>>()
      .await
      .into_iter()
      .collect::<IoResult<()>>()?;
    Ok(())
  }

  /// Content of the live vhost, `None` when there is none
  pub async fn read_live(&self, domain: &str) -> IoResult<Option<String>> {
    let path = self.gen_conf_path(domain).live;
    match tokio::fs::read_to_string(&path).await {
      Ok(content) => Ok(Some(content)),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(err) => {
        Err(err.map_err_context(|| format!("Unable to read {path}")).into())
      }
    }
  }

  /// Mode of the live vhost as written by us
  pub async fn current_mode(
    &self,
    domain: &str,
  ) -> IoResult<Option<VHostMode>> {
    let content = self.read_live(domain).await?;
    Ok(content.as_deref().and_then(VHostMode::detect))
  }

  /// The live vhost is exactly what `vhost` renders to
  pub async fn is_applied(&self, vhost: &VHostConfig) -> IoResult<bool> {
    let expected = vhost.render()?;
    let content = self.read_live(&vhost.domain).await?;
    Ok(content.as_deref() == Some(expected.as_str()))
  }

  fn cmd(&self, parts: &[String]) -> DeployResult<ProcessCmd> {
    ProcessCmd::from_parts(parts)
      .ok_or_else(|| DeployError::invalid_config("empty proxy command"))
  }

  /// Run the syntax checker, on `main_conf` only when given
  pub async fn validate(
    &self,
    path: &str,
    main_conf: Option<&str>,
  ) -> DeployResult<()> {
    let mut cmd = self.cmd(&self.config.validate_cmd)?;
    if let Some(main_conf) = main_conf {
      cmd = cmd.arg("-c").arg(main_conf);
    }
    let output = self.runner.run(&cmd).await?;
    if !output.success() {
      log::error!("nginx::validate: {path} rejected");
      return Err(DeployError::ConfigValidationFailed {
        path: path.to_owned(),
        output: output.combined(),
      });
    }
    log::debug!("nginx::validate: {path} ok");
    Ok(())
  }

  pub async fn is_running(&self) -> DeployResult<bool> {
    let cmd = self.cmd(&self.config.status_cmd)?;
    let output = self.runner.run(&cmd).await?;
    Ok(output.success())
  }

  /// Reload nginx, or start it when it is not running
  pub async fn reload(&self) -> DeployResult<()> {
    let cmd = if self.is_running().await? {
      self.cmd(&self.config.reload_cmd)?
    } else {
      log::info!("nginx::reload: not running, starting it");
      self.cmd(&self.config.start_cmd)?
    };
    self.runner.run_or_fail(&cmd).await?;
    log::info!("nginx::reload: done");
    Ok(())
  }

  async fn write_staged(
    &self,
    paths: &ConfPaths,
    content: &str,
  ) -> IoResult<()> {
    tokio::fs::write(&paths.staged, content)
      .await
      .map_err(|err| {
        err.map_err_context(|| format!("Unable to write {}", paths.staged))
      })?;
    let staging = self.staging_dir();
    let check = CHECK_TEMPLATE.compile(&liquid::object!({
      "pid_path": format!("{staging}/check.pid"),
      "error_log": format!("{staging}/check.log"),
      "vhost_path": paths.staged,
    }))?;
    tokio::fs::write(&paths.check, check).await.map_err(|err| {
      err.map_err_context(|| format!("Unable to write {}", paths.check))
    })?;
    Ok(())
  }

  /// Swap the staged file in, keeping a backup of what it replaces
  async fn swap_in(&self, paths: &ConfPaths) -> IoResult<Swapped> {
    let existed = tokio::fs::try_exists(&paths.live).await.map_err(|err| {
      err.map_err_context(|| format!("Unable to stat {}", paths.live))
    })?;
    if existed {
      tokio::fs::copy(&paths.live, &paths.backup)
        .await
        .map_err(|err| {
          err.map_err_context(|| format!("Unable to back up {}", paths.live))
        })?;
    }
    tokio::fs::rename(&paths.staged, &paths.live)
      .await
      .map_err(|err| {
        err.map_err_context(|| format!("Unable to replace {}", paths.live))
      })?;
    let enabled = self.link(paths).await?;
    Ok(Swapped {
      live: existed,
      enabled,
    })
  }

  /// Point the enabled entry at the live file.
  ///
  /// Returns whether a regular file had to be moved aside.
  async fn link(&self, paths: &ConfPaths) -> IoResult<bool> {
    let Some(enabled) = &paths.enabled else {
      return Ok(false);
    };
    let mut moved = false;
    match tokio::fs::symlink_metadata(enabled).await {
      Ok(meta) if meta.file_type().is_symlink() => {
        let target = tokio::fs::read_link(enabled).await.ok();
        if target.as_deref() == Some(std::path::Path::new(&paths.live)) {
          return Ok(false);
        }
        tokio::fs::remove_file(enabled).await?;
      }
      Ok(_) => {
        log::warn!(
          "nginx::link: moving regular file {enabled} to {}",
          paths.enabled_backup
        );
        tokio::fs::rename(enabled, &paths.enabled_backup)
          .await
          .map_err(|err| {
            err.map_err_context(|| format!("Unable to move {enabled} aside"))
          })?;
        moved = true;
      }
      Err(_) => {}
    }
    tokio::fs::symlink(&paths.live, enabled)
      .await
      .map_err(|err| {
        err.map_err_context(|| format!("Unable to create {enabled} symlink"))
      })?;
    Ok(moved)
  }

  /// Put back what was live before `swap_in`
  async fn restore(&self, paths: &ConfPaths, swapped: Swapped) -> IoResult<()> {
    if let Some(enabled) = &paths.enabled {
      if swapped.enabled {
        tokio::fs::rename(&paths.enabled_backup, enabled)
          .await
          .map_err(|err| {
            err.map_err_context(|| format!("Unable to restore {enabled}"))
          })?;
        log::warn!("nginx::restore: {enabled} restored");
      } else if !swapped.live {
        let _ = tokio::fs::remove_file(enabled).await;
      }
    }
    if swapped.live {
      tokio::fs::rename(&paths.backup, &paths.live)
        .await
        .map_err(|err| {
          err.map_err_context(|| format!("Unable to restore {}", paths.live))
        })?;
      log::warn!("nginx::restore: {} restored", paths.live);
      return Ok(());
    }
    tokio::fs::remove_file(&paths.live).await.map_err(|err| {
      err.map_err_context(|| format!("Unable to remove {}", paths.live))
    })?;
    log::warn!("nginx::restore: {} removed", paths.live);
    Ok(())
  }

  /// ## Apply
  ///
  /// Replace the vhost of a domain and reload nginx.
  /// The new content is validated on its own before it is moved in place,
  /// then the whole configuration is validated again.
  /// When a validation fails the previous file is back in place
  /// and nginx is not reloaded.
  ///
  /// ## Arguments
  ///
  /// * [vhost](VHostConfig) - The vhost to activate
  ///
  /// ## Return
  ///
  /// The path of the live file
  ///
  pub async fn apply(&self, vhost: &VHostConfig) -> DeployResult<String> {
    let paths = self.gen_conf_path(&vhost.domain);
    let content = vhost.render()?;
    log::debug!("nginx::apply: staging {}:\n{content}", paths.staged);
    self.write_staged(&paths, &content).await?;
    if let Err(err) = self.validate(&paths.staged, Some(&paths.check)).await {
      let _ = tokio::fs::remove_file(&paths.staged).await;
      return Err(err);
    }
    let swapped = self.swap_in(&paths).await?;
    if let Err(err) = self.validate(&paths.live, None).await {
      self.restore(&paths, swapped).await?;
      return Err(err);
    }
    self.reload().await?;
    log::info!("nginx::apply: {} is {}", vhost.domain, vhost.mode);
    Ok(paths.live)
  }
}
