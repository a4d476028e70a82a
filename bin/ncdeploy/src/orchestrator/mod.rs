use std::future::Future;

use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::models::{Certificate, RolloutReport, TlsReport};
use crate::utils::{
  cert::CertManager, container::ContainerManager, image::ImageManager,
  nginx::Nginx, process::ProcessRunner, volume::VolumeManager,
};

mod rollout;
mod bootstrap;

/// ## Orchestrator
///
/// Sequences the managers into the rollout and tls workflows.
/// It owns the configuration for the whole invocation,
/// every external command goes through the same runner.
///
#[derive(Clone)]
pub struct Orchestrator<R> {
  config: DeployConfig,
  runner: R,
  volumes: VolumeManager<R>,
  images: ImageManager<R>,
  containers: ContainerManager<R>,
}

impl<R: ProcessRunner> Orchestrator<R> {
  pub fn new(config: DeployConfig, runner: &R) -> Self {
    let engine = config.engine.clone();
    Self {
      config,
      runner: runner.clone(),
      volumes: VolumeManager::new(&engine, runner),
      images: ImageManager::new(&engine, runner),
      containers: ContainerManager::new(&engine, runner),
    }
  }

  pub fn config(&self) -> &DeployConfig {
    &self.config
  }

  fn cert_manager(&self) -> DeployResult<CertManager<R>> {
    let proxy = self.config.proxy()?;
    let acme = self.config.acme()?;
    let nginx = Nginx::new(proxy, &self.runner);
    Ok(CertManager::new(acme, &nginx, &self.runner))
  }

  /// Fail with [`DeployError::DeploymentTimedOut`] once the budget is spent
  async fn within_budget<T, F>(&self, fut: F) -> DeployResult<T>
  where
    F: Future<Output = DeployResult<T>>,
  {
    let budget = self.config.rollout.budget();
    match ntex::time::timeout(budget, fut).await {
      Ok(res) => res,
      Err(_) => {
        log::error!("orchestrator: budget of {}s exceeded", budget.as_secs());
        Err(DeployError::DeploymentTimedOut {
          budget: budget.as_secs(),
        })
      }
    }
  }

  /// Build, promote and replace the running service
  pub async fn rollout(&self) -> DeployResult<RolloutReport> {
    self.within_budget(self.run_rollout()).await
  }

  /// Serve the configured domain over https
  pub async fn bootstrap_tls(&self) -> DeployResult<TlsReport> {
    self.within_budget(self.run_bootstrap_tls()).await
  }

  /// First deployment, rollout then tls, under a single budget
  pub async fn bootstrap(
    &self,
    skip_rollout: bool,
  ) -> DeployResult<(Option<RolloutReport>, TlsReport)> {
    // Fail on a missing section before touching anything
    self.cert_manager()?;
    self
      .within_budget(async {
        let report = match skip_rollout {
          true => None,
          false => Some(self.run_rollout().await?),
        };
        let tls = self.run_bootstrap_tls().await?;
        Ok((report, tls))
      })
      .await
  }

  /// Installed certificate of the configured domain
  pub async fn certificate(&self) -> DeployResult<Option<Certificate>> {
    let certs = self.cert_manager()?;
    let domain = &self.config.proxy()?.domain;
    Ok(certs.inspect(domain).await?)
  }

  /// Urls the service answers on
  pub fn urls(&self, https: bool) -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(proxy) = &self.config.proxy {
      match https {
        true => urls.push(format!("https://{}", proxy.domain)),
        false => urls.push(format!("http://{}", proxy.domain)),
      }
    }
    urls.push(format!("http://127.0.0.1:{}", self.config.service.host_port));
    urls
  }
}
