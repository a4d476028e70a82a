use crate::error::{DeployError, DeployResult};
use crate::models::{TlsReport, VHostConfig, VHostMode};
use crate::utils::cert::CertManager;
use crate::utils::process::ProcessRunner;

use super::Orchestrator;

impl<R: ProcessRunner> Orchestrator<R> {
  pub(super) async fn run_bootstrap_tls(&self) -> DeployResult<TlsReport> {
    let certs = self.cert_manager()?;
    let domain = &self.config.proxy()?.domain;
    let email = &self.config.acme()?.email;
    let upstream = self.config.upstream();
    let nginx = certs.nginx();
    nginx.ensure().await?;
    let paths = certs.cert_paths(domain);
    let mode = nginx.current_mode(domain).await?;
    if mode == Some(VHostMode::Https) && certs.has_certificate(domain).await {
      log::info!("tls: {domain} is already https");
      certs.finalize_https(domain, &upstream, &paths).await?;
      let certificate = certs.inspect(domain).await?.ok_or_else(|| {
        DeployError::CertificateIssuanceFailed {
          domain: domain.clone(),
          output: format!("{} vanished", paths.fullchain),
        }
      })?;
      return Ok(TlsReport {
        domain: domain.clone(),
        certificate,
        reasserted: true,
      });
    }
    certs.bootstrap_http_only(domain, &upstream).await?;
    let certificate = match certs.request_certificate(domain, email).await {
      Ok(certificate) => certificate,
      Err(err) => {
        self.keep_http_only(&certs, domain, &upstream).await;
        return Err(err);
      }
    };
    certs.finalize_https(domain, &upstream, &paths).await?;
    log::info!("tls: {domain} is https, {certificate}");
    Ok(TlsReport {
      domain: domain.clone(),
      certificate,
      reasserted: false,
    })
  }

  /// Put our http only vhost back if the ACME client changed it
  async fn keep_http_only(
    &self,
    certs: &CertManager<R>,
    domain: &str,
    upstream: &str,
  ) {
    let nginx = certs.nginx();
    let vhost = VHostConfig::http_only(domain, upstream);
    match nginx.is_applied(&vhost).await {
      Ok(true) => {
        log::warn!("tls: {domain} stays reachable over http");
      }
      _ => {
        log::warn!("tls: {domain} vhost was modified, restoring http only");
        if let Err(err) = nginx.apply(&vhost).await {
          log::error!("tls: unable to restore http only vhost: {err}");
        }
      }
    }
  }
}
