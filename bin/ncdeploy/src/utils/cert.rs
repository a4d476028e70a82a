use ncdeploy_error::io::{FromIo, IoResult};

use crate::config::AcmeConfig;
use crate::error::{DeployError, DeployResult};
use crate::models::{CertPaths, Certificate, ProcessCmd, VHostConfig};

use super::nginx::Nginx;
use super::process::ProcessRunner;

/// Lines of ACME client output kept in a failed issuance
const ACME_OUTPUT_TAIL: usize = 30;

/// Drives the HTTP_ONLY then HTTPS switch of a domain
#[derive(Clone)]
pub struct CertManager<R> {
  acme: AcmeConfig,
  nginx: Nginx<R>,
  runner: R,
}

impl<R: ProcessRunner> CertManager<R> {
  pub fn new(acme: &AcmeConfig, nginx: &Nginx<R>, runner: &R) -> Self {
    Self {
      acme: acme.clone(),
      nginx: nginx.clone(),
      runner: runner.clone(),
    }
  }

  pub fn nginx(&self) -> &Nginx<R> {
    &self.nginx
  }

  pub fn cert_paths(&self, domain: &str) -> CertPaths {
    CertPaths::new(&self.acme.cert_dir, domain)
  }

  /// Both the chain and the key of `domain` are on disk
  pub async fn has_certificate(&self, domain: &str) -> bool {
    let paths = self.cert_paths(domain);
    for path in [&paths.fullchain, &paths.privkey] {
      if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return false;
      }
    }
    true
  }

  /// Read the installed certificate of `domain`, `None` when there is none
  pub async fn inspect(&self, domain: &str) -> IoResult<Option<Certificate>> {
    let path = self.cert_paths(domain).fullchain;
    let pem = match tokio::fs::read(&path).await {
      Ok(pem) => pem,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        return Ok(None)
      }
      Err(err) => {
        let err = err.map_err_context(|| format!("Unable to read {path}"));
        return Err(err.into());
      }
    };
    Ok(Some(Certificate::from_pem(domain, &pem)?))
  }

  /// Serve the domain over plain http, required by the challenge
  pub async fn bootstrap_http_only(
    &self,
    domain: &str,
    upstream: &str,
  ) -> DeployResult<String> {
    log::info!("cert::bootstrap: {domain} http only");
    self
      .nginx
      .apply(&VHostConfig::http_only(domain, upstream))
      .await
  }

  /// Ask the certificate authority for a certificate of `domain`
  pub async fn request_certificate(
    &self,
    domain: &str,
    email: &str,
  ) -> DeployResult<Certificate> {
    let mut cmd = ProcessCmd::from_parts(&self.acme.command)
      .ok_or_else(|| DeployError::invalid_config("Acme.Command is empty"))?
      .args(["--nginx", "--non-interactive", "--agree-tos", "--email"])
      .arg(email)
      .arg("-d")
      .arg(domain)
      .arg("--keep-until-expiring");
    if self.acme.staging {
      cmd = cmd.arg("--staging");
    }
    log::info!("cert::request: {domain} for {email}");
    let output = self.runner.run(&cmd).await?;
    if !output.success() {
      return Err(DeployError::CertificateIssuanceFailed {
        domain: domain.to_owned(),
        output: output.tail(ACME_OUTPUT_TAIL),
      });
    }
    match self.inspect(domain).await? {
      Some(cert) => {
        log::info!("cert::request: {cert}");
        Ok(cert)
      }
      None => Err(DeployError::CertificateIssuanceFailed {
        domain: domain.to_owned(),
        output: format!(
          "{}\n{} is missing",
          output.tail(ACME_OUTPUT_TAIL),
          self.cert_paths(domain).fullchain
        ),
      }),
    }
  }

  /// Write our own https vhost over whatever the ACME client left behind
  pub async fn finalize_https(
    &self,
    domain: &str,
    upstream: &str,
    certs: &CertPaths,
  ) -> DeployResult<String> {
    log::info!("cert::finalize: {domain} https");
    self
      .nginx
      .apply(&VHostConfig::https(domain, upstream, certs))
      .await
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  use crate::models::{ProcessOutput, VHostMode};
  use crate::models::gen_test_cert;
  use crate::utils::nginx::tests::proxy_config;
  use crate::utils::tests::{MockRunner, temp_dir};

  pub(crate) fn acme_config(dir: &str) -> AcmeConfig {
    AcmeConfig {
      email: "ops@example.com".to_owned(),
      command: vec!["certbot".to_owned()],
      cert_dir: format!("{dir}/live"),
      staging: false,
    }
  }

  /// Make the mocked ACME client drop a certificate like certbot does
  pub(crate) fn issue_on_request(runner: &MockRunner, cert_dir: &str) {
    let dir = format!("{cert_dir}/api.example.com");
    runner.hook("certbot", move |_| {
      std::fs::create_dir_all(&dir).unwrap();
      let pem = gen_test_cert("Let's Encrypt", 90);
      std::fs::write(format!("{dir}/fullchain.pem"), pem).unwrap();
      std::fs::write(format!("{dir}/privkey.pem"), "key").unwrap();
    });
  }

  fn setup(name: &str) -> (MockRunner, CertManager<MockRunner>, AcmeConfig) {
    let dir = temp_dir(name);
    let runner = MockRunner::new();
    let acme = acme_config(&dir);
    let nginx = Nginx::new(&proxy_config(&dir), &runner);
    (runner.clone(), CertManager::new(&acme, &nginx, &runner), acme)
  }

  #[ntex::test]
  async fn request_success() {
    let (runner, certs, acme) = setup("cert-request");
    issue_on_request(&runner, &acme.cert_dir);
    assert!(!certs.has_certificate("api.example.com").await);
    let cert = certs
      .request_certificate("api.example.com", "ops@example.com")
      .await
      .unwrap();
    assert_eq!(cert.issuer, "Let's Encrypt");
    assert!(certs.has_certificate("api.example.com").await);
    assert_eq!(
      runner.calls(),
      vec![
        "certbot --nginx --non-interactive --agree-tos --email ops@example.com \
         -d api.example.com --keep-until-expiring"
      ]
    );
  }

  #[ntex::test]
  async fn request_failure() {
    let (runner, certs, _) = setup("cert-failure");
    runner.on(
      "certbot",
      ProcessOutput::failed(1, "too many certificates already issued"),
    );
    match certs
      .request_certificate("api.example.com", "ops@example.com")
      .await
    {
      Err(DeployError::CertificateIssuanceFailed { domain, output }) => {
        assert_eq!(domain, "api.example.com");
        assert!(output.contains("too many certificates"));
      }
      other => panic!("expected CertificateIssuanceFailed got {other:?}"),
    }
  }

  #[ntex::test]
  async fn request_without_files() {
    let (_, certs, _) = setup("cert-missing");
    let err = certs
      .request_certificate("api.example.com", "ops@example.com")
      .await
      .unwrap_err();
    assert!(matches!(err, DeployError::CertificateIssuanceFailed { .. }));
  }

  #[ntex::test]
  async fn staging_flag() {
    let dir = temp_dir("cert-staging");
    let runner = MockRunner::new();
    let mut acme = acme_config(&dir);
    acme.staging = true;
    let nginx = Nginx::new(&proxy_config(&dir), &runner);
    let certs = CertManager::new(&acme, &nginx, &runner);
    let _ = certs
      .request_certificate("api.example.com", "ops@example.com")
      .await;
    assert!(runner.calls()[0].ends_with("--keep-until-expiring --staging"));
  }

  #[ntex::test]
  async fn http_only_then_https() {
    let (runner, certs, acme) = setup("cert-modes");
    issue_on_request(&runner, &acme.cert_dir);
    certs.nginx().ensure().await.unwrap();
    let upstream = "http://127.0.0.1:8000";
    certs
      .bootstrap_http_only("api.example.com", upstream)
      .await
      .unwrap();
    let nginx = certs.nginx();
    assert_eq!(
      nginx.current_mode("api.example.com").await.unwrap(),
      Some(VHostMode::HttpOnly)
    );
    let paths = certs.cert_paths("api.example.com");
    certs
      .finalize_https("api.example.com", upstream, &paths)
      .await
      .unwrap();
    assert_eq!(
      nginx.current_mode("api.example.com").await.unwrap(),
      Some(VHostMode::Https)
    );
  }

  #[ntex::test]
  async fn inspect_absent() {
    let (_, certs, _) = setup("cert-absent");
    assert!(certs.inspect("api.example.com").await.unwrap().is_none());
  }
}
