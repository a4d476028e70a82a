use std::time::Duration;
use std::collections::HashMap;

use regex::Regex;
use serde::{Serialize, Deserialize};

use ncdeploy_error::io::{FromIo, IoError, IoResult};

use crate::error::{DeployError, DeployResult};
use crate::models::{RolloutStrategy, ServiceSpec};

fn default_engine() -> String {
  "docker".to_owned()
}

fn default_staging_tag() -> String {
  "new".to_owned()
}

fn default_final_tag() -> String {
  "latest".to_owned()
}

fn default_true() -> bool {
  true
}

fn default_verify_timeout() -> u64 {
  30
}

fn default_poll_interval() -> u64 {
  1000
}

fn default_log_tail() -> usize {
  50
}

fn default_budget() -> u64 {
  900
}

fn default_available_dir() -> String {
  "/etc/nginx/sites-available".to_owned()
}

fn default_enabled_dir() -> Option<String> {
  Some("/etc/nginx/sites-enabled".to_owned())
}

fn cmd(parts: &[&str]) -> Vec<String> {
  parts.iter().map(|part| part.to_string()).collect()
}

fn default_validate_cmd() -> Vec<String> {
  cmd(&["nginx", "-t"])
}

fn default_reload_cmd() -> Vec<String> {
  cmd(&["systemctl", "reload", "nginx"])
}

fn default_start_cmd() -> Vec<String> {
  cmd(&["systemctl", "start", "nginx"])
}

fn default_status_cmd() -> Vec<String> {
  cmd(&["systemctl", "is-active", "--quiet", "nginx"])
}

fn default_acme_cmd() -> Vec<String> {
  cmd(&["certbot"])
}

fn default_cert_dir() -> String {
  "/etc/letsencrypt/live".to_owned()
}

/// Image build settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildConfig {
  /// Build context directory
  pub context: String,
  pub dockerfile: Option<String>,
  #[serde(default = "default_staging_tag")]
  pub staging_tag: String,
  #[serde(default = "default_final_tag")]
  pub final_tag: String,
  /// Remove dangling images once the rollout succeeded
  #[serde(default = "default_true")]
  pub prune: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RolloutConfig {
  #[serde(default)]
  pub strategy: RolloutStrategy,
  /// Seconds a new container has to reach running
  #[serde(default = "default_verify_timeout")]
  pub verify_timeout: u64,
  /// Milliseconds between two state checks
  #[serde(default = "default_poll_interval")]
  pub poll_interval: u64,
  /// Lines of container output attached to a failed deployment
  #[serde(default = "default_log_tail")]
  pub log_tail: usize,
  /// Seconds the whole workflow may take
  #[serde(default = "default_budget")]
  pub budget: u64,
}

impl Default for RolloutConfig {
  fn default() -> Self {
    Self {
      strategy: RolloutStrategy::default(),
      verify_timeout: default_verify_timeout(),
      poll_interval: default_poll_interval(),
      log_tail: default_log_tail(),
      budget: default_budget(),
    }
  }
}

impl RolloutConfig {
  pub fn verify_timeout(&self) -> Duration {
    Duration::from_secs(self.verify_timeout)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval)
  }

  pub fn budget(&self) -> Duration {
    Duration::from_secs(self.budget)
  }
}

/// Reverse proxy settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyConfig {
  pub domain: String,
  /// Defaults to the service host port on the loopback interface
  pub upstream: Option<String>,
  #[serde(default = "default_available_dir")]
  pub available_dir: String,
  /// Set to null when the proxy reads `AvailableDir` directly
  #[serde(default = "default_enabled_dir")]
  pub enabled_dir: Option<String>,
  #[serde(default = "default_validate_cmd")]
  pub validate_cmd: Vec<String>,
  #[serde(default = "default_reload_cmd")]
  pub reload_cmd: Vec<String>,
  #[serde(default = "default_start_cmd")]
  pub start_cmd: Vec<String>,
  #[serde(default = "default_status_cmd")]
  pub status_cmd: Vec<String>,
}

/// ACME client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AcmeConfig {
  /// Contact email registered with the certificate authority
  pub email: String,
  #[serde(default = "default_acme_cmd")]
  pub command: Vec<String>,
  #[serde(default = "default_cert_dir")]
  pub cert_dir: String,
  /// Use the staging environment of the certificate authority
  #[serde(default)]
  pub staging: bool,
}

/// ## DeployConfig
///
/// Everything a workflow needs, read from the deployment file.
/// It is built once and handed to the orchestrator.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployConfig {
  /// Container engine cli
  #[serde(default = "default_engine")]
  pub engine: String,
  pub service: ServiceSpec,
  pub build: BuildConfig,
  #[serde(default)]
  pub rollout: RolloutConfig,
  pub proxy: Option<ProxyConfig>,
  pub acme: Option<AcmeConfig>,
}

/// Render the `${{ Envs.NAME }}` placeholders of a single string
pub fn compile(data: &str, envs: &HashMap<String, String>) -> IoResult<String> {
  // replace "${{ }}" with "{{ }}" syntax for liquid
  let reg = Regex::new(r"\$\{\{(.+?)\}\}")
    .map_err(|err| IoError::invalid_data("Regex", err))?;
  let template = reg.replace_all(data, "{{ $1 }}").to_string();
  let template = liquid::ParserBuilder::with_stdlib()
    .build()
    .map_err(|err| IoError::invalid_data("Template parsing", err))?
    .parse(&template)
    .map_err(|err| IoError::invalid_data("Template parsing", err))?;
  let output = template
    .render(&liquid::object!({ "Envs": envs }))
    .map_err(|err| IoError::invalid_data("Template rendering", err))?;
  Ok(output)
}

/// Render the placeholders of every string scalar in place.
///
/// The YAML is parsed first so rendered values are never read through
/// YAML quoting or escaping, they land in the scalar byte for byte.
fn render_scalars(
  value: &mut serde_yaml::Value,
  envs: &HashMap<String, String>,
) -> IoResult<()> {
  match value {
    serde_yaml::Value::String(data) if data.contains("${{") => {
      *data = compile(data, envs)?;
    }
    serde_yaml::Value::Sequence(items) => {
      for item in items {
        render_scalars(item, envs)?;
      }
    }
    serde_yaml::Value::Mapping(mapping) => {
      for (_, item) in mapping.iter_mut() {
        render_scalars(item, envs)?;
      }
    }
    serde_yaml::Value::Tagged(tagged) => {
      render_scalars(&mut tagged.value, envs)?;
    }
    _ => {}
  }
  Ok(())
}

impl DeployConfig {
  /// Parse and validate a deployment file
  pub fn parse(
    data: &str,
    envs: &HashMap<String, String>,
  ) -> DeployResult<Self> {
    let mut value = serde_yaml::from_str::<serde_yaml::Value>(data)
      .map_err(|err| err.map_err_context(|| "Unable to parse deployment file"))
      .map_err(IoError::from)?;
    render_scalars(&mut value, envs)?;
    let config = serde_yaml::from_value::<DeployConfig>(value)
      .map_err(|err| err.map_err_context(|| "Invalid deployment file"))
      .map_err(IoError::from)?;
    config.validate()?;
    Ok(config)
  }

  /// Read, render against the process environment and validate
  pub fn from_file(path: &str) -> DeployResult<Self> {
    let data = std::fs::read_to_string(path)
      .map_err(|err| err.map_err_context(|| format!("Unable to read {path}")))
      .map_err(IoError::from)?;
    let envs = std::env::vars().collect::<HashMap<String, String>>();
    Self::parse(&data, &envs)
  }

  pub fn proxy(&self) -> DeployResult<&ProxyConfig> {
    self.proxy.as_ref().ok_or_else(|| {
      DeployError::invalid_config("a Proxy section is required for tls")
    })
  }

  pub fn acme(&self) -> DeployResult<&AcmeConfig> {
    self.acme.as_ref().ok_or_else(|| {
      DeployError::invalid_config("an Acme section is required for tls")
    })
  }

  /// Upstream the vhost proxies to
  pub fn upstream(&self) -> String {
    self
      .proxy
      .as_ref()
      .and_then(|proxy| proxy.upstream.clone())
      .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.service.host_port))
  }

  pub fn validate(&self) -> DeployResult<()> {
    let service = &self.service;
    let non_empty = [
      ("Engine", &self.engine),
      ("Service.Name", &service.name),
      ("Service.Image", &service.image),
      ("Service.Volume", &service.volume),
      ("Service.MountPath", &service.mount_path),
      ("Build.Context", &self.build.context),
      ("Build.StagingTag", &self.build.staging_tag),
      ("Build.FinalTag", &self.build.final_tag),
    ];
    for (key, value) in non_empty {
      if value.trim().is_empty() {
        return Err(DeployError::invalid_config(format!("{key} is empty")));
      }
    }
    if self.build.staging_tag == self.build.final_tag {
      return Err(DeployError::invalid_config(
        "Build.StagingTag and Build.FinalTag must differ",
      ));
    }
    if service.host_port == 0 || service.container_port == 0 {
      return Err(DeployError::invalid_config("ports must be non zero"));
    }
    match (self.rollout.strategy, service.alternate_port) {
      (RolloutStrategy::BlueGreen, None) => {
        return Err(DeployError::invalid_config(
          "blue-green rollout needs Service.AlternatePort",
        ));
      }
      (_, Some(port)) if port == 0 || port == service.host_port => {
        return Err(DeployError::invalid_config(
          "Service.AlternatePort must be non zero and differ from HostPort",
        ));
      }
      _ => {}
    }
    for secret in &service.secrets {
      match service.env.get(secret) {
        Some(value) if !value.trim().is_empty() => {}
        _ => {
          return Err(DeployError::invalid_config(format!(
            "secret {secret} must be set in Service.Env"
          )));
        }
      }
    }
    if let Some(proxy) = &self.proxy {
      if proxy.domain.trim().is_empty() {
        return Err(DeployError::invalid_config("Proxy.Domain is empty"));
      }
      let cmds = [
        ("Proxy.ValidateCmd", &proxy.validate_cmd),
        ("Proxy.ReloadCmd", &proxy.reload_cmd),
        ("Proxy.StartCmd", &proxy.start_cmd),
        ("Proxy.StatusCmd", &proxy.status_cmd),
      ];
      for (key, cmd) in cmds {
        if cmd.is_empty() {
          return Err(DeployError::invalid_config(format!("{key} is empty")));
        }
      }
    }
    if let Some(acme) = &self.acme {
      if !acme.email.contains('@') {
        return Err(DeployError::invalid_config(
          "Acme.Email must be an email address",
        ));
      }
      if acme.command.is_empty() {
        return Err(DeployError::invalid_config("Acme.Command is empty"));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) const DEPLOY_FILE: &str = r#"
Service:
  Name: construction-api
  Image: construction-api
  HostPort: 8000
  ContainerPort: 8000
  AlternatePort: 8001
  Volume: construction-uploads
  MountPath: /app/uploads
  Env:
    MONGO_CONNECTION_STRING: "${{ Envs.MONGO_CONNECTION_STRING }}"
    JWT_SECRET_KEY: "${{ Envs.JWT_SECRET_KEY }}"
    DATABASE_NAME: construction_management
  Secrets:
    - MONGO_CONNECTION_STRING
    - JWT_SECRET_KEY
Build:
  Context: .
Proxy:
  Domain: api.example.com
Acme:
  Email: ops@example.com
"#;

  pub(crate) fn test_envs() -> HashMap<String, String> {
    HashMap::from([
      (
        "MONGO_CONNECTION_STRING".to_owned(),
        "mongodb://db.internal:27017".to_owned(),
      ),
      ("JWT_SECRET_KEY".to_owned(), "not-a-default".to_owned()),
    ])
  }

  #[test]
  fn parse_with_defaults() {
    let config = DeployConfig::parse(DEPLOY_FILE, &test_envs()).unwrap();
    assert_eq!(config.engine, "docker");
    assert_eq!(config.build.staging_tag, "new");
    assert_eq!(config.build.final_tag, "latest");
    assert!(config.build.prune);
    assert_eq!(config.rollout.strategy, RolloutStrategy::BlueGreen);
    assert_eq!(config.rollout.verify_timeout(), Duration::from_secs(30));
    assert_eq!(config.rollout.log_tail, 50);
    assert_eq!(
      config.service.env.get("MONGO_CONNECTION_STRING").unwrap(),
      "mongodb://db.internal:27017"
    );
    let proxy = config.proxy().unwrap();
    assert_eq!(proxy.validate_cmd, vec!["nginx", "-t"]);
    assert_eq!(
      proxy.enabled_dir.as_deref(),
      Some("/etc/nginx/sites-enabled")
    );
    assert_eq!(config.upstream(), "http://127.0.0.1:8000");
    assert_eq!(config.acme().unwrap().cert_dir, "/etc/letsencrypt/live");
  }

  #[test]
  fn missing_env_is_an_error() {
    let mut envs = test_envs();
    envs.remove("JWT_SECRET_KEY");
    assert!(DeployConfig::parse(DEPLOY_FILE, &envs).is_err());
  }

  #[test]
  fn secrets_are_kept_verbatim() {
    let secret = r#"a\tb"c: #d'e\"#;
    let mut envs = test_envs();
    envs.insert("JWT_SECRET_KEY".to_owned(), secret.to_owned());
    let config = DeployConfig::parse(DEPLOY_FILE, &envs).unwrap();
    assert_eq!(config.service.env.get("JWT_SECRET_KEY").unwrap(), secret);
    // Unquoted placeholders render the same way
    let data = DEPLOY_FILE.replace(
      "\"${{ Envs.JWT_SECRET_KEY }}\"",
      "${{ Envs.JWT_SECRET_KEY }}",
    );
    assert_ne!(data, DEPLOY_FILE);
    let config = DeployConfig::parse(&data, &envs).unwrap();
    assert_eq!(config.service.env.get("JWT_SECRET_KEY").unwrap(), secret);
  }

  #[test]
  fn placeholder_inside_a_value() {
    let data = DEPLOY_FILE.replace(
      "DATABASE_NAME: construction_management",
      "DATABASE_NAME: \"db-${{ Envs.JWT_SECRET_KEY }}-x\"",
    );
    let config = DeployConfig::parse(&data, &test_envs()).unwrap();
    assert_eq!(
      config.service.env.get("DATABASE_NAME").unwrap(),
      "db-not-a-default-x"
    );
  }

  #[test]
  fn empty_secret_is_rejected() {
    let mut envs = test_envs();
    envs.insert("JWT_SECRET_KEY".to_owned(), " ".to_owned());
    let err = DeployConfig::parse(DEPLOY_FILE, &envs).unwrap_err();
    assert!(matches!(err, DeployError::InvalidConfig { .. }));
    assert!(err.to_string().contains("JWT_SECRET_KEY"));
  }

  #[test]
  fn blue_green_needs_alternate_port() {
    let mut config = DeployConfig::parse(DEPLOY_FILE, &test_envs()).unwrap();
    config.service.alternate_port = None;
    assert!(config.validate().is_err());
    config.rollout.strategy = RolloutStrategy::Recreate;
    assert!(config.validate().is_ok());
    config.service.alternate_port = Some(8000);
    assert!(config.validate().is_err());
  }

  #[test]
  fn invalid_email() {
    let mut config = DeployConfig::parse(DEPLOY_FILE, &test_envs()).unwrap();
    config.acme.as_mut().unwrap().email = "ops".to_owned();
    assert!(config.validate().is_err());
  }

  #[test]
  fn sections_required_for_tls() {
    let mut config = DeployConfig::parse(DEPLOY_FILE, &test_envs()).unwrap();
    config.proxy = None;
    config.acme = None;
    assert!(config.proxy().is_err());
    assert!(config.acme().is_err());
    assert_eq!(config.upstream(), "http://127.0.0.1:8000");
  }
}
