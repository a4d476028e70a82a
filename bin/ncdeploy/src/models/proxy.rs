use std::str::FromStr;

use ncdeploy_error::io::{IoError, IoResult};

use super::{CertPaths, HTTP_ONLY_TEMPLATE, HTTPS_TEMPLATE};

/// Prefix of the first line of every vhost file written by ncdeploy
pub const VHOST_MARKER: &str = "# managed by ncdeploy mode=";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VHostMode {
  HttpOnly,
  Https,
}

impl std::fmt::Display for VHostMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::HttpOnly => write!(f, "http-only"),
      Self::Https => write!(f, "https"),
    }
  }
}

impl FromStr for VHostMode {
  type Err = IoError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "http-only" => Ok(Self::HttpOnly),
      "https" => Ok(Self::Https),
      _ => Err(IoError::invalid_data(
        format!("Invalid VHostMode: {s}"),
        "expected | http-only | https".to_owned(),
      )),
    }
  }
}

impl VHostMode {
  /// Read the mode from the marker line of a vhost file.
  ///
  /// Files without the marker were not written by us, or were rewritten
  /// by somebody else, and yield `None`.
  pub fn detect(content: &str) -> Option<Self> {
    content
      .lines()
      .next()
      .and_then(|line| line.trim().strip_prefix(VHOST_MARKER))
      .and_then(|mode| mode.trim().parse().ok())
  }
}

/// Routing rules of the proxy for one domain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VHostConfig {
  pub domain: String,
  pub mode: VHostMode,
  /// Where requests are proxied to eg: `http://127.0.0.1:8000`
  pub upstream: String,
  pub certs: Option<CertPaths>,
}

impl VHostConfig {
  pub fn http_only(domain: &str, upstream: &str) -> Self {
    Self {
      domain: domain.to_owned(),
      mode: VHostMode::HttpOnly,
      upstream: upstream.to_owned(),
      certs: None,
    }
  }

  pub fn https(domain: &str, upstream: &str, certs: &CertPaths) -> Self {
    Self {
      domain: domain.to_owned(),
      mode: VHostMode::Https,
      upstream: upstream.to_owned(),
      certs: Some(certs.clone()),
    }
  }

  pub fn render(&self) -> IoResult<String> {
    let mode = self.mode.to_string();
    match (self.mode, &self.certs) {
      (VHostMode::HttpOnly, _) => {
        HTTP_ONLY_TEMPLATE.compile(&liquid::object!({
          "marker": VHOST_MARKER,
          "mode": mode,
          "domain": self.domain,
          "upstream": self.upstream,
        }))
      }
      (VHostMode::Https, Some(certs)) => {
        HTTPS_TEMPLATE.compile(&liquid::object!({
          "marker": VHOST_MARKER,
          "mode": mode,
          "domain": self.domain,
          "upstream": self.upstream,
          "fullchain": certs.fullchain,
          "privkey": certs.privkey,
        }))
      }
      (VHostMode::Https, None) => Err(IoError::invalid_input(
        "Vhost",
        format!("https vhost for {} needs certificate paths", self.domain),
      )),
    }
  }
}
