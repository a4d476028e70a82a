use thiserror::Error;

use ncdeploy_error::io::IoError;

pub type DeployResult<T, E = DeployError> = Result<T, E>;

/// Everything that can stop a workflow.
///
/// Best-effort steps never produce one of these, they only log.
#[derive(Debug, Error)]
pub enum DeployError {
  #[error(transparent)]
  Io(#[from] IoError),
  #[error("`{command}` exited with code {exit_code}")]
  ExecutionFailed {
    command: String,
    exit_code: i32,
    stderr: String,
  },
  #[error("Unable to build image {image}")]
  BuildFailed { image: String, output: String },
  #[error("Volume {volume} is unavailable")]
  VolumeUnavailable { volume: String, output: String },
  #[error("Container {container} is not running: {reason}")]
  DeploymentFailed {
    container: String,
    reason: String,
    logs: String,
  },
  #[error("Proxy rejected the configuration {path}")]
  ConfigValidationFailed { path: String, output: String },
  #[error("Unable to obtain a certificate for {domain}")]
  CertificateIssuanceFailed { domain: String, output: String },
  #[error("Workflow exceeded its budget of {budget}s")]
  DeploymentTimedOut { budget: u64 },
  #[error("Invalid configuration: {msg}")]
  InvalidConfig { msg: String },
}

impl DeployError {
  pub fn invalid_config<T>(msg: T) -> Self
  where
    T: ToString,
  {
    Self::InvalidConfig {
      msg: msg.to_string(),
    }
  }

  /// Name of the step that failed, used as a diagnostic header
  pub fn step(&self) -> &'static str {
    match self {
      Self::Io(_) => "io",
      Self::ExecutionFailed { .. } => "execution",
      Self::BuildFailed { .. } => "build",
      Self::VolumeUnavailable { .. } => "volume",
      Self::DeploymentFailed { .. } => "deployment",
      Self::ConfigValidationFailed { .. } => "proxy config",
      Self::CertificateIssuanceFailed { .. } => "certificate",
      Self::DeploymentTimedOut { .. } => "timeout",
      Self::InvalidConfig { .. } => "config",
    }
  }

  pub fn exit_code(&self) -> i32 {
    match self {
      Self::Io(_) => 1,
      Self::ExecutionFailed { .. } => 2,
      Self::BuildFailed { .. } => 3,
      Self::VolumeUnavailable { .. } => 4,
      Self::DeploymentFailed { .. } => 5,
      Self::ConfigValidationFailed { .. } => 6,
      Self::CertificateIssuanceFailed { .. } => 7,
      Self::DeploymentTimedOut { .. } => 8,
      Self::InvalidConfig { .. } => 78,
    }
  }

  /// Captured subprocess output attached to the error, if any
  pub fn diagnostics(&self) -> Option<&str> {
    let output = match self {
      Self::ExecutionFailed { stderr, .. } => stderr,
      Self::BuildFailed { output, .. }
      | Self::VolumeUnavailable { output, .. }
      | Self::ConfigValidationFailed { output, .. }
      | Self::CertificateIssuanceFailed { output, .. } => output,
      Self::DeploymentFailed { logs, .. } => logs,
      _ => return None,
    };
    if output.trim().is_empty() {
      return None;
    }
    Some(output)
  }

  pub fn exit(&self) -> ! {
    eprintln!("[{}] {self}", self.step());
    if let Some(output) = self.diagnostics() {
      eprintln!("---");
      eprintln!("{}", output.trim_end());
      eprintln!("---");
    }
    std::process::exit(self.exit_code());
  }
}
