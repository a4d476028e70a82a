use std::str::FromStr;
use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use ncdeploy_error::io::IoError;

/// Label put on every volume and container created for a service
pub const SERVICE_LABEL: &str = "io.ncdeploy.service";

/// Restart policy handed to the container engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
  No,
  Always,
  OnFailure,
  #[default]
  UnlessStopped,
}

impl std::fmt::Display for RestartPolicy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::No => write!(f, "no"),
      Self::Always => write!(f, "always"),
      Self::OnFailure => write!(f, "on-failure"),
      Self::UnlessStopped => write!(f, "unless-stopped"),
    }
  }
}

/// The one service this tool manages
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceSpec {
  /// Container name
  pub name: String,
  /// Image repository, tags are set by the build section
  pub image: String,
  pub host_port: u16,
  pub container_port: u16,
  /// Transient host port used by blue-green rollouts
  pub alternate_port: Option<u16>,
  /// Named volume holding the persistent state
  pub volume: String,
  /// Where the volume is mounted inside the container
  pub mount_path: String,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
  /// Keys of `env` that must hold a non-empty value
  #[serde(default)]
  pub secrets: Vec<String>,
  #[serde(default)]
  pub restart_policy: RestartPolicy,
}

impl ServiceSpec {
  /// Name of the transient container of a blue-green rollout
  pub fn candidate_name(&self) -> String {
    format!("{}-next", self.name)
  }
}

/// A named volume, `existed` is false when it was created by this run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeRef {
  pub name: String,
  pub existed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
  pub repository: String,
  pub tag: String,
}

impl ImageRef {
  pub fn new(repository: &str, tag: &str) -> Self {
    Self {
      repository: repository.to_owned(),
      tag: tag.to_owned(),
    }
  }
}

impl std::fmt::Display for ImageRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.repository, self.tag)
  }
}

/// Observed state of a container as reported by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
  Absent,
  Created,
  Running,
  Paused,
  Restarting,
  Removing,
  Exited,
  Dead,
}

impl ContainerState {
  /// The container will not reach running by itself anymore
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Absent | Self::Exited | Self::Dead)
  }
}

impl FromStr for ContainerState {
  type Err = IoError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "" => Ok(Self::Absent),
      "created" => Ok(Self::Created),
      "running" => Ok(Self::Running),
      "paused" => Ok(Self::Paused),
      "restarting" => Ok(Self::Restarting),
      "removing" => Ok(Self::Removing),
      "exited" => Ok(Self::Exited),
      "dead" => Ok(Self::Dead),
      _ => Err(IoError::invalid_data(
        "ContainerState",
        format!("unknown container status {s}"),
      )),
    }
  }
}

impl std::fmt::Display for ContainerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Absent => "absent",
      Self::Created => "created",
      Self::Running => "running",
      Self::Paused => "paused",
      Self::Restarting => "restarting",
      Self::Removing => "removing",
      Self::Exited => "exited",
      Self::Dead => "dead",
    };
    write!(f, "{s}")
  }
}

/// Container status plus the healthcheck verdict when the image has one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerStatus {
  pub state: ContainerState,
  pub health: Option<String>,
}

impl ContainerStatus {
  pub fn absent() -> Self {
    Self {
      state: ContainerState::Absent,
      health: None,
    }
  }

  /// Parse the `status|health` line printed by the inspect format
  pub fn parse(line: &str) -> Result<Self, IoError> {
    let (state, health) = line.trim().split_once('|').unwrap_or((line, ""));
    let health = match health.trim() {
      "" => None,
      health => Some(health.to_owned()),
    };
    Ok(Self {
      state: state.parse()?,
      health,
    })
  }

  /// Running, and healthy when a healthcheck is defined
  pub fn is_ready(&self) -> bool {
    self.state == ContainerState::Running
      && matches!(self.health.as_deref(), None | Some("healthy"))
  }

  /// Nothing left to wait for
  pub fn is_failed(&self) -> bool {
    self.state.is_terminal() || self.health.as_deref() == Some("unhealthy")
  }
}

/// A container started by this tool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerInstance {
  pub id: String,
  pub name: String,
  pub image: ImageRef,
  pub host_port: u16,
  pub container_port: u16,
  /// `volume:path` bindings
  pub mounts: Vec<String>,
  /// Injected environment keys, values are never kept around
  pub env: Vec<String>,
  pub state: ContainerState,
}
