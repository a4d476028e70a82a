use serde::{Serialize, Deserialize};

use super::{ContainerInstance, ImageRef, VolumeRef};

/// How the running instance gets replaced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolloutStrategy {
  /// Remove the old instance, then start the new one
  Recreate,
  /// Verify the new image on the alternate port before touching the old one
  #[default]
  BlueGreen,
}

/// Which slots hold a healthy instance during a blue-green rollout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
  OldActive,
  BothActive,
  NewActive,
}

impl std::fmt::Display for SlotState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::OldActive => write!(f, "OLD_ACTIVE"),
      Self::BothActive => write!(f, "BOTH_ACTIVE"),
      Self::NewActive => write!(f, "NEW_ACTIVE"),
    }
  }
}

/// Outcome of a successful rollout
#[derive(Clone, Debug)]
pub struct RolloutReport {
  pub volume: VolumeRef,
  pub image: ImageRef,
  pub instance: ContainerInstance,
  pub slot: SlotState,
}
