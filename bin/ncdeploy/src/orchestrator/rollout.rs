use crate::error::{DeployError, DeployResult};
use crate::models::{
  ContainerInstance, ContainerState, ImageRef, RolloutReport, RolloutStrategy,
  SlotState, VolumeRef,
};
use crate::utils::container::Slot;
use crate::utils::process::ProcessRunner;

use super::Orchestrator;

impl<R: ProcessRunner> Orchestrator<R> {
  pub(super) async fn run_rollout(&self) -> DeployResult<RolloutReport> {
    let service = &self.config.service;
    let build = &self.config.build;
    let strategy = self.config.rollout.strategy;
    log::info!("rollout: {} with {strategy:?}", service.name);
    let volume = self
      .volumes
      .ensure_volume(&service.volume, &service.name)
      .await?;
    let staging = ImageRef::new(&service.image, &build.staging_tag);
    let promoted = ImageRef::new(&service.image, &build.final_tag);
    self.images.build_staged(build, &staging).await?;
    let image = self.images.promote(&staging, &promoted).await?;
    let (instance, slot) = match self.config.rollout.strategy {
      RolloutStrategy::Recreate => self.recreate(&volume, &image).await?,
      RolloutStrategy::BlueGreen => self.blue_green(&volume, &image).await?,
    };
    if build.prune {
      self.images.prune_dangling().await;
    }
    log::info!("rollout: {} is running {image}", instance.name);
    Ok(RolloutReport {
      volume,
      image,
      instance,
      slot,
    })
  }

  /// Launch in `slot` and wait for the instance to run
  async fn start_verified(
    &self,
    slot: &Slot,
    volume: &VolumeRef,
    image: &ImageRef,
  ) -> DeployResult<ContainerInstance> {
    self.containers.ensure_port_free(slot.host_port).await?;
    let instance = self
      .containers
      .launch(&self.config.service, slot, volume, image)
      .await?;
    self
      .containers
      .verify_running(&instance, &self.config.rollout)
      .await
  }

  /// Remove the candidate an interrupted rollout left behind
  async fn discard_leftover(
    &self,
    name: &str,
    candidate: &str,
  ) -> DeployResult<()> {
    let leftover = self.containers.status(candidate).await?;
    if leftover.state == ContainerState::Absent {
      return Ok(());
    }
    let current = self.containers.status(name).await?;
    if leftover.is_ready() && !current.is_ready() {
      log::warn!(
        "rollout: leftover {candidate} is the only running instance of \
         {name} ({}), removing it before the new candidate",
        current.state
      );
    } else {
      log::info!("rollout: removing leftover {candidate}");
    }
    self.containers.teardown(candidate).await
  }

  /// Old instance goes away first, the service is down until the new one runs
  async fn recreate(
    &self,
    volume: &VolumeRef,
    image: &ImageRef,
  ) -> DeployResult<(ContainerInstance, SlotState)> {
    let service = &self.config.service;
    self.containers.teardown(&service.name).await?;
    let slot = Slot::new(&service.name, service.host_port);
    let instance = self.start_verified(&slot, volume, image).await?;
    Ok((instance, SlotState::NewActive))
  }

  /// The old instance keeps serving until the new image proved it runs
  async fn blue_green(
    &self,
    volume: &VolumeRef,
    image: &ImageRef,
  ) -> DeployResult<(ContainerInstance, SlotState)> {
    let service = &self.config.service;
    let alternate_port = service.alternate_port.ok_or_else(|| {
      DeployError::invalid_config("blue-green needs Service.AlternatePort")
    })?;
    let candidate = Slot::new(&service.candidate_name(), alternate_port);
    log::info!("rollout: {}", SlotState::OldActive);
    self.discard_leftover(&service.name, &candidate.name).await?;
    if let Err(err) = self.start_verified(&candidate, volume, image).await {
      log::error!("rollout: candidate {} failed, keeping old", candidate.name);
      if let Err(err) = self.containers.teardown(&candidate.name).await {
        log::warn!("rollout: unable to remove {}: {err}", candidate.name);
      }
      return Err(err);
    }
    log::info!("rollout: {}", SlotState::BothActive);
    self.containers.teardown(&service.name).await?;
    let slot = Slot::new(&service.name, service.host_port);
    let instance = match self.start_verified(&slot, volume, image).await {
      Ok(instance) => instance,
      Err(err) => {
        log::error!(
          "rollout: {} failed, {} keeps serving on port {alternate_port}",
          service.name,
          candidate.name
        );
        return Err(err);
      }
    };
    self.containers.teardown(&candidate.name).await?;
    log::info!("rollout: {}", SlotState::NewActive);
    Ok((instance, SlotState::NewActive))
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};
  use std::collections::BTreeSet;

  use crate::models::{ContainerState, ProcessOutput};
  use crate::orchestrator::tests::test_config;
  use crate::utils::tests::{MockRunner, temp_dir};

  use super::*;

  /// Runner where containers run once started
  fn healthy_runner() -> MockRunner {
    let runner = MockRunner::new();
    runner.on("docker container inspect", ProcessOutput::ok("running|\n"));
    runner.on("docker run", ProcessOutput::ok("c0ffee\n"));
    runner
  }

  fn recreate_config(dir: &str) -> crate::config::DeployConfig {
    let mut config = test_config(dir);
    config.rollout.strategy = RolloutStrategy::Recreate;
    config
  }

  /// Track which containers publish which host port, from the commands seen
  fn track_ports(runner: &MockRunner) -> Arc<Mutex<Vec<BTreeSet<String>>>> {
    let bound = Arc::new(Mutex::new(Vec::<(String, String)>::new()));
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let (bound_ref, snapshots_ref) = (bound.clone(), snapshots.clone());
    runner.hook("docker", move |line| {
      let mut bound = bound_ref.lock().unwrap();
      let words = line.split(' ').collect::<Vec<_>>();
      match words.get(1).copied() {
        Some("run") => {
          let value = |flag: &str| {
            let index = words.iter().position(|word| *word == flag).unwrap();
            words[index + 1]
          };
          let (name, publish) = (value("--name"), value("--publish"));
          let port = publish.split(':').next().unwrap();
          bound.push((name.to_owned(), port.to_owned()));
        }
        Some("rm") => {
          let name = words[2];
          bound.retain(|(bound_name, _)| bound_name != name);
        }
        _ => {}
      }
      let ports = bound
        .iter()
        .map(|(_, port)| port.clone())
        .collect::<Vec<_>>();
      let unique = ports.iter().cloned().collect::<BTreeSet<_>>();
      assert_eq!(unique.len(), ports.len(), "host port bound twice: {ports:?}");
      snapshots_ref.lock().unwrap().push(unique);
    });
    snapshots
  }

  #[ntex::test]
  async fn recreate_order() {
    let dir = temp_dir("rollout-recreate");
    let runner = healthy_runner();
    let orchestrator = Orchestrator::new(recreate_config(&dir), &runner);
    let report = orchestrator.rollout().await.unwrap();
    assert_eq!(report.slot, SlotState::NewActive);
    assert_eq!(report.instance.state, ContainerState::Running);
    assert_eq!(report.instance.id, "c0ffee");
    assert_eq!(report.image.to_string(), "construction-api:latest");
    let order = [
      "docker volume ls",
      "docker build",
      "docker tag construction-api:new construction-api:latest",
      "docker rmi construction-api:new",
      "docker stop construction-api",
      "docker rm construction-api",
      "docker container ls --filter publish=8000",
      "docker run",
      "docker container inspect",
      "docker image prune",
    ];
    let positions = order
      .iter()
      .map(|prefix| runner.position(prefix).unwrap())
      .collect::<Vec<_>>();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
  }

  #[ntex::test]
  async fn build_failure_keeps_old_instance() {
    let dir = temp_dir("rollout-build-failure");
    let runner = healthy_runner();
    runner.on("docker build", ProcessOutput::failed(1, "COPY failed"));
    let orchestrator = Orchestrator::new(test_config(&dir), &runner);
    let err = orchestrator.rollout().await.unwrap_err();
    assert!(matches!(err, DeployError::BuildFailed { .. }));
    assert_ne!(err.exit_code(), 0);
    for prefix in ["docker tag", "docker stop", "docker rm", "docker run"] {
      assert_eq!(runner.count(prefix), 0, "{prefix} was called");
    }
  }

  #[ntex::test]
  async fn recreate_failure_reports_logs() {
    let dir = temp_dir("rollout-recreate-failure");
    let runner = healthy_runner();
    runner.on("docker container inspect", ProcessOutput::ok("exited|\n"));
    let logs = (1..=120)
      .map(|i| format!("log line {i}"))
      .collect::<Vec<_>>()
      .join("\n");
    runner.on("docker logs", ProcessOutput::ok(&logs));
    let orchestrator = Orchestrator::new(recreate_config(&dir), &runner);
    match orchestrator.rollout().await {
      Err(DeployError::DeploymentFailed {
        container, logs, ..
      }) => {
        assert_eq!(container, "construction-api");
        assert_eq!(logs.lines().count(), 50);
        assert!(logs.ends_with("log line 120"));
      }
      other => panic!("expected DeploymentFailed got {other:?}"),
    }
    assert_eq!(runner.count("docker image prune"), 0);
  }

  #[ntex::test]
  async fn blue_green_success() {
    let dir = temp_dir("rollout-blue-green");
    let runner = healthy_runner();
    let snapshots = track_ports(&runner);
    let orchestrator = Orchestrator::new(test_config(&dir), &runner);
    let report = orchestrator.rollout().await.unwrap();
    assert_eq!(report.slot, SlotState::NewActive);
    assert_eq!(report.instance.name, "construction-api");
    assert_eq!(report.instance.host_port, 8000);
    let candidate_run = runner
      .position("docker run --detach --name construction-api-next")
      .unwrap();
    let calls = runner.calls();
    let old_stop = calls
      .iter()
      .position(|line| line == "docker stop construction-api")
      .unwrap();
    let new_run = runner
      .position("docker run --detach --name construction-api --publish 8000")
      .unwrap();
    assert!(candidate_run < old_stop);
    assert!(old_stop < new_run);
    assert!(calls[candidate_run].contains("--publish 8001:8000"));
    assert_eq!(
      calls.last().unwrap(),
      "docker image prune --force",
      "candidate removal precedes the prune"
    );
    let candidate_rm = calls
      .iter()
      .rposition(|line| line == "docker rm construction-api-next")
      .unwrap();
    assert!(candidate_rm > new_run);
    let snapshots = snapshots.lock().unwrap();
    let bound = snapshots.last().unwrap();
    assert_eq!(bound.iter().collect::<Vec<_>>(), vec!["8000"]);
  }

  #[ntex::test]
  async fn blue_green_candidate_failure_keeps_old() {
    let dir = temp_dir("rollout-candidate-failure");
    let runner = healthy_runner();
    runner.on_match(
      |line| {
        line.starts_with("docker container inspect")
          && line.ends_with("construction-api-next")
      },
      ProcessOutput::ok("running|unhealthy\n"),
    );
    let orchestrator = Orchestrator::new(test_config(&dir), &runner);
    let err = orchestrator.rollout().await.unwrap_err();
    match err {
      DeployError::DeploymentFailed { container, .. } => {
        assert_eq!(container, "construction-api-next");
      }
      other => panic!("expected DeploymentFailed got {other:?}"),
    }
    let calls = runner.calls();
    assert!(!calls.contains(&"docker stop construction-api".to_owned()));
    assert_eq!(
      calls.last().unwrap(),
      "docker rm construction-api-next",
      "failed candidate is removed"
    );
  }

  #[ntex::test]
  async fn blue_green_final_failure_keeps_candidate() {
    let dir = temp_dir("rollout-final-failure");
    let runner = healthy_runner();
    runner.on_match(
      |line| {
        line.starts_with("docker container inspect")
          && line.ends_with(" construction-api")
      },
      ProcessOutput::ok("dead|\n"),
    );
    let orchestrator = Orchestrator::new(test_config(&dir), &runner);
    let err = orchestrator.rollout().await.unwrap_err();
    assert!(matches!(err, DeployError::DeploymentFailed { .. }));
    let calls = runner.calls();
    let candidate_removals = calls
      .iter()
      .filter(|line| *line == "docker rm construction-api-next")
      .count();
    // Only the leftover cleanup before the candidate started
    assert_eq!(candidate_removals, 1);
    let candidate_rm = runner.position("docker rm construction-api-next");
    let candidate_run =
      runner.position("docker run --detach --name construction-api-next");
    assert!(candidate_rm < candidate_run);
  }

  fn inspects(name: &'static str) -> impl Fn(&str) -> bool + Send {
    move |line: &str| {
      line.starts_with("docker container inspect")
        && line.ends_with(&format!(" {name}"))
    }
  }

  #[ntex::test]
  async fn absent_leftover_is_left_alone() {
    let dir = temp_dir("rollout-no-leftover");
    let runner = healthy_runner();
    runner.on_match_seq(
      inspects("construction-api-next"),
      vec![
        ProcessOutput::failed(1, "Error: No such container"),
        ProcessOutput::ok("running|\n"),
      ],
    );
    let orchestrator = Orchestrator::new(test_config(&dir), &runner);
    orchestrator.rollout().await.unwrap();
    let calls = runner.calls();
    let candidate_run = runner
      .position("docker run --detach --name construction-api-next")
      .unwrap();
    let first_stop = calls
      .iter()
      .position(|line| line == "docker stop construction-api-next")
      .unwrap();
    assert!(candidate_run < first_stop);
  }

  #[ntex::test]
  async fn leftover_survivor_checked_before_removal() {
    let dir = temp_dir("rollout-survivor");
    let runner = healthy_runner();
    // A previous final launch failed: only the candidate runs
    runner.on_match_seq(
      inspects("construction-api"),
      vec![ProcessOutput::ok("exited|\n"), ProcessOutput::ok("running|\n")],
    );
    let orchestrator = Orchestrator::new(test_config(&dir), &runner);
    let report = orchestrator.rollout().await.unwrap();
    assert_eq!(report.instance.name, "construction-api");
    let calls = runner.calls();
    let inspected = calls
      .iter()
      .position(|line| inspects("construction-api")(line.as_str()))
      .unwrap();
    let leftover_stop = calls
      .iter()
      .position(|line| line == "docker stop construction-api-next")
      .unwrap();
    let candidate_run = runner
      .position("docker run --detach --name construction-api-next")
      .unwrap();
    assert!(inspected < leftover_stop);
    assert!(leftover_stop < candidate_run);
  }

  #[ntex::test]
  async fn stale_port_holder() {
    let dir = temp_dir("rollout-port-holder");
    let runner = healthy_runner();
    runner.on(
      "docker container ls --filter publish=8000",
      ProcessOutput::ok("legacy-api\n"),
    );
    let orchestrator = Orchestrator::new(recreate_config(&dir), &runner);
    let err = orchestrator.rollout().await.unwrap_err();
    assert!(err.to_string().contains("host port 8000"));
    assert_eq!(runner.count("docker run"), 0);
  }

  #[ntex::test]
  async fn redeploy_keeps_volume() {
    let dir = temp_dir("rollout-volume");
    let runner = healthy_runner();
    runner.on("docker volume ls", ProcessOutput::ok("construction-uploads\n"));
    let orchestrator = Orchestrator::new(test_config(&dir), &runner);
    let report = orchestrator.rollout().await.unwrap();
    assert!(report.volume.existed);
    assert_eq!(runner.count("docker volume create"), 0);
    assert_eq!(runner.count("docker volume rm"), 0);
    assert!(runner
      .calls()
      .iter()
      .filter(|line| line.starts_with("docker run"))
      .all(|line| line.contains("--volume construction-uploads:/app/uploads")));
  }
}
