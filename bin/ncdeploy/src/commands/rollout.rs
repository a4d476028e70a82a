use crate::error::DeployResult;
use crate::orchestrator::Orchestrator;
use crate::utils::process::ProcessRunner;

/// Function that execute when running `ncdeploy rollout`
pub async fn exec_rollout<R>(orchestrator: &Orchestrator<R>) -> DeployResult<()>
where
  R: ProcessRunner,
{
  let report = orchestrator.rollout().await?;
  println!(
    "{} is {} from {} [{}]",
    report.instance.name, report.instance.state, report.image, report.slot
  );
  // The vhost is left as is, report what it serves
  let https = orchestrator
    .certificate()
    .await
    .map(|cert| cert.is_some())
    .unwrap_or(false);
  super::print_urls(&orchestrator.urls(https));
  Ok(())
}
