use crate::cli::BootstrapOpts;
use crate::error::DeployResult;
use crate::orchestrator::Orchestrator;
use crate::utils::process::ProcessRunner;

/// Function that execute when running `ncdeploy bootstrap`
pub async fn exec_bootstrap<R>(
  orchestrator: &Orchestrator<R>,
  opts: &BootstrapOpts,
) -> DeployResult<()>
where
  R: ProcessRunner,
{
  let (report, tls) = orchestrator.bootstrap(opts.skip_rollout).await?;
  if let Some(report) = report {
    println!(
      "{} is {} from {}",
      report.instance.name, report.instance.state, report.image
    );
  }
  match tls.reasserted {
    true => println!("{} was already https, vhost rewritten", tls.domain),
    false => println!("{} switched to https", tls.domain),
  }
  println!("{}", tls.certificate);
  super::print_urls(&orchestrator.urls(true));
  Ok(())
}
