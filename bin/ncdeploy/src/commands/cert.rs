use crate::error::DeployResult;
use crate::orchestrator::Orchestrator;
use crate::utils::process::ProcessRunner;

/// Function that execute when running `ncdeploy cert`
/// Renewal is left to the ACME client, this only reports
pub async fn exec_cert<R>(orchestrator: &Orchestrator<R>) -> DeployResult<()>
where
  R: ProcessRunner,
{
  let domain = &orchestrator.config().proxy()?.domain;
  match orchestrator.certificate().await? {
    None => println!("No certificate installed for {domain}"),
    Some(cert) => {
      println!("Domain: {}", cert.domain);
      println!("Issuer: {}", cert.issuer);
      println!("Expiry: {}", cert.expiry);
      println!("Days remaining: {}", cert.days_remaining);
      if cert.days_remaining < 0 {
        log::warn!("cert: {domain} expired, check the renewal agent");
      } else if cert.days_remaining < 30 {
        log::warn!("cert: {domain} expires soon, check the renewal agent");
      }
    }
  }
  Ok(())
}
