mod rollout;
mod bootstrap;
mod cert;
mod version;

pub use rollout::*;
pub use bootstrap::*;
pub use cert::*;
pub use version::*;

/// Print where the service can be reached
fn print_urls(urls: &[String]) {
  println!("Service reachable at:");
  for url in urls {
    println!("  {url}");
  }
}
