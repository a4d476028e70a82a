use std::io::Result;

use clap::*;

use ncdeploy_utils::build_tools::*;

include!("./src/cli.rs");

/// Path where to render the man pages
const MAN_PATH: &str = "./target/man";

/// ## Generate man pages
///
/// Generate the man page of ncdeploy and of each subcommand
///
fn generate_man_pages() -> Result<()> {
  let cli = Cli::command();
  generate_man_page("ncdeploy", &cli, MAN_PATH)?;
  for sub in cli.get_subcommands() {
    let name = format!("ncdeploy-{}", sub.get_name());
    generate_man_page(&name, sub, MAN_PATH)?;
  }
  Ok(())
}

/// ## Main
///
/// The channel, the git commit hash and the target arch
/// are statically linked into the binary to track bugs.
///
fn main() -> Result<()> {
  set_env_target_arch()?;
  set_channel()?;
  set_env_git_commit_hash()?;
  generate_man_pages()?;
  Ok(())
}
