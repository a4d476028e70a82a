use std::io::{Error, ErrorKind, Result};

/// ## Set env git commit hash
///
/// Execute the git command to extract the hash of the current commit
/// and set it as an environment variable for the produced binary
///
pub fn set_env_git_commit_hash() -> Result<()> {
  let git_hash = std::process::Command::new("git")
    .args(["rev-parse", "HEAD"])
    .output()
    .ok()
    .and_then(|output| String::from_utf8(output.stdout).ok())
    .map(|hash| hash.trim().to_owned())
    .filter(|hash| !hash.is_empty())
    .unwrap_or_else(|| "<unknown>".to_owned());
  println!("cargo:rustc-env=GIT_HASH={git_hash}");
  Ok(())
}

/// ## Set env target arch
///
/// Set the target arch as an environment variable for the produced binary
///
pub fn set_env_target_arch() -> Result<()> {
  let arch = std::env::var("CARGO_CFG_TARGET_ARCH")
    .map_err(|err| Error::new(ErrorKind::Other, err))?;
  println!("cargo:rustc-env=TARGET_ARCH={arch}");
  Ok(())
}

/// ## Set channel
///
/// Set the release channel as an environment variable for the produced binary
///
pub fn set_channel() -> Result<()> {
  let channel =
    std::env::var("NCDEPLOY_CHANNEL").unwrap_or_else(|_| "stable".into());
  println!("cargo:rustc-env=CHANNEL={channel}");
  println!("cargo:rerun-if-env-changed=NCDEPLOY_CHANNEL");
  Ok(())
}

/// ## Generate man page
///
/// Render the man page of `app` as `{dir}/{name}.1`
///
pub fn generate_man_page(
  name: &str,
  app: &clap::Command,
  dir: &str,
) -> Result<()> {
  let man = clap_mangen::Man::new(app.to_owned());
  let mut man_buffer: Vec<u8> = Default::default();
  man.render(&mut man_buffer)?;
  std::fs::create_dir_all(dir)?;
  let path = std::path::Path::new(dir).join(format!("{name}.1"));
  std::fs::write(path, man_buffer)?;
  Ok(())
}
