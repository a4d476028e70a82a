/// Set by the build script from the target triple
pub const ARCH: &str = env!("TARGET_ARCH");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git hash of the build
pub const COMMIT_ID: &str = env!("GIT_HASH");

/// `stable` unless `NCDEPLOY_CHANNEL` was set at build time
pub const CHANNEL: &str = env!("CHANNEL");

pub fn print_version() {
  println!("Arch: {ARCH}");
  println!("Channel: {CHANNEL}");
  println!("Version: {VERSION}");
  println!("Commit ID: {COMMIT_ID}");
}
