use crate::version;

/// Function that execute when running `ncdeploy version`
pub fn exec_version() {
  println!("=== [ncdeploy] ===");
  version::print_version();
}
