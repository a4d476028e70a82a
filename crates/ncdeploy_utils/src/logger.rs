/// Initialise env_logger for the given binary.
///
/// `LOG_LEVEL` takes precedence; otherwise the binary logs at `info`,
/// or at `debug` when `verbose` is set.
pub fn enable_logger(bin_name: &str, verbose: bool) {
  let default_level = if verbose {
    format!("{bin_name}=debug")
  } else {
    format!("{bin_name}=info")
  };
  let filters = std::env::var("LOG_LEVEL").unwrap_or(default_level);
  let is_test = std::env::var("TEST").is_ok();
  // Tests enable the logger more than once per process
  let _ = env_logger::Builder::new()
    .parse_filters(&filters)
    .format_target(false)
    .is_test(is_test)
    .try_init();
}
