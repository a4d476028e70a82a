use clap::{Parser, Subcommand};

/// Roll out a single containerized service behind nginx
/// and keep its TLS virtual host in shape
#[derive(Debug, Parser)]
#[clap(about, version, name = "ncdeploy")]
pub struct Cli {
  /// Path to the deployment file
  #[clap(long, short = 'c', default_value = "ncdeploy.yml")]
  pub config: String,
  /// Dotenv file loaded before rendering the deployment file
  #[clap(long)]
  pub env_file: Option<String>,
  /// Log debug messages and every executed command
  #[clap(long, short = 'v')]
  pub verbose: bool,
  #[clap(subcommand)]
  pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Build, promote and replace the running service
  Rollout,
  /// First deployment: rollout then obtain a certificate and switch to https
  Bootstrap(BootstrapOpts),
  /// Show the certificate installed for the configured domain
  Cert,
  /// Show version information
  Version,
}

/// `ncdeploy bootstrap` available options
#[derive(Debug, Clone, Parser)]
pub struct BootstrapOpts {
  /// Only run the tls part, the service is expected to be running already
  #[clap(long)]
  pub skip_rollout: bool,
}
