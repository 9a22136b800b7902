use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "aws-voyager",
    version,
    about = "A terminal dashboard for ECS services, Lambda functions and API Gateways."
)]
pub struct CliArgs {
    /// AWS region, overrides the config file
    #[arg(short, long)]
    pub region: Option<String>,

    /// AWS profile, overrides the config file
    #[arg(short, long)]
    pub profile: Option<String>,

    /// ECS cluster to show instead of the first one in the account
    #[arg(short, long)]
    pub cluster: Option<String>,

    /// Log at debug level
    #[arg(long)]
    pub debug: bool,

    /// tracing filter (for example: info,aws_voyager=debug), overrides RUST_LOG
    #[arg(long)]
    pub log_filter: Option<String>,

    /// File the log is written to
    #[arg(long, default_value = "/tmp/aws-voyager.log")]
    pub log_file: PathBuf,
}

impl CliArgs {
    /// Filter directive used when neither `--log-filter` nor `RUST_LOG` is set.
    pub fn default_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
