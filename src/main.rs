//! kubefoundry CLI

use clap::Parser;

use kubefoundry::cli::{Cli, Result};
use kubefoundry_common::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(LogConfig {
        format: cli.log_format,
        ..Default::default()
    })?;

    cli.run().await
}
