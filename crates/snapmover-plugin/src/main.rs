//! snapmover: run data-mover item actions from the command line

use clap::Parser;

use snapmover_common::telemetry::{init_telemetry, TelemetryConfig};
use snapmover_plugin::cli::{Cli, CliError, LogFormat};

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        json: cli.log_format == LogFormat::Json,
        ..Default::default()
    })?;

    cli.run().await
}
