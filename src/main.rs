use clap::Parser;
use flowhouse::cli::Cli;
use flowhouse::config::{parse_yaml_file, validate_config};
use flowhouse::error::{FlowhouseError, Result};
use flowhouse::supervisor::Supervisor;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = parse_yaml_file(&args.config)?;
    validate_config(&config)?;

    let supervisor = Supervisor::new(config)?;
    let shutdown = supervisor.shutdown_handle();

    ctrlc::set_handler(move || {
        let _ = shutdown.send(true);
    })
    .map_err(|e| FlowhouseError::Config(format!("failed to install Ctrl+C handler: {e}")))?;

    supervisor.run().await
}
