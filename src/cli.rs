use clap::Parser;
use std::path::PathBuf;

/// sFlow v5 / IPFIX v10 flow collector: ingest, enrich, aggregate, persist
#[derive(Parser, Debug)]
#[command(name = "flowhouse")]
#[command(about = "Ingest sampled network flow telemetry, enrich it with routing and interface context, and persist it to a columnar store")]
#[command(version)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}
