//! Binary entry point
//!
//! Thin wrapper over the library: parses the two CLI flags, installs the
//! log subscriber, loads the startup configuration file and runs one
//! worker per preset until a termination signal.

use clap::Parser;
use scrape_relay::{
    Config, DEFAULT_CONFIG_PATH, Preset, Result, ScrapeRelay, run_with_shutdown,
};
use tracing_subscriber::EnvFilter;

/// Fixed preset table: query file stem paired with the engine-side parser.
/// The avito feed writes literal null placeholders into its result files,
/// so that preset gets the extra repair pass.
fn presets() -> Vec<Preset> {
    vec![
        Preset::new("auto-ru", "JS::Order::2571"),
        Preset::new("avito", "JS::Order::2564").with_null_stripping(),
    ]
}

#[derive(Parser, Debug)]
#[command(
    name = "scrape-relay",
    version,
    about = "Drives collection tasks on a remote engine and relays results downstream"
)]
struct Cli {
    /// Ask the engine to keep task logs in its database
    #[arg(long)]
    task_logging: bool,

    /// Write a diagnostic report file for every failed cycle
    #[arg(long)]
    reports: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Default to info for this crate; override with RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scrape_relay=info")),
        )
        .init();

    let mut config = Config::load(DEFAULT_CONFIG_PATH).await?;
    config.task_logging = cli.task_logging;

    let mut relay = ScrapeRelay::new(config)?;
    if cli.reports {
        relay = relay.with_reports("./reports");
    }

    run_with_shutdown(relay, presets()).await
}
