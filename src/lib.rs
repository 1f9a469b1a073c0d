//! # scrape-relay
//!
//! Driver for a remote task-based collection engine. Each configured preset
//! gets its own infinite worker loop that loads queries, submits a
//! collection task with the accumulated duplicate-suppression set, polls the
//! task to a terminal state, fetches and repairs the result payload, records
//! newly seen identifiers per region, and forwards the payload downstream.
//!
//! ## Design Philosophy
//!
//! - **Presets are independent** - One preset failing or backing off never
//!   stalls another
//! - **Failures restart the cycle** - Only a missing query source ends a
//!   worker; everything else is reported and retried
//! - **Library-first** - The binary is a thin wrapper; embedding the relay
//!   in another process is supported
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use scrape_relay::{Config, Preset, ScrapeRelay};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("./config/aparser.txt").await?;
//!     let relay = ScrapeRelay::new(config)?;
//!     relay.connect().await?;
//!
//!     // Subscribe to events
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let workers = relay.spawn_workers(vec![Preset::new("auto-ru", "JS::Order::2571")]);
//!     for worker in workers {
//!         worker.await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration file and query source loading
pub mod config;
/// Remote engine client
pub mod engine;
/// Error types
pub mod error;
/// Per-region duplicate tracking
pub mod exclusions;
/// Downstream result delivery
pub mod forwarder;
/// Task submission, polling and result retrieval
pub mod lifecycle;
/// Top-level driver assembly
pub mod relay;
/// Failure report persistence
pub mod report;
/// Result payload repair
pub mod sanitize;
/// Core types and events
pub mod types;
/// Per-preset worker loop
pub mod worker;

// Re-export commonly used types
pub use config::{Config, DEFAULT_CONFIG_PATH, TimingConfig};
pub use engine::{Engine, HttpEngine, TaskRequest};
pub use error::{Error, Result};
pub use exclusions::ExclusionSet;
pub use forwarder::Forwarder;
pub use lifecycle::TaskLifecycle;
pub use relay::ScrapeRelay;
pub use report::{FileReporter, NoOpReporter, ReportSink};
pub use sanitize::Sanitizer;
pub use types::{
    Event, Preset, RegionCounts, Report, ResultRecord, Stage, TaskId, TaskStatus, TaskTransition,
};
pub use worker::{Disposition, PresetWorker, disposition};

/// Helper function to run the relay with graceful signal handling.
///
/// Connects to the engine, spawns one worker per preset, and runs until
/// either every worker has ended on its own or a termination signal
/// arrives, in which case the workers are cancelled and awaited.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use scrape_relay::{Config, Preset, ScrapeRelay, run_with_shutdown};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::load("./config/aparser.txt").await?;
///     let relay = ScrapeRelay::new(config)?;
///
///     run_with_shutdown(relay, vec![Preset::new("auto-ru", "JS::Order::2571")]).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(relay: ScrapeRelay, presets: Vec<Preset>) -> Result<()> {
    relay.connect().await?;

    let handles = relay.spawn_workers(presets);
    let workers = futures::future::join_all(handles);
    tokio::pin!(workers);

    let results = tokio::select! {
        results = &mut workers => {
            tracing::info!("all workers ended");
            results
        }
        _ = wait_for_signal() => {
            relay.shutdown();
            workers.await
        }
    };

    for result in results {
        if let Err(e) = result {
            tracing::error!(error = %e, "worker task aborted");
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
