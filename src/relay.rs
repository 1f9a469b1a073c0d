//! Top-level driver
//!
//! [`ScrapeRelay`] assembles the engine client, task lifecycle controller,
//! result forwarder and report sink, verifies the engine answers the
//! handshake, and spawns one independent worker per preset. Consumers
//! subscribe to the broadcast [`Event`] stream for observation and cancel
//! all workers through [`ScrapeRelay::shutdown`].

use crate::config::Config;
use crate::engine::{Engine, HttpEngine};
use crate::error::{Error, Result};
use crate::forwarder::Forwarder;
use crate::lifecycle::TaskLifecycle;
use crate::report::{FileReporter, NoOpReporter, ReportSink};
use crate::sanitize::Sanitizer;
use crate::types::{Event, Preset};
use crate::worker::PresetWorker;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Buffer size for the event broadcast channel; slow subscribers miss
/// events rather than blocking the workers.
const EVENT_CHANNEL_SIZE: usize = 1000;

/// Driver over one engine connection and any number of preset workers
pub struct ScrapeRelay {
    engine: Arc<dyn Engine>,
    config: Arc<Config>,
    lifecycle: TaskLifecycle,
    forwarder: Forwarder,
    reporter: Arc<dyn ReportSink>,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
}

impl ScrapeRelay {
    /// Create a relay that talks to the engine over HTTP
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the engine or remote URL cannot be
    /// parsed, or [`Error::Parse`] if the payload sanitizer patterns fail
    /// to compile.
    pub fn new(config: Config) -> Result<Self> {
        let engine = Arc::new(HttpEngine::new(&config.engine_url, &config.password)?);
        Self::with_engine(engine, config)
    }

    /// Create a relay over a caller-supplied engine transport
    ///
    /// Lets tests and embedders swap the HTTP client for another
    /// [`Engine`] implementation.
    pub fn with_engine(engine: Arc<dyn Engine>, config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let forwarder = Forwarder::new(config.remote_url.as_deref())?;
        let lifecycle = TaskLifecycle::new(engine.clone(), config.clone(), Sanitizer::new()?);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            engine,
            config,
            lifecycle,
            forwarder,
            reporter: Arc::new(NoOpReporter),
            event_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Persist failure reports under `dir` instead of discarding them
    #[must_use]
    pub fn with_reports(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reporter = Arc::new(FileReporter::new(dir));
        self
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Verify the engine is reachable and answers the handshake
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the handshake request fails or the
    /// engine replies with anything other than the literal `pong`.
    pub async fn connect(&self) -> Result<()> {
        let reply = self
            .engine
            .ping()
            .await
            .map_err(|e| Error::Connection(format!("engine handshake failed: {e}")))?;
        if reply != "pong" {
            return Err(Error::Connection(format!("unexpected ping reply: {reply}")));
        }
        info!(url = %self.config.engine_url, "engine connection established");
        Ok(())
    }

    /// Spawn one worker per preset
    ///
    /// Each handle resolves when its worker ends, either through
    /// [`ScrapeRelay::shutdown`] or a fatal failure such as a missing query
    /// source. Workers are independent; one ending never affects another.
    pub fn spawn_workers(&self, presets: Vec<Preset>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(presets.len());
        for preset in presets {
            info!(preset = %preset.name, parser = %preset.parser, "spawning worker");
            let worker = PresetWorker::new(
                preset,
                self.config.clone(),
                self.lifecycle.clone(),
                self.forwarder.clone(),
                self.reporter.clone(),
                self.event_tx.clone(),
                self.shutdown.clone(),
            );
            handles.push(tokio::spawn(worker.run()));
        }
        handles
    }

    /// Subscribe to worker events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all
    /// events independently.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Signal every worker to stop after its current await point
    pub fn shutdown(&self) {
        info!("shutting down workers");
        self.shutdown.cancel();
    }
}
