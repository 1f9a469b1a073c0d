//! Diagnostic report persistence
//!
//! Failed cycles can leave a durable trace for later inspection. The
//! [`ReportSink`] trait is the seam: [`FileReporter`] writes one text file
//! per failure, [`NoOpReporter`] discards reports when persistence is
//! disabled. Reports are never read back by the process.

use crate::error::Result;
use crate::types::Report;
use async_trait::async_trait;
use chrono::SecondsFormat;
use std::path::PathBuf;
use tracing::debug;

const RULE: &str = "----------------------------------------";

/// Sink for failure reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist one failure report
    async fn record(&self, report: &Report) -> Result<()>;
}

/// Writes each report as a text file under a directory
///
/// Files are named `<timestamp>-<preset>.txt` with the timestamp's colons
/// replaced so the name is portable. The directory is created on first use.
pub struct FileReporter {
    dir: PathBuf,
}

impl FileReporter {
    /// Create a reporter writing under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(report: &Report) -> String {
        let stamp = report
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-");
        format!("{stamp}-{}.txt", report.preset)
    }

    fn render(report: &Report) -> String {
        let task = report
            .task
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "{error}\n{RULE}\n{timestamp}\n{RULE}\nTask: {task}\n{RULE}\n{payload}\n",
            error = report.error,
            timestamp = report.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            payload = report.raw_payload.as_deref().unwrap_or(""),
        )
    }
}

#[async_trait]
impl ReportSink for FileReporter {
    async fn record(&self, report: &Report) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(report));
        tokio::fs::write(&path, Self::render(report)).await?;
        debug!(path = %path.display(), "failure report written");
        Ok(())
    }
}

/// Discards reports when persistence is disabled
pub struct NoOpReporter;

#[async_trait]
impl ReportSink for NoOpReporter {
    async fn record(&self, _report: &Report) -> Result<()> {
        Ok(())
    }
}
