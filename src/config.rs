//! Configuration types for scrape-relay

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the startup configuration file
pub const DEFAULT_CONFIG_PATH: &str = "./config/aparser.txt";

/// Timing knobs for the worker loops
///
/// Grouped so tests can shrink the waits without touching the rest of the
/// configuration. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Interval between task state polls (default: 5s)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Wait after a rejected task submission before the cycle restarts (default: 10s)
    #[serde(default = "default_submit_backoff")]
    pub submit_backoff: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            submit_backoff: default_submit_backoff(),
        }
    }
}

/// Startup configuration
///
/// Loaded once from a `key: value` file before any worker starts and treated
/// as read-only afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Engine API endpoint
    pub engine_url: String,

    /// Engine API password
    pub password: String,

    /// Downstream URL sanitized results are posted to
    ///
    /// Forwarding fails with a forward error when unset.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Directory holding per-preset query files (default: "./config")
    #[serde(default = "default_queries_dir")]
    pub queries_dir: PathBuf,

    /// Path component namespacing engine-side result files (default: "order2645")
    #[serde(default = "default_output_namespace")]
    pub output_namespace: String,

    /// Engine config preset applied to submitted parsers (default: "Order::2645")
    #[serde(default = "default_parser_preset")]
    pub parser_preset: String,

    /// Ask the engine to keep database logs for submitted tasks
    #[serde(default)]
    pub task_logging: bool,

    /// Timing knobs
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    /// Load the configuration from a `key: value` file
    ///
    /// A missing or unreadable file is a fatal startup error.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read or a required key
    /// is absent.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config {
                message: format!("cannot read {}: {e}", path.display()),
                key: None,
            })?;
        Self::parse(&text)
    }

    /// Parse configuration text in `key: value` line format
    ///
    /// Keys are single words; values run to the end of the line and may
    /// themselves contain colons (URLs do). Unknown keys are ignored.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `url` or `pass` is missing.
    pub fn parse(text: &str) -> Result<Self> {
        let line = Regex::new(r"(?m)^(\w+):\s*(.+?)\s*$").map_err(|e| Error::Config {
            message: format!("config line pattern failed to compile: {e}"),
            key: None,
        })?;

        let mut engine_url = None;
        let mut password = None;
        let mut remote_url = None;

        for captures in line.captures_iter(text) {
            let value = captures[2].to_string();
            match &captures[1] {
                "url" => engine_url = Some(value),
                "pass" => password = Some(value),
                "remote" => remote_url = Some(value),
                _ => {}
            }
        }

        let engine_url = engine_url.ok_or_else(|| missing_key("url"))?;
        let password = password.ok_or_else(|| missing_key("pass"))?;

        Ok(Self {
            engine_url,
            password,
            remote_url,
            queries_dir: default_queries_dir(),
            output_namespace: default_output_namespace(),
            parser_preset: default_parser_preset(),
            task_logging: false,
            timing: TimingConfig::default(),
        })
    }

    /// Load the query list for a preset
    ///
    /// Reads `<queries_dir>/<preset>.txt`, trims every line and drops blanks.
    ///
    /// # Errors
    /// Returns [`Error::QueriesMissing`] if the file cannot be read.
    pub async fn load_queries(&self, preset: &str) -> Result<Vec<String>> {
        let path = self.queries_dir.join(format!("{preset}.txt"));
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| Error::QueriesMissing {
                preset: preset.to_string(),
                path: path.clone(),
            })?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn missing_key(key: &str) -> Error {
    Error::Config {
        message: format!("missing required key '{key}'"),
        key: Some(key.to_string()),
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_submit_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_queries_dir() -> PathBuf {
    PathBuf::from("./config")
}

fn default_output_namespace() -> String {
    "order2645".to_string()
}

fn default_parser_preset() -> String {
    "Order::2645".to_string()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_keys() {
        let config = Config::parse(
            "url: http://127.0.0.1:9091/API\npass: secret\nremote: https://example.com/intake\n",
        )
        .unwrap();
        assert_eq!(config.engine_url, "http://127.0.0.1:9091/API");
        assert_eq!(config.password, "secret");
        assert_eq!(
            config.remote_url.as_deref(),
            Some("https://example.com/intake")
        );
    }

    #[test]
    fn value_may_contain_colons() {
        let config = Config::parse("url: http://host:9091/API\npass: p\n").unwrap();
        assert_eq!(config.engine_url, "http://host:9091/API");
    }

    #[test]
    fn remote_is_optional() {
        let config = Config::parse("url: http://e/API\npass: p\n").unwrap();
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn missing_url_names_the_key() {
        let err = Config::parse("pass: p\n").unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("url")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn missing_pass_names_the_key() {
        let err = Config::parse("url: http://e/API\n").unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("pass")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_and_noise_lines_are_ignored() {
        let config = Config::parse(
            "# comment-ish line\nurl: http://e/API\ntoken: unused\npass: p\nnot a key line\n",
        )
        .unwrap();
        assert_eq!(config.password, "p");
    }

    #[test]
    fn windows_line_endings_are_trimmed() {
        let config = Config::parse("url: http://e/API\r\npass: p\r\n").unwrap();
        assert_eq!(config.engine_url, "http://e/API");
        assert_eq!(config.password, "p");
    }

    #[test]
    fn default_timing_matches_contract() {
        let timing = TimingConfig::default();
        assert_eq!(timing.poll_interval, Duration::from_secs(5));
        assert_eq!(timing.submit_backoff, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn load_queries_trims_and_drops_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::parse("url: http://e/API\npass: p\n").unwrap();
        config.queries_dir = dir.path().to_path_buf();
        tokio::fs::write(
            dir.path().join("auto-ru.txt"),
            "  bmw x5  \n\naudi a6\n   \nlada vesta\n",
        )
        .await
        .unwrap();

        let queries = config.load_queries("auto-ru").await.unwrap();
        assert_eq!(queries, vec!["bmw x5", "audi a6", "lada vesta"]);
    }

    #[tokio::test]
    async fn load_queries_missing_file_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::parse("url: http://e/API\npass: p\n").unwrap();
        config.queries_dir = dir.path().to_path_buf();

        let err = config.load_queries("avito").await.unwrap_err();
        match err {
            Error::QueriesMissing { preset, path } => {
                assert_eq!(preset, "avito");
                assert!(path.ends_with("avito.txt"));
            }
            other => panic!("expected QueriesMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn load_reports_missing_file_as_config_error() {
        let err = Config::load("/definitely/not/here/aparser.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
