//! Core types for scrape-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for an engine task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for u64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Engine versions disagree on whether task ids are JSON numbers or strings,
// so deserialization accepts both.
impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(id) => Ok(TaskId(id)),
            Raw::Text(s) => s
                .trim()
                .parse::<u64>()
                .map(TaskId)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Status reported by the engine for a task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// Accepted and still being processed
    Running,
    /// Finished successfully
    Completed,
    /// Stopped before completion
    Stopped,
    /// Paused on the engine
    Paused,
    /// Failed on the engine
    Error,
    /// Any other status string the engine reports
    Other(String),
}

impl TaskStatus {
    /// Whether this status ends polling
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Stopped | TaskStatus::Paused | TaskStatus::Error
        )
    }
}

impl From<&str> for TaskStatus {
    fn from(status: &str) -> Self {
        match status {
            "work" | "working" | "running" | "starting" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "stopped" => TaskStatus::Stopped,
            "paused" => TaskStatus::Paused,
            "error" => TaskStatus::Error,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Stopped => write!(f, "stopped"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Error => write!(f, "error"),
            TaskStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Status transition requested from the engine via changeTaskStatus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskTransition {
    /// Start or resume the task
    Starting,
    /// Pause the task
    Pausing,
    /// Stop the task
    Stopping,
    /// Delete the task and its state
    Deleting,
}

impl TaskTransition {
    /// Wire value expected by the engine
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskTransition::Starting => "starting",
            TaskTransition::Pausing => "pausing",
            TaskTransition::Stopping => "stopping",
            TaskTransition::Deleting => "deleting",
        }
    }
}

impl std::fmt::Display for TaskTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named unit of recurring work
///
/// Pairs a query source (a text file named after the preset) with the
/// engine-side parser that collects records for it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Preset {
    /// Preset name, also the query file stem and the result path component
    pub name: String,
    /// Engine parser identifier (e.g., "JS::Order::2571")
    pub parser: String,
    /// Whether result sanitization also strips literal null placeholder tokens
    #[serde(default)]
    pub strip_null_tokens: bool,
}

impl Preset {
    /// Create a preset with null-token stripping disabled
    pub fn new(name: impl Into<String>, parser: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parser: parser.into(),
            strip_null_tokens: false,
        }
    }

    /// Enable the null-token stripping sanitization variant
    pub fn with_null_stripping(mut self) -> Self {
        self.strip_null_tokens = true;
        self
    }
}

/// One record from a sanitized result payload
///
/// Only the fields the exclusion tracker needs are modeled; the engine
/// attaches more and they pass through untouched in the forwarded text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Record identifier, accepted as a JSON string or number
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// Region the record belongs to
    pub region: String,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(id) => id.to_string(),
        Raw::Text(s) => s,
    })
}

/// Per-region count of newly recorded identifiers from one extraction pass
pub type RegionCounts = BTreeMap<String, usize>;

/// Worker loop stage, used in logs, events, and failure dispositions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the preset's query file
    LoadQueries,
    /// Submitting the collection task to the engine
    Submit,
    /// Polling the task until a terminal status
    Poll,
    /// Downloading and sanitizing the result file
    Fetch,
    /// Updating the exclusion set from the results
    Extract,
    /// Posting the results downstream
    Forward,
}

impl Stage {
    /// Stable lowercase name for logs and report files
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadQueries => "load_queries",
            Stage::Submit => "submit",
            Stage::Poll => "poll",
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Forward => "forward",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic record of a failed cycle
///
/// Created by the worker on failure and handed to the report sink. Carries
/// whatever context the cycle had accumulated before it failed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    /// Preset whose cycle failed
    pub preset: String,

    /// Task in flight when the failure happened, if one had been submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,

    /// Last raw result text seen before the failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,

    /// Error description
    pub error: String,

    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

impl Report {
    /// Create a report stamped with the current time
    pub fn new(preset: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            preset: preset.into(),
            task: None,
            raw_payload: None,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the task that was in flight
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Attach the last raw result text
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.raw_payload = Some(payload.into());
        self
    }
}

/// Event emitted during the relay lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A collection task was accepted by the engine
    TaskSubmitted {
        /// Preset the task belongs to
        preset: String,
        /// Engine task identifier
        task: TaskId,
    },

    /// A collection task reached the completed status
    TaskCompleted {
        /// Preset the task belongs to
        preset: String,
        /// Engine task identifier
        task: TaskId,
    },

    /// New identifiers were recorded in a region's exclusion set
    NewExclusions {
        /// Preset the records belong to
        preset: String,
        /// Region the identifiers were recorded under
        region: String,
        /// Number of identifiers not seen before
        count: usize,
    },

    /// A sanitized result payload was delivered downstream
    ResultsForwarded {
        /// Preset the results belong to
        preset: String,
        /// Size of the forwarded body in bytes
        bytes: usize,
    },

    /// A cycle failed and will restart
    CycleFailed {
        /// Preset whose cycle failed
        preset: String,
        /// Stage the failure occurred in
        stage: Stage,
        /// Error description
        error: String,
    },
}
