//! Typed task configuration for the engine's addTask call
//!
//! The engine accepts a large flat options object. Everything here is fixed
//! except the parser entry, the duplicate-suppression override, the result
//! file path, and the query list. Field names follow the engine's wire
//! casing.

use crate::types::Preset;
use serde::{Deserialize, Serialize};

/// Retry-count override applied to every submitted parser
pub const PROXY_RETRIES: &str = "20";

/// One option override inside a parser entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParserOverride {
    /// Always "override"
    #[serde(rename = "type")]
    pub kind: String,
    /// Engine option identifier
    pub id: String,
    /// Option value, transmitted as text
    pub value: String,
}

impl ParserOverride {
    /// Create an override entry for an engine option
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: "override".to_string(),
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Parser entry: parser id, parser preset, then option overrides
pub type ParserEntry = (String, String, ParserOverride, ParserOverride);

/// Iterator behavior flags, all disabled
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IteratorOptions {
    /// Apply the iterator on all query levels
    pub on_all_levels: bool,
    /// Run query builders after the iterator
    pub query_builders_after_iterator: bool,
    /// Run query builders on all levels
    pub query_builders_on_all_levels: bool,
}

/// Result file writer flags
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResultsOptions {
    /// Overwrite an existing result file
    pub overwrite: bool,
    /// Prefix the file with a byte order mark
    #[serde(rename = "writeBOM")]
    pub write_bom: bool,
}

/// Full addTask payload
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Engine-side config preset, always "default"
    pub config_preset: String,
    /// Single parser entry with retry and duplicate-suppression overrides
    pub parsers: Vec<ParserEntry>,
    /// Result line template
    pub results_format: String,
    /// Results destination, always "file"
    pub results_save_to: String,
    /// Result file path, namespaced by preset and a date token
    pub results_file_name: String,
    /// Extra output formats, unused
    pub additional_formats: Vec<String>,
    /// Engine-side result dedup, disabled in favor of the exclusion override
    pub results_unique: String,
    /// Query source kind, always inline "text"
    pub queries_from: String,
    /// Query line template
    pub query_format: Vec<String>,
    /// Engine-side query dedup, disabled
    pub unique_queries: bool,
    /// Keep failed queries for resubmission, disabled
    pub save_failed_queries: bool,
    /// Iterator behavior flags
    pub iterator_options: IteratorOptions,
    /// Result file writer flags
    pub results_options: ResultsOptions,
    /// Engine-side task log retention, present only when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_log: Option<String>,
    /// Log line cap when logging is enabled
    pub limit_logs_count: u32,
    /// Legacy dedup toggle, always "No"
    pub keep_unique: String,
    /// Expose extended options to the engine
    pub more_options: bool,
    /// Text written before the first result
    pub results_prepend: String,
    /// Text written after the last result
    pub results_append: String,
    /// Query builder chain, unused
    pub query_builders: Vec<serde_json::Value>,
    /// Result builder chain, unused
    pub results_builders: Vec<serde_json::Value>,
    /// Config override chain, unused
    pub config_overrides: Vec<serde_json::Value>,
    /// Follow-up task, never scheduled
    pub run_task_on_complete: Option<u64>,
    /// Reuse the result file as the next query source, disabled
    pub use_results_file_as_queries_file: bool,
    /// Config preset for the follow-up task
    pub run_task_on_complete_config: String,
    /// Inline tools script, empty
    #[serde(rename = "toolsJS")]
    pub tools_js: String,
    /// Task priority
    pub prio: u32,
    /// Drop the task from the engine list after completion, disabled
    pub remove_on_complete: bool,
    /// Completion callback URL, empty
    #[serde(rename = "callURLOnComplete")]
    pub call_url_on_complete: String,
    /// Query list, one entry per line of the preset's query file
    pub queries: Vec<String>,
}

impl TaskRequest {
    /// Build the payload for one collection cycle
    ///
    /// `duplicate_override` is the serialized exclusion set and
    /// `task_logging` switches the engine's database log retention on.
    pub fn new(
        preset: &Preset,
        parser_preset: &str,
        output_namespace: &str,
        duplicate_override: String,
        queries: Vec<String>,
        task_logging: bool,
    ) -> Self {
        Self {
            config_preset: "default".to_string(),
            parsers: vec![(
                preset.parser.clone(),
                parser_preset.to_string(),
                ParserOverride::new("proxyretries", PROXY_RETRIES),
                ParserOverride::new("duplicate", duplicate_override),
            )],
            results_format: "$p1.preset".to_string(),
            results_save_to: "file".to_string(),
            results_file_name: format!(
                "{output_namespace}/{}/$datefile.format().json",
                preset.name
            ),
            additional_formats: Vec::new(),
            results_unique: "no".to_string(),
            queries_from: "text".to_string(),
            query_format: vec!["$query".to_string()],
            unique_queries: false,
            save_failed_queries: false,
            iterator_options: IteratorOptions::default(),
            results_options: ResultsOptions::default(),
            do_log: task_logging.then(|| "db".to_string()),
            limit_logs_count: 0,
            keep_unique: "No".to_string(),
            more_options: true,
            results_prepend: "[".to_string(),
            results_append: "]".to_string(),
            query_builders: Vec::new(),
            results_builders: Vec::new(),
            config_overrides: Vec::new(),
            run_task_on_complete: None,
            use_results_file_as_queries_file: false,
            run_task_on_complete_config: "default".to_string(),
            tools_js: String::new(),
            prio: 5,
            remove_on_complete: false,
            call_url_on_complete: String::new(),
            queries,
        }
    }
}
