//! HTTP implementation of the engine protocol
//!
//! Every call is a JSON envelope `{password, action, data}` posted to the
//! API endpoint; replies are `{success, data}`. Result files are fetched with
//! a plain GET against the reference the engine hands back.

use super::{Engine, TaskRequest};
use crate::error::{Error, Result};
use crate::types::{TaskId, TaskStatus, TaskTransition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

/// Engine client speaking the HTTP protocol
#[derive(Clone, Debug)]
pub struct HttpEngine {
    endpoint: Url,
    password: String,
    client: reqwest::Client,
}

/// Parsed `{success, data}` reply with the raw body kept for diagnostics
#[derive(Debug)]
struct EngineReply {
    success: bool,
    data: serde_json::Value,
    raw: String,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default, deserialize_with = "success_from_number_or_bool")]
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
}

// Engine versions answer success as 1/0 or true/false.
fn success_from_number_or_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Number(n) => n != 0,
    })
}

#[derive(Debug, Deserialize)]
struct TaskStateReply {
    status: String,
}

impl HttpEngine {
    /// Create a client for the given API endpoint
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the endpoint is not a valid URL.
    pub fn new(endpoint: &str, password: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| Error::Config {
            message: format!("invalid engine url '{endpoint}': {e}"),
            key: Some("url".to_string()),
        })?;

        Ok(Self {
            endpoint,
            password: password.into(),
            client: reqwest::Client::new(),
        })
    }

    async fn call<T: Serialize + ?Sized>(&self, action: &str, data: &T) -> Result<EngineReply> {
        let envelope = json!({
            "password": self.password,
            "action": action,
            "data": data,
        });

        debug!(action = %action, "engine call");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(Error::Engine(format!(
                "{action} returned status {status}: {raw}"
            )));
        }

        let parsed: RawReply = serde_json::from_str(&raw)
            .map_err(|e| Error::Engine(format!("{action} reply is not valid JSON: {e}")))?;

        Ok(EngineReply {
            success: parsed.success,
            data: parsed.data,
            raw,
        })
    }
}

#[async_trait]
impl Engine for HttpEngine {
    async fn ping(&self) -> Result<String> {
        let reply = self.call("ping", &json!({})).await?;
        reply
            .data
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Engine(format!("ping reply carried no text: {}", reply.raw)))
    }

    async fn add_task(&self, request: &TaskRequest) -> Result<TaskId> {
        let reply = self.call("addTask", request).await?;
        if !reply.success {
            return Err(Error::Submission {
                response: reply.raw,
            });
        }

        serde_json::from_value(reply.data)
            .map_err(|e| Error::Engine(format!("addTask reply has no task id: {e}")))
    }

    async fn task_status(&self, task: TaskId) -> Result<TaskStatus> {
        let reply = self
            .call("getTaskState", &json!({ "taskUid": task }))
            .await?;
        let state: TaskStateReply = serde_json::from_value(reply.data)
            .map_err(|e| Error::Engine(format!("getTaskState reply has no status: {e}")))?;

        Ok(TaskStatus::from(state.status.as_str()))
    }

    async fn task_results_file(&self, task: TaskId) -> Result<String> {
        let reply = self
            .call("getTaskResultsFile", &json!({ "taskUid": task }))
            .await?;
        reply.data.as_str().map(str::to_string).ok_or_else(|| {
            Error::Engine(format!(
                "getTaskResultsFile reply carried no reference: {}",
                reply.raw
            ))
        })
    }

    async fn change_task_status(&self, task: TaskId, transition: TaskTransition) -> Result<()> {
        let reply = self
            .call(
                "changeTaskStatus",
                &json!({ "taskUid": task, "toStatus": transition.as_str() }),
            )
            .await?;
        if !reply.success {
            return Err(Error::Engine(format!(
                "changeTaskStatus to {transition} rejected: {}",
                reply.raw
            )));
        }
        Ok(())
    }

    async fn download_results(&self, reference: &str) -> Result<String> {
        let url = self.endpoint.join(reference).map_err(|e| {
            Error::Engine(format!("invalid results file reference '{reference}': {e}"))
        })?;

        debug!(url = %url, "downloading results file");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Engine(format!(
                "results download returned status {status}"
            )));
        }

        Ok(response.text().await?)
    }
}
