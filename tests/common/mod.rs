//! Common test utilities for relay integration tests

#![allow(dead_code)]

use scrape_relay::{Config, Event};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Successful engine envelope around `data`
pub fn engine_reply(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": 1, "data": data}))
}

/// Rejection envelope with a diagnostic body
pub fn engine_rejection(reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": 0, "data": reason}))
}

/// Mount the handshake every scenario needs
pub async fn mount_ping(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/API"))
        .and(body_partial_json(json!({"action": "ping"})))
        .respond_with(engine_reply(json!("pong")))
        .mount(server)
        .await;
}

/// Create a queries directory holding one file per preset
pub async fn queries_dir(presets: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (preset, queries) in presets {
        tokio::fs::write(dir.path().join(format!("{preset}.txt")), queries)
            .await
            .expect("write query file");
    }
    dir
}

/// Relay config pointed at the mock engine, with fast test timings
pub fn test_config(engine: &MockServer, remote: Option<String>, queries_dir: &Path) -> Config {
    let mut config = Config::parse(&format!("url: {}/API\npass: secret\n", engine.uri()))
        .expect("parse config");
    config.remote_url = remote;
    config.queries_dir = queries_dir.to_path_buf();
    config.timing.poll_interval = Duration::from_millis(5);
    config.timing.submit_backoff = Duration::from_millis(5);
    config
}

/// Wait for the first event satisfying `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => {
                    return Some(event);
                }
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await;

    result.ok().flatten()
}

/// Collect all events until timeout or the stop predicate is satisfied
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop_predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Requests the engine mock saw for a given action, parsed as JSON
pub async fn engine_calls(server: &MockServer, action: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
        .filter(|body| body["action"] == action)
        .collect()
}
