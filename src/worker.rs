//! Per-preset worker loop
//!
//! One worker runs forever per preset, driving the cycle
//! load queries → submit → poll → fetch → extract → forward and starting
//! over. Every failure is caught at the stage where it happened and mapped
//! through an explicit disposition table; nothing escapes the loop except a
//! missing query source, which ends that preset for the rest of the process.
//! Workers are fully independent: each owns its exclusion set and its
//! failures never touch a sibling.

use crate::config::Config;
use crate::error::Error;
use crate::exclusions::ExclusionSet;
use crate::forwarder::Forwarder;
use crate::lifecycle::TaskLifecycle;
use crate::report::ReportSink;
use crate::types::{Event, Preset, Report, Stage, TaskId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What the loop does after a failed cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// End this preset's loop for the rest of the process
    Fatal,
    /// Report, wait the submit backoff, then restart the cycle
    Backoff,
    /// Report and restart the cycle immediately
    Restart,
    /// Restart immediately without a diagnostic report
    RestartQuiet,
}

/// Map a stage failure to what the loop does next
///
/// The policy is a pure function so it can be checked exhaustively: a
/// missing query source is fatal, a rejected submission backs off, an empty
/// result set restarts silently, and everything else restarts with a
/// diagnostic report.
pub fn disposition(stage: Stage, error: &Error) -> Disposition {
    match (stage, error) {
        (Stage::LoadQueries, _) => Disposition::Fatal,
        (_, Error::NoResults { .. }) => Disposition::RestartQuiet,
        (Stage::Submit, _) => Disposition::Backoff,
        _ => Disposition::Restart,
    }
}

fn should_report(disposition: Disposition) -> bool {
    matches!(disposition, Disposition::Backoff | Disposition::Restart)
}

/// Failure caught at a stage boundary, with whatever context the cycle had
struct CycleFailure {
    stage: Stage,
    error: Error,
    task: Option<TaskId>,
    raw_payload: Option<String>,
}

impl CycleFailure {
    fn at(stage: Stage, error: Error) -> Self {
        Self {
            stage,
            error,
            task: None,
            raw_payload: None,
        }
    }
}

/// Infinite state machine for one preset
///
/// Owns the preset's exclusion set for the process lifetime; the set is read
/// at submission and mutated at extraction, never concurrently.
pub struct PresetWorker {
    preset: Preset,
    config: Arc<Config>,
    lifecycle: TaskLifecycle,
    forwarder: Forwarder,
    reporter: Arc<dyn ReportSink>,
    exclusions: ExclusionSet,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
}

impl PresetWorker {
    /// Create a worker with an empty exclusion set
    pub fn new(
        preset: Preset,
        config: Arc<Config>,
        lifecycle: TaskLifecycle,
        forwarder: Forwarder,
        reporter: Arc<dyn ReportSink>,
        event_tx: broadcast::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            preset,
            config,
            lifecycle,
            forwarder,
            reporter,
            exclusions: ExclusionSet::new(),
            event_tx,
            shutdown,
        }
    }

    /// Run cycles until shutdown or a fatal failure
    pub async fn run(mut self) {
        info!(preset = %self.preset.name, "worker started");
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(preset = %self.preset.name, "worker shutting down");
                    break;
                }
                fatal = self.cycle_and_recover() => {
                    if fatal {
                        break;
                    }
                }
            }
        }

        info!(preset = %self.preset.name, "worker stopped");
    }

    async fn cycle_and_recover(&mut self) -> bool {
        match self.run_cycle().await {
            Ok(()) => false,
            Err(failure) => self.handle_failure(failure).await == Disposition::Fatal,
        }
    }

    async fn run_cycle(&mut self) -> Result<(), CycleFailure> {
        let queries = self
            .config
            .load_queries(&self.preset.name)
            .await
            .map_err(|error| CycleFailure::at(Stage::LoadQueries, error))?;
        info!(preset = %self.preset.name, count = queries.len(), "queries loaded");

        let task = self
            .lifecycle
            .submit(&self.preset, queries, &self.exclusions)
            .await
            .map_err(|error| CycleFailure::at(Stage::Submit, error))?;
        info!(preset = %self.preset.name, task = %task, "waiting for task");
        self.emit(Event::TaskSubmitted {
            preset: self.preset.name.clone(),
            task,
        });

        if let Err(error) = self.lifecycle.await_completion(task).await {
            return Err(CycleFailure {
                stage: Stage::Poll,
                error,
                task: Some(task),
                raw_payload: None,
            });
        }
        info!(preset = %self.preset.name, task = %task, "task completed");
        self.emit(Event::TaskCompleted {
            preset: self.preset.name.clone(),
            task,
        });

        info!(preset = %self.preset.name, task = %task, "getting results file");
        let payload = match self
            .lifecycle
            .fetch_result(task, self.preset.strip_null_tokens)
            .await
        {
            Ok(payload) => payload,
            Err(error) => {
                return Err(CycleFailure {
                    stage: Stage::Fetch,
                    error,
                    task: Some(task),
                    raw_payload: None,
                });
            }
        };

        let counts = match self.exclusions.extract(&payload) {
            Ok(counts) => counts,
            Err(error) => {
                return Err(CycleFailure {
                    stage: Stage::Extract,
                    error,
                    task: Some(task),
                    raw_payload: Some(payload),
                });
            }
        };
        for (region, count) in &counts {
            info!(preset = %self.preset.name, region = %region, "Found {count} new items");
            self.emit(Event::NewExclusions {
                preset: self.preset.name.clone(),
                region: region.clone(),
                count: *count,
            });
        }

        let bytes = payload.len();
        if let Err(error) = self.forwarder.forward(&payload).await {
            return Err(CycleFailure {
                stage: Stage::Forward,
                error,
                task: Some(task),
                raw_payload: Some(payload),
            });
        }
        info!(preset = %self.preset.name, bytes, "results forwarded");
        self.emit(Event::ResultsForwarded {
            preset: self.preset.name.clone(),
            bytes,
        });

        Ok(())
    }

    async fn handle_failure(&self, failure: CycleFailure) -> Disposition {
        let CycleFailure {
            stage,
            error,
            task,
            raw_payload,
        } = failure;
        let disposition = disposition(stage, &error);

        if disposition == Disposition::RestartQuiet {
            info!(preset = %self.preset.name, stage = %stage, "{error}");
        } else {
            error!(preset = %self.preset.name, stage = %stage, "{error}");
        }
        self.emit(Event::CycleFailed {
            preset: self.preset.name.clone(),
            stage,
            error: error.to_string(),
        });

        if should_report(disposition) {
            let mut report = Report::new(&self.preset.name, error.to_string());
            if let Some(task) = task {
                report = report.with_task(task);
            }
            if let Some(payload) = raw_payload {
                report = report.with_payload(payload);
            }
            if let Err(e) = self.reporter.record(&report).await {
                warn!(preset = %self.preset.name, error = %e, "could not write failure report");
            }
        }

        if disposition == Disposition::Backoff {
            let backoff = self.config.timing.submit_backoff;
            info!(
                preset = %self.preset.name,
                "waiting {}s before resubmitting",
                backoff.as_secs()
            );
            sleep(backoff).await;
        }

        disposition
    }

    // Nobody listening is fine; events are purely observational.
    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, TaskRequest};
    use crate::error::Result;
    use crate::sanitize::Sanitizer;
    use crate::types::{TaskStatus, TaskTransition};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // --- disposition table ---

    #[test]
    fn missing_queries_are_fatal() {
        let error = Error::QueriesMissing {
            preset: "auto-ru".into(),
            path: "./config/auto-ru.txt".into(),
        };
        assert_eq!(disposition(Stage::LoadQueries, &error), Disposition::Fatal);
    }

    #[test]
    fn rejected_submission_backs_off() {
        let error = Error::Submission {
            response: "{}".into(),
        };
        assert_eq!(disposition(Stage::Submit, &error), Disposition::Backoff);
    }

    #[test]
    fn transport_failure_during_submit_also_backs_off() {
        let error = Error::Engine("addTask reply is not valid JSON".into());
        assert_eq!(disposition(Stage::Submit, &error), Disposition::Backoff);
    }

    #[test]
    fn empty_results_restart_silently() {
        let error = Error::NoResults { task: TaskId(1) };
        assert_eq!(disposition(Stage::Fetch, &error), Disposition::RestartQuiet);
        assert!(!should_report(Disposition::RestartQuiet));
    }

    #[test]
    fn poll_fetch_extract_and_forward_failures_restart_with_a_report() {
        let cases = [
            (Stage::Poll, Error::TaskFailed { task: TaskId(1) }),
            (
                Stage::Poll,
                Error::TaskStopped {
                    task: TaskId(1),
                    status: TaskStatus::Stopped,
                },
            ),
            (Stage::Fetch, Error::Engine("download failed".into())),
            (Stage::Extract, Error::Parse("bad record".into())),
            (Stage::Forward, Error::Forward("no remote url configured".into())),
        ];

        for (stage, error) in cases {
            assert_eq!(
                disposition(stage, &error),
                Disposition::Restart,
                "{stage} / {error} must restart with a report"
            );
            assert!(should_report(Disposition::Restart));
        }
    }

    // --- loop behavior against a scripted engine ---

    /// ReportSink double that remembers every report
    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<Report>>,
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        async fn record(&self, report: &Report) -> Result<()> {
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    /// Engine double that always completes with a fixed result body
    struct HappyEngine {
        body: String,
        reject_submissions: bool,
    }

    #[async_trait]
    impl Engine for HappyEngine {
        async fn ping(&self) -> Result<String> {
            Ok("pong".to_string())
        }

        async fn add_task(&self, _request: &TaskRequest) -> Result<TaskId> {
            if self.reject_submissions {
                return Err(Error::Submission {
                    response: r#"{"success":0}"#.to_string(),
                });
            }
            Ok(TaskId(7))
        }

        async fn task_status(&self, _task: TaskId) -> Result<TaskStatus> {
            Ok(TaskStatus::Completed)
        }

        async fn task_results_file(&self, _task: TaskId) -> Result<String> {
            Ok("/downloadResults?uid=7".to_string())
        }

        async fn change_task_status(&self, _task: TaskId, _t: TaskTransition) -> Result<()> {
            Ok(())
        }

        async fn download_results(&self, _reference: &str) -> Result<String> {
            Ok(self.body.clone())
        }
    }

    struct Harness {
        worker: PresetWorker,
        events: broadcast::Receiver<Event>,
        sink: Arc<RecordingSink>,
        shutdown: CancellationToken,
        _queries_dir: tempfile::TempDir,
    }

    async fn harness(engine: Arc<dyn Engine>, remote: Option<String>) -> Harness {
        let queries_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(queries_dir.path().join("auto-ru.txt"), "bmw x5\n")
            .await
            .unwrap();

        let mut config = Config::parse("url: http://e/API\npass: p\n").unwrap();
        config.queries_dir = queries_dir.path().to_path_buf();
        config.remote_url = remote;
        config.timing.poll_interval = Duration::from_millis(5);
        config.timing.submit_backoff = Duration::from_millis(5);
        let config = Arc::new(config);

        let lifecycle =
            TaskLifecycle::new(engine, config.clone(), Sanitizer::new().unwrap());
        let forwarder = Forwarder::new(config.remote_url.as_deref()).unwrap();
        let sink = Arc::new(RecordingSink::default());
        // The instant engine doubles let the worker burst a full scheduler
        // quantum of cycles (~hundreds of events) before the test task gets
        // to recv, so the channel needs room for that burst or the receiver
        // sees Lagged instead of the event sequence under test.
        let (event_tx, events) = broadcast::channel(8192);
        let shutdown = CancellationToken::new();

        let worker = PresetWorker::new(
            Preset::new("auto-ru", "JS::Order::2571"),
            config,
            lifecycle,
            forwarder,
            sink.clone(),
            event_tx,
            shutdown.clone(),
        );

        Harness {
            worker,
            events,
            sink,
            shutdown,
            _queries_dir: queries_dir,
        }
    }

    async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within deadline")
            .expect("channel open")
    }

    #[tokio::test]
    async fn successful_cycle_emits_the_full_event_sequence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/intake"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let engine = Arc::new(HappyEngine {
            body: r#"[{"id":"1","region":"EU"},{"id":"2","region":"EU"},]"#.to_string(),
            reject_submissions: false,
        });
        let mut h = harness(engine, Some(format!("{}/intake", server.uri()))).await;

        let handle = tokio::spawn(h.worker.run());

        assert!(matches!(
            next_event(&mut h.events).await,
            Event::TaskSubmitted { task, .. } if task == TaskId(7)
        ));
        assert!(matches!(
            next_event(&mut h.events).await,
            Event::TaskCompleted { .. }
        ));
        match next_event(&mut h.events).await {
            Event::NewExclusions {
                region, count, ..
            } => {
                assert_eq!(region, "EU");
                assert_eq!(count, 2);
            }
            other => panic!("expected NewExclusions, got {other:?}"),
        }
        assert!(matches!(
            next_event(&mut h.events).await,
            Event::ResultsForwarded { bytes, .. } if bytes > 0
        ));

        h.shutdown.cancel();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker exits on shutdown")
            .unwrap();
        assert!(h.sink.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_cycle_reports_no_new_items_for_known_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/intake"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let engine = Arc::new(HappyEngine {
            body: r#"[{"id":"1","region":"EU"},]"#.to_string(),
            reject_submissions: false,
        });
        let mut h = harness(engine, Some(format!("{}/intake", server.uri()))).await;

        let handle = tokio::spawn(h.worker.run());

        let mut new_exclusion_counts = Vec::new();
        while new_exclusion_counts.len() < 2 {
            if let Event::NewExclusions { count, .. } = next_event(&mut h.events).await {
                new_exclusion_counts.push(count);
            }
        }

        assert_eq!(new_exclusion_counts, vec![1, 0]);
        h.shutdown.cancel();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker exits on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn missing_query_file_ends_the_worker_without_a_report() {
        let engine = Arc::new(HappyEngine {
            body: "[]".to_string(),
            reject_submissions: false,
        });
        let mut h = harness(engine, None).await;
        tokio::fs::remove_file(h.worker.config.queries_dir.join("auto-ru.txt"))
            .await
            .unwrap();

        let handle = tokio::spawn(h.worker.run());

        assert!(matches!(
            next_event(&mut h.events).await,
            Event::CycleFailed {
                stage: Stage::LoadQueries,
                ..
            }
        ));
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("fatal failure must end the worker on its own")
            .unwrap();
        assert!(h.sink.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_submission_writes_a_report_and_retries() {
        let engine = Arc::new(HappyEngine {
            body: "[]".to_string(),
            reject_submissions: true,
        });
        let mut h = harness(engine, None).await;

        let handle = tokio::spawn(h.worker.run());

        // Two failed cycles prove the backoff loops instead of dying.
        for _ in 0..2 {
            assert!(matches!(
                next_event(&mut h.events).await,
                Event::CycleFailed {
                    stage: Stage::Submit,
                    ..
                }
            ));
        }

        h.shutdown.cancel();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker exits on shutdown")
            .unwrap();

        let reports = h.sink.reports.lock().unwrap();
        assert!(reports.len() >= 2);
        assert!(reports[0].error.contains("task submission rejected"));
        assert!(reports[0].task.is_none());
    }

    #[tokio::test]
    async fn empty_results_restart_without_reporting() {
        let engine = Arc::new(HappyEngine {
            body: "[]".to_string(),
            reject_submissions: false,
        });
        let mut h = harness(engine, None).await;

        let handle = tokio::spawn(h.worker.run());

        let mut fetch_failures = 0;
        while fetch_failures < 2 {
            if let Event::CycleFailed { stage, error, .. } = next_event(&mut h.events).await {
                assert_eq!(stage, Stage::Fetch);
                assert!(error.contains("no results"));
                fetch_failures += 1;
            }
        }

        h.shutdown.cancel();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker exits on shutdown")
            .unwrap();
        assert!(h.sink.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparsable_payload_reports_with_the_raw_text() {
        let engine = Arc::new(HappyEngine {
            body: r#"[{"id":"1"},]"#.to_string(),
            reject_submissions: false,
        });
        let mut h = harness(engine, None).await;

        let handle = tokio::spawn(h.worker.run());

        loop {
            if let Event::CycleFailed { stage, .. } = next_event(&mut h.events).await {
                assert_eq!(stage, Stage::Extract);
                break;
            }
        }

        h.shutdown.cancel();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker exits on shutdown")
            .unwrap();

        let reports = h.sink.reports.lock().unwrap();
        assert!(!reports.is_empty());
        assert_eq!(reports[0].task, Some(TaskId(7)));
        assert_eq!(reports[0].raw_payload.as_deref(), Some(r#"[{"id":"1"}]"#));
    }

    #[tokio::test]
    async fn forward_failure_keeps_the_extracted_exclusions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/intake"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let engine = Arc::new(HappyEngine {
            body: r#"[{"id":"1","region":"EU"},]"#.to_string(),
            reject_submissions: false,
        });
        let mut h = harness(engine, Some(format!("{}/intake", server.uri()))).await;

        let handle = tokio::spawn(h.worker.run());

        // First cycle: extraction succeeds, forwarding fails.
        let mut counts = Vec::new();
        while counts.len() < 2 {
            match next_event(&mut h.events).await {
                Event::NewExclusions { count, .. } => counts.push(count),
                Event::CycleFailed { stage, .. } => assert_eq!(stage, Stage::Forward),
                _ => {}
            }
        }

        // Second cycle still knows the id: the failed forward rolled nothing back.
        assert_eq!(counts, vec![1, 0]);

        h.shutdown.cancel();
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker exits on shutdown")
            .unwrap();
    }
}
