//! Polling state machine for server-side runs.

use super::types::{JobEndpoint, RunRequest, RunSnapshot, RunState, ToolCall, ToolOutput};
use crate::functions::FunctionRegistry;
use crate::model::{FunctionCall, FunctionResult, ToolOutcome};
use crate::pending::PendingBatch;
use crate::recorder::Recorder;
use crate::{Error, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay between polls when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollConfig {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Drives a run to a terminal state, answering its function calls from a
/// local registry.
///
/// Each call id is dispatched at most once per drive. Outputs for one
/// `requires_action` batch go out in a single submission.
pub struct RunDriver<'a, J> {
    endpoint: &'a J,
    registry: &'a FunctionRegistry,
    poll: PollConfig,
    cancel: CancellationToken,
    recorder: Recorder,
}

impl<'a, J: JobEndpoint> RunDriver<'a, J> {
    pub fn new(endpoint: &'a J, registry: &'a FunctionRegistry) -> Self {
        Self {
            endpoint,
            registry,
            poll: PollConfig::default(),
            cancel: CancellationToken::new(),
            recorder: Recorder::disabled(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Abort the drive with [`Error::Cancelled`] once `token` fires. Only
    /// the local drive stops; the server-side run is left alone.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Create a run and drive it to completion.
    pub async fn start(&self, request: &RunRequest) -> Result<RunSnapshot> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let snapshot = self.endpoint.create_run(request).await?;
        info!(run_id = %snapshot.id, thread_id = %snapshot.thread_id, "run created");
        self.drive(snapshot).await
    }

    /// Fetch an existing run once and drive it from there.
    pub async fn retrieve(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let snapshot = self.endpoint.get_run(thread_id, run_id).await?;
        self.drive(snapshot).await
    }

    /// Drive from an already observed snapshot. Returns the terminal snapshot.
    pub async fn drive(&self, mut snapshot: RunSnapshot) -> Result<RunSnapshot> {
        let mut answered: HashMap<String, String> = HashMap::new();
        let mut last_status = None;

        loop {
            let status = snapshot.state.status();
            if last_status != Some(status) {
                debug!(run_id = %snapshot.id, status, "run status");
                self.recorder.run_status(&snapshot.id, status)?;
                last_status = Some(status);
            }

            if snapshot.state.is_terminal() {
                info!(run_id = %snapshot.id, status, "run finished");
                return Ok(snapshot);
            }

            if let RunState::RequiresAction(calls) = &snapshot.state {
                if calls.iter().any(|call| !answered.contains_key(&call.id)) {
                    let (outputs, results) = self.answer(calls, &mut answered).await?;
                    let call_ids: Vec<String> =
                        outputs.iter().map(|o| o.tool_call_id.clone()).collect();
                    snapshot = self
                        .endpoint
                        .submit_tool_outputs(&snapshot.thread_id, &snapshot.id, &outputs)
                        .await?;
                    // Outputs are submitted; journal failures past here only warn.
                    for result in &results {
                        if let Err(e) = self.recorder.function_result(result) {
                            warn!(
                                call_id = %result.call_id,
                                error = %e,
                                "failed to journal result"
                            );
                        }
                    }
                    if let Err(e) = self.recorder.outputs_submitted(&snapshot.id, call_ids) {
                        warn!(run_id = %snapshot.id, error = %e, "failed to journal submission");
                    }
                    continue;
                }
                // The server has not caught up with our last submission.
                warn!(run_id = %snapshot.id, "requires_action lists only answered calls");
            }

            self.pause().await?;
            snapshot = self
                .endpoint
                .get_run(&snapshot.thread_id, &snapshot.id)
                .await?;
        }
    }

    /// Wait out the poll interval, or fail as soon as the drive is cancelled.
    async fn pause(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {
                info!("run drive cancelled");
                Err(Error::Cancelled)
            }
            _ = tokio::time::sleep(self.poll.interval()) => Ok(()),
        }
    }

    /// Build one output per distinct call id, dispatching only ids not
    /// answered earlier in this drive. Also returns the fresh results for the
    /// journal.
    async fn answer(
        &self,
        calls: &[ToolCall],
        answered: &mut HashMap<String, String>,
    ) -> Result<(Vec<ToolOutput>, Vec<FunctionResult>)> {
        let batch = PendingBatch::new(calls, |call| call.id.as_str());
        let fresh: Vec<_> = batch
            .iter()
            .filter(|pending| !answered.contains_key(&pending.id))
            .collect();
        debug!(calls = batch.len(), fresh = fresh.len(), "answering required action");

        for pending in &fresh {
            let call = &pending.call;
            self.recorder.function_call(&FunctionCall::new(
                call.id.clone(),
                call.function_name.clone(),
                call.arguments().unwrap_or_default(),
            ))?;
        }

        let outcomes = join_all(fresh.iter().map(|pending| self.dispatch(&pending.call))).await;
        let mut results = Vec::with_capacity(fresh.len());
        for (pending, outcome) in fresh.iter().zip(outcomes) {
            answered.insert(pending.id.clone(), outcome.to_text());
            results.push(FunctionResult {
                call_id: pending.id.clone(),
                name: pending.call.function_name.clone(),
                outcome,
            });
        }

        let outputs = batch
            .iter()
            .map(|pending| ToolOutput {
                tool_call_id: pending.id.clone(),
                output: answered.get(&pending.id).cloned().unwrap_or_default(),
            })
            .collect();
        Ok((outputs, results))
    }

    async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let result = match call.to_function_call() {
            Ok(function_call) => self.registry.dispatch(&function_call).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => ToolOutcome::success(value),
            Err(e) => {
                warn!(
                    function = %call.function_name,
                    call_id = %call.id,
                    error = %e,
                    "call failed"
                );
                ToolOutcome::error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{FunctionDescriptor, ToolError, handler_fn};
    use crate::run::RunFailure;
    use crate::testing::{ScriptedJobs, journal_rejecting};
    use journal::{EventStore, SessionId};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FAST: PollConfig = PollConfig { interval_ms: 1 };

    fn snapshot(state: RunState) -> RunSnapshot {
        RunSnapshot::new("run_1", "thread_1", state)
    }

    fn requires(calls: &[(&str, &str)]) -> RunSnapshot {
        snapshot(RunState::RequiresAction(
            calls
                .iter()
                .map(|(id, city)| {
                    ToolCall::new(*id, "get_weather", json!({ "city": city }).to_string())
                })
                .collect(),
        ))
    }

    fn counting_registry(counter: Arc<AtomicUsize>) -> FunctionRegistry {
        FunctionRegistry::new().with_function(
            FunctionDescriptor::new("get_weather", ""),
            handler_fn(move |call: FunctionCall| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let city = call.args["city"].as_str().unwrap_or("?");
                    Ok::<_, ToolError>(json!(format!("18C in {city}")))
                }
            }),
        )
    }

    #[tokio::test]
    async fn completed_on_first_poll_does_nothing_else() {
        let jobs = ScriptedJobs::new(vec![snapshot(RunState::Completed(None))]);
        let registry = FunctionRegistry::new();

        let done = RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();

        assert_eq!(done.state, RunState::Completed(None));
        assert_eq!(jobs.poll_count(), 1);
        assert!(jobs.submissions().is_empty());
    }

    #[tokio::test]
    async fn required_action_gets_one_submission_keyed_by_id() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(Arc::clone(&counter));
        let jobs = ScriptedJobs::new(vec![
            snapshot(RunState::InProgress),
            requires(&[("call_a", "Paris"), ("call_b", "Rome")]),
            snapshot(RunState::Completed(Some("done".into()))),
        ])
        .on_submit(vec![snapshot(RunState::Queued)]);

        let done = RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();

        assert_eq!(done.state, RunState::Completed(Some("done".into())));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        let submissions = jobs.submissions();
        assert_eq!(submissions.len(), 1);
        let (run_id, outputs) = &submissions[0];
        assert_eq!(run_id, "run_1");
        assert_eq!(
            outputs,
            &vec![
                ToolOutput {
                    tool_call_id: "call_a".into(),
                    output: "18C in Paris".into(),
                },
                ToolOutput {
                    tool_call_id: "call_b".into(),
                    output: "18C in Rome".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn stale_required_action_is_not_redispatched() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(Arc::clone(&counter));
        // The submission answers with the same requires_action, and the next
        // poll still shows it before the run moves on.
        let jobs = ScriptedJobs::new(vec![
            requires(&[("call_a", "Paris")]),
            requires(&[("call_a", "Paris")]),
            snapshot(RunState::Completed(None)),
        ])
        .on_submit(vec![requires(&[("call_a", "Paris")])]);

        RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(jobs.submissions().len(), 1);
    }

    #[tokio::test]
    async fn follow_up_action_resubmits_known_outputs_without_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(Arc::clone(&counter));
        let jobs = ScriptedJobs::new(vec![
            requires(&[("call_a", "Paris")]),
            requires(&[("call_a", "Paris"), ("call_b", "Oslo")]),
            snapshot(RunState::Completed(None)),
        ])
        .on_submit(vec![snapshot(RunState::InProgress)]);

        RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        let submissions = jobs.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[1].1[0].output, "18C in Paris");
        assert_eq!(submissions[1].1[1].tool_call_id, "call_b");
    }

    #[tokio::test]
    async fn handler_errors_become_output_text() {
        let registry = FunctionRegistry::new().with_function(
            FunctionDescriptor::new("get_weather", ""),
            handler_fn(|_call| async { Err::<Value, _>(ToolError::execution("station offline")) }),
        );
        let jobs = ScriptedJobs::new(vec![
            snapshot(RunState::RequiresAction(vec![
                ToolCall::new("a", "get_weather", "{}"),
                ToolCall::new("b", "unknown_fn", "{}"),
                ToolCall::new("c", "get_weather", "not json"),
            ])),
            snapshot(RunState::Completed(None)),
        ])
        .on_submit(vec![snapshot(RunState::InProgress)]);

        RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();

        let outputs = &jobs.submissions()[0].1;
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].output, "execution failed: station offline");
        assert_eq!(outputs[1].output, "function not registered: unknown_fn");
        assert!(outputs[2].output.starts_with("invalid arguments"));
    }

    #[tokio::test]
    async fn failed_and_expired_runs_are_returned_not_raised() {
        let registry = FunctionRegistry::new();
        let failure = RunFailure {
            code: "rate_limit_exceeded".into(),
            message: "slow down".into(),
        };
        let jobs = ScriptedJobs::new(vec![snapshot(RunState::Failed(failure.clone()))]);
        let done = RunDriver::new(&jobs, &registry)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();
        assert_eq!(done.state, RunState::Failed(failure));

        let jobs = ScriptedJobs::new(vec![
            snapshot(RunState::Cancelling),
            snapshot(RunState::Expired),
        ]);
        let done = RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();
        assert_eq!(done.state, RunState::Expired);
        assert_eq!(jobs.poll_count(), 2);
    }

    #[tokio::test]
    async fn start_creates_then_drives() {
        let registry = FunctionRegistry::new();
        let jobs = ScriptedJobs::new(vec![snapshot(RunState::Completed(None))])
            .on_create(snapshot(RunState::Queued));

        let done = RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .start(&RunRequest::new("thread_1", "asst_1"))
            .await
            .unwrap();
        assert!(done.state.is_terminal());
        assert_eq!(jobs.poll_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_poll_delay() {
        let registry = FunctionRegistry::new();
        let jobs = ScriptedJobs::new(vec![snapshot(RunState::InProgress)]);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = RunDriver::new(&jobs, &registry)
            .with_poll(PollConfig::every(Duration::from_secs(60)))
            .with_cancellation(token)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(jobs.poll_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_prevents_any_poll() {
        let registry = FunctionRegistry::new();
        let jobs = ScriptedJobs::new(vec![snapshot(RunState::Completed(None))]);
        let token = CancellationToken::new();
        token.cancel();

        let err = RunDriver::new(&jobs, &registry)
            .with_cancellation(token)
            .retrieve("thread_1", "run_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(jobs.poll_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_token_prevents_run_creation() {
        let registry = FunctionRegistry::new();
        let jobs = ScriptedJobs::new(vec![snapshot(RunState::Completed(None))])
            .on_create(snapshot(RunState::Queued));
        let token = CancellationToken::new();
        token.cancel();

        let err = RunDriver::new(&jobs, &registry)
            .with_cancellation(token)
            .start(&RunRequest::new("thread_1", "asst_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(jobs.create_count(), 0);
        assert_eq!(jobs.poll_count(), 0);
    }

    #[tokio::test]
    async fn journal_failure_still_submits_every_output() {
        let (_dir, store) = journal_rejecting("function_result");
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(Arc::clone(&counter));
        let jobs = ScriptedJobs::new(vec![requires(&[("call_a", "Paris"), ("call_b", "Rome")])])
            .on_submit(vec![snapshot(RunState::Completed(None))]);

        let done = RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .with_recorder(Recorder::new(store, SessionId::new()))
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();

        assert_eq!(done.state, RunState::Completed(None));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        let submissions = jobs.submissions();
        assert_eq!(submissions.len(), 1);
        let outputs: Vec<_> = submissions[0]
            .1
            .iter()
            .map(|o| (o.tool_call_id.as_str(), o.output.as_str()))
            .collect();
        assert_eq!(
            outputs,
            [("call_a", "18C in Paris"), ("call_b", "18C in Rome")]
        );
    }

    #[tokio::test]
    async fn status_changes_are_journaled_once_each() {
        let store = Arc::new(EventStore::in_memory().unwrap());
        let session_id = SessionId::new();
        let registry = FunctionRegistry::new();
        let jobs = ScriptedJobs::new(vec![
            snapshot(RunState::Queued),
            snapshot(RunState::InProgress),
            snapshot(RunState::InProgress),
            snapshot(RunState::Completed(None)),
        ]);

        RunDriver::new(&jobs, &registry)
            .with_poll(FAST)
            .with_recorder(Recorder::new(Arc::clone(&store), session_id))
            .retrieve("thread_1", "run_1")
            .await
            .unwrap();

        let statuses: Vec<_> = store
            .load_events(session_id, Some("run_status"))
            .unwrap()
            .into_iter()
            .filter_map(|e| match e.kind {
                journal::EventKind::RunStatus { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, ["queued", "in_progress", "completed"]);
    }
}
