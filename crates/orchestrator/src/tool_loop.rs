//! Synchronous multi-turn function calling.
//!
//! One round trip sends the history to the model. A plain text answer ends
//! the loop; a batch of calls is dispatched concurrently, written back in the
//! order the model issued it, and the history is sent again.

use crate::functions::FunctionRegistry;
use crate::history::History;
use crate::model::{
    FunctionCall, FunctionResult, GenerationConfig, ModelEndpoint, ModelRequest, Role,
    ToolOutcome, Usage,
};
use crate::pending::PendingBatch;
use crate::recorder::Recorder;
use crate::{Error, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Round trips allowed when nothing else is configured.
pub const DEFAULT_MAX_ROUND_TRIPS: usize = 10;

/// What to do with resolved call/result pairs once a final answer arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compaction {
    /// Drop every call turn together with the result turn answering it.
    #[default]
    Resolved,
    /// Leave the history untouched.
    Keep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub max_round_trips: usize,
    pub generation: Option<GenerationConfig>,
    pub compaction: Compaction,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            generation: None,
            compaction: Compaction::default(),
        }
    }
}

impl LoopConfig {
    pub fn with_max_round_trips(mut self, max_round_trips: usize) -> Self {
        self.max_round_trips = max_round_trips;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_compaction(mut self, compaction: Compaction) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_round_trips == 0 {
            return Err(Error::Config("max_round_trips must be at least 1".into()));
        }
        Ok(())
    }
}

/// Summary of a finished loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// The model's final text answer.
    pub text: String,
    /// Model requests made, including the one that produced the answer.
    pub round_trips: usize,
    pub usage: Usage,
    /// Turns removed by compaction.
    pub compacted: usize,
}

/// Drives a model and a function registry until the model answers in text.
pub struct ToolLoop<'a, M> {
    endpoint: &'a M,
    registry: &'a FunctionRegistry,
    config: &'a LoopConfig,
    recorder: Recorder,
}

impl<'a, M: ModelEndpoint> ToolLoop<'a, M> {
    pub fn new(endpoint: &'a M, registry: &'a FunctionRegistry, config: &'a LoopConfig) -> Self {
        Self {
            endpoint,
            registry,
            config,
            recorder: Recorder::disabled(),
        }
    }

    /// Journal calls, results, the final answer and compactions.
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Run until the model answers in text.
    ///
    /// The caller appends the user turn beforehand. On success the answer is
    /// the last turn of `history`. On error, batches completed so far stay in
    /// the history and nothing is compacted.
    pub async fn run(&self, history: &mut History) -> Result<LoopOutcome> {
        self.config.validate()?;
        let limit = self.config.max_round_trips;
        let mut usage = Usage::default();
        let mut round_trips = 0;

        loop {
            round_trips += 1;
            let response = {
                let snapshot = history.snapshot();
                let system = snapshot.system().map(|turn| turn.text());
                let request = ModelRequest {
                    system: system.as_deref(),
                    turns: snapshot.turns(),
                    generation: self.config.generation.as_ref(),
                    functions: self.registry.descriptors(),
                };
                debug!(
                    round_trip = round_trips,
                    turns = request.turns.len(),
                    "requesting model"
                );
                self.endpoint.generate(request).await?
            };
            usage += response.usage;

            let mut calls: Vec<FunctionCall> =
                response.turn.function_calls().into_iter().cloned().collect();

            if calls.is_empty() {
                let text = response.turn.text();
                history.append_assistant(text.clone());
                self.recorder.message(Role::Assistant, &text)?;

                let compacted = match self.config.compaction {
                    Compaction::Resolved => history.compact_resolved_calls(),
                    Compaction::Keep => 0,
                };
                if compacted > 0 {
                    self.recorder.compacted(compacted)?;
                }
                info!(
                    round_trips,
                    compacted,
                    tokens = usage.total_tokens(),
                    "model answered"
                );
                return Ok(LoopOutcome {
                    text,
                    round_trips,
                    usage,
                    compacted,
                });
            }

            if round_trips >= limit {
                warn!(
                    limit,
                    pending = calls.len(),
                    "round trip limit reached with calls outstanding"
                );
                return Err(Error::LoopLimitExceeded { limit });
            }

            assign_call_ids(&mut calls, round_trips);

            let results = self.dispatch_batch(&calls).await?;
            history.append_call_batch(calls, results.clone())?;
            // The batch is in the history; journal failures past here only warn.
            for result in &results {
                if let Err(e) = self.recorder.function_result(result) {
                    warn!(
                        call_id = %result.call_id,
                        error = %e,
                        "failed to journal result"
                    );
                }
            }
        }
    }

    /// Dispatch each distinct call once, all at the same time, and return
    /// one result per call in `calls` order.
    async fn dispatch_batch(&self, calls: &[FunctionCall]) -> Result<Vec<FunctionResult>> {
        let batch = PendingBatch::new(calls, |call| call.id.as_str());
        debug!(calls = calls.len(), distinct = batch.len(), "dispatching batch");

        for pending in batch.iter() {
            self.recorder.function_call(&pending.call)?;
        }

        let outputs =
            join_all(batch.iter().map(|pending| self.registry.dispatch(&pending.call))).await;

        let mut outcomes = Vec::with_capacity(batch.len());
        for (pending, output) in batch.iter().zip(outputs) {
            outcomes.push(match output {
                Ok(value) => ToolOutcome::success(value),
                Err(e) => {
                    warn!(
                        function = %pending.call.name,
                        call_id = %pending.id,
                        error = %e,
                        "call failed"
                    );
                    ToolOutcome::error(e.to_string())
                }
            });
        }

        Ok(batch
            .resolve(outcomes)
            .into_iter()
            .zip(calls)
            .map(|(outcome, call)| FunctionResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                outcome,
            })
            .collect())
    }
}

/// Give every call without an id one of the form `call_<round>_<index>`,
/// skipping ids the model already used in this batch.
fn assign_call_ids(calls: &mut [FunctionCall], round: usize) {
    let mut taken: HashSet<String> = calls
        .iter()
        .filter(|call| !call.id.is_empty())
        .map(|call| call.id.clone())
        .collect();

    for (index, call) in calls.iter_mut().enumerate() {
        if !call.id.is_empty() {
            continue;
        }
        let base = format!("call_{round}_{index}");
        let mut id = base.clone();
        let mut suffix = 1;
        while taken.contains(&id) {
            id = format!("{base}_{suffix}");
            suffix += 1;
        }
        taken.insert(id.clone());
        call.id = id;
    }
}
