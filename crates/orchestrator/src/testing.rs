//! Scripted endpoints for unit tests.

use crate::model::{EndpointError, ModelEndpoint, ModelRequest, ModelResponse, Turn};
use crate::run::{JobEndpoint, RunRequest, RunSnapshot, ToolOutput};
use journal::EventStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// What a [`ScriptedModel`] was asked.
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub functions: Vec<String>,
}

/// Replays canned responses in order; the last one repeats forever.
pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<ModelResponse>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl ModelEndpoint for ScriptedModel {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, EndpointError> {
        self.seen.lock().unwrap().push(SeenRequest {
            system: request.system.map(str::to_string),
            turns: request.turns.to_vec(),
            functions: request.functions.iter().map(|f| f.name.clone()).collect(),
        });
        next_sticky(&self.script)
            .ok_or_else(|| EndpointError::InvalidResponse("script exhausted".into()))
    }
}

/// Replays run snapshots; each queue's last entry repeats forever.
pub(crate) struct ScriptedJobs {
    created: Mutex<VecDeque<RunSnapshot>>,
    polls: Mutex<VecDeque<RunSnapshot>>,
    submitted: Mutex<VecDeque<RunSnapshot>>,
    create_count: Mutex<usize>,
    poll_count: Mutex<usize>,
    submissions: Mutex<Vec<(String, Vec<ToolOutput>)>>,
}

impl ScriptedJobs {
    pub fn new(polls: Vec<RunSnapshot>) -> Self {
        Self {
            created: Mutex::new(VecDeque::new()),
            polls: Mutex::new(polls.into()),
            submitted: Mutex::new(VecDeque::new()),
            create_count: Mutex::new(0),
            poll_count: Mutex::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn on_create(self, snapshot: RunSnapshot) -> Self {
        self.created.lock().unwrap().push_back(snapshot);
        self
    }

    /// Snapshots returned by successive submissions.
    pub fn on_submit(self, snapshots: Vec<RunSnapshot>) -> Self {
        *self.submitted.lock().unwrap() = snapshots.into();
        self
    }

    pub fn create_count(&self) -> usize {
        *self.create_count.lock().unwrap()
    }

    pub fn poll_count(&self) -> usize {
        *self.poll_count.lock().unwrap()
    }

    pub fn submissions(&self) -> Vec<(String, Vec<ToolOutput>)> {
        self.submissions.lock().unwrap().clone()
    }
}

impl JobEndpoint for ScriptedJobs {
    async fn create_run(&self, _request: &RunRequest) -> Result<RunSnapshot, EndpointError> {
        *self.create_count.lock().unwrap() += 1;
        next_sticky(&self.created)
            .ok_or_else(|| EndpointError::InvalidResponse("no create script".into()))
    }

    async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<RunSnapshot, EndpointError> {
        *self.poll_count.lock().unwrap() += 1;
        next_sticky(&self.polls)
            .ok_or_else(|| EndpointError::InvalidResponse("no poll script".into()))
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot, EndpointError> {
        self.submissions
            .lock()
            .unwrap()
            .push((run_id.to_string(), outputs.to_vec()));
        next_sticky(&self.submitted)
            .ok_or_else(|| EndpointError::InvalidResponse("no submit script".into()))
    }
}

fn next_sticky<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// A file-backed journal whose inserts of `kind` events fail. Keep the
/// returned directory alive for as long as the store is used.
pub(crate) fn journal_rejecting(kind: &str) -> (tempfile::TempDir, Arc<EventStore>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");
    let store = Arc::new(EventStore::open(&path).unwrap());
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute_batch(&format!(
            "CREATE TRIGGER reject_{kind} BEFORE INSERT ON events \
             WHEN NEW.kind = '{kind}' \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
        ))
        .unwrap();
    (dir, store)
}
