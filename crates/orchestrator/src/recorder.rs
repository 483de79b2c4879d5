//! Journal hook shared by sessions, the tool loop and the run driver.

use crate::Result;
use crate::model::{FunctionCall, FunctionResult, Role};
use journal::{Event, EventKind, EventStore, SessionId};
use std::sync::Arc;

/// Appends orchestration events to an [`EventStore`], or does nothing when
/// no store is attached.
#[derive(Clone, Default)]
pub struct Recorder {
    target: Option<(Arc<EventStore>, SessionId)>,
}

impl Recorder {
    pub fn new(store: Arc<EventStore>, session_id: SessionId) -> Self {
        Self {
            target: Some((store, session_id)),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.target.as_ref().map(|(_, id)| *id)
    }

    fn append(&self, kind: EventKind) -> Result<()> {
        if let Some((store, session_id)) = &self.target {
            store.append(&Event::new(*session_id, kind))?;
        }
        Ok(())
    }

    pub fn session_start(&self) -> Result<()> {
        self.append(EventKind::SessionStart)
    }

    pub fn session_end(&self) -> Result<()> {
        self.append(EventKind::SessionEnd)
    }

    pub fn message(&self, role: Role, content: &str) -> Result<()> {
        self.append(EventKind::Message {
            role,
            content: content.to_string(),
        })
    }

    pub fn function_call(&self, call: &FunctionCall) -> Result<()> {
        self.append(EventKind::FunctionCall {
            call_id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.args.clone().into(),
        })
    }

    pub fn function_result(&self, result: &FunctionResult) -> Result<()> {
        self.append(EventKind::FunctionResult {
            call_id: result.call_id.clone(),
            name: result.name.clone(),
            output: result.outcome.to_value(),
            is_error: result.outcome.is_error(),
        })
    }

    pub fn compacted(&self, removed_turns: usize) -> Result<()> {
        self.append(EventKind::Compacted { removed_turns })
    }

    pub fn run_status(&self, run_id: &str, status: &str) -> Result<()> {
        self.append(EventKind::RunStatus {
            run_id: run_id.to_string(),
            status: status.to_string(),
        })
    }

    pub fn outputs_submitted(&self, run_id: &str, call_ids: Vec<String>) -> Result<()> {
        self.append(EventKind::ToolOutputsSubmitted {
            run_id: run_id.to_string(),
            call_ids,
        })
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("session_id", &self.session_id())
            .finish()
    }
}
