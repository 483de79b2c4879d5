//! Session management.

use crate::functions::FunctionRegistry;
use crate::history::History;
use crate::model::{ModelEndpoint, Part, Role};
use crate::recorder::Recorder;
use crate::tool_loop::{LoopConfig, LoopOutcome, ToolLoop};
use crate::Result;
use journal::{EventStore, SessionId};
use std::sync::Arc;

/// A conversation with one model and one set of callable functions.
pub struct Session<M> {
    pub id: SessionId,
    endpoint: M,
    registry: FunctionRegistry,
    config: LoopConfig,
    history: History,
    recorder: Recorder,
}

impl<M: ModelEndpoint> Session<M> {
    pub fn new(endpoint: M, registry: FunctionRegistry) -> Self {
        Self {
            id: SessionId::new(),
            endpoint,
            registry,
            config: LoopConfig::default(),
            history: History::new(),
            recorder: Recorder::disabled(),
        }
    }

    /// Journal this session to `store`, starting with a session start event.
    pub fn with_journal(mut self, store: Arc<EventStore>) -> Result<Self> {
        self.recorder = Recorder::new(store, self.id);
        self.recorder.session_start()?;
        Ok(self)
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.history.set_system(system);
        self
    }

    /// Replace the system prompt mid-conversation.
    pub fn set_system(&mut self, system: impl Into<String>) {
        self.history.set_system(system);
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Drop the conversation so far, keeping the system prompt.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Send a user message and get the assistant's final answer.
    pub async fn chat(&mut self, user_input: &str) -> Result<String> {
        self.history.append_user(user_input);
        self.recorder.message(Role::User, user_input)?;
        Ok(self.run_loop().await?.text)
    }

    /// Send a user turn of text and images.
    ///
    /// Fails without touching the history if `parts` holds call or result
    /// parts.
    pub async fn send(&mut self, parts: Vec<Part>) -> Result<LoopOutcome> {
        let text: String = parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        self.history.append_user_parts(parts)?;
        self.recorder.message(Role::User, &text)?;
        self.run_loop().await
    }

    async fn run_loop(&mut self) -> Result<LoopOutcome> {
        ToolLoop::new(&self.endpoint, &self.registry, &self.config)
            .with_recorder(self.recorder.clone())
            .run(&mut self.history)
            .await
    }

    /// End the session.
    pub fn end(self) -> Result<()> {
        self.recorder.session_end()
    }
}
