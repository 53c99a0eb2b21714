//! Live session state: id, activity flag, messages and variables.
//!
//! A plain container with structural invariants only. Lifecycle rules live in
//! the orchestrator, which is the sole owner of a `SessionState`.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::message::{Message, Role};
use palaver_gateway::Variables;

/// State of the one conversation currently in progress
#[derive(Debug, Default)]
pub struct SessionState {
    id: Option<String>,
    active: bool,
    created_at: Option<Instant>,
    messages: Vec<Message>,
    variables: Variables,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly created remote session
    pub fn init_session(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
        self.active = true;
        self.messages.clear();
        self.created_at = Some(Instant::now());
    }

    /// Append a message to the conversation.
    ///
    /// Callers must have checked that the session is active; this only
    /// enforces that the session is usable at all.
    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> Result<Message> {
        if !self.is_usable() {
            return Err(Error::InvalidState(
                "cannot append a message to an inactive session".to_string(),
            ));
        }

        let mut message = Message::new(role, content);
        // Wall clocks can step backwards; keep conversation order monotonic.
        if let Some(last) = self.messages.last() {
            message.timestamp = message.timestamp.max(last.timestamp);
        }
        self.messages.push(message.clone());
        Ok(message)
    }

    /// Mark the session ended. Returns true if it was active before.
    pub fn mark_ended(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    /// Merge variables, overwriting existing keys
    pub fn merge_variables(&mut self, variables: Variables) {
        self.variables.extend(variables);
    }

    /// Drop all variables. Returns true if there were any.
    pub fn clear_variables(&mut self) -> bool {
        let had_any = !self.variables.is_empty();
        self.variables.clear();
        had_any
    }

    /// Whether messages may be exchanged on this session
    pub fn is_usable(&self) -> bool {
        self.active && self.id.is_some()
    }

    /// Whether the session was created less than `window` ago
    pub fn was_created_within(&self, window: Duration) -> bool {
        self.created_at
            .is_some_and(|created| created.elapsed() < window)
    }

    /// Return to the initial, session-less state
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }
}
