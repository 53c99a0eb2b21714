//! Session event types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use palaver_gateway::Variables;

/// Events published by the session orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A remote session was created and is now active
    SessionCreated { id: String },

    /// A user message was recorded and sent
    MessageSent { message: Message },

    /// An agent reply was recorded
    MessageReceived { message: Message },

    /// The session is over, either by request or because the vendor said so
    SessionEnded { id: String, auto_ended: bool },

    /// An operation failed; the conversation state is unchanged
    Error { message: String },

    /// Variables extracted from a reply were merged into the session
    VariablesUpdated { variables: Variables },

    /// A single variable was set by the application
    VariableUpdated { key: String, value: Value },

    /// All variables were dropped
    VariablesCleared,
}

/// Subscription key: one per [`SessionEvent`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    SessionCreated,
    MessageSent,
    MessageReceived,
    SessionEnded,
    Error,
    VariablesUpdated,
    VariableUpdated,
    VariablesCleared,
}

impl EventKind {
    /// Every event kind, in declaration order
    pub const ALL: [EventKind; 8] = [
        EventKind::SessionCreated,
        EventKind::MessageSent,
        EventKind::MessageReceived,
        EventKind::SessionEnded,
        EventKind::Error,
        EventKind::VariablesUpdated,
        EventKind::VariableUpdated,
        EventKind::VariablesCleared,
    ];

    /// The event's wire name
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SessionCreated => "sessionCreated",
            EventKind::MessageSent => "messageSent",
            EventKind::MessageReceived => "messageReceived",
            EventKind::SessionEnded => "sessionEnded",
            EventKind::Error => "error",
            EventKind::VariablesUpdated => "variablesUpdated",
            EventKind::VariableUpdated => "variableUpdated",
            EventKind::VariablesCleared => "variablesCleared",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SessionEvent {
    /// The kind this event is delivered under
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::SessionCreated { .. } => EventKind::SessionCreated,
            SessionEvent::MessageSent { .. } => EventKind::MessageSent,
            SessionEvent::MessageReceived { .. } => EventKind::MessageReceived,
            SessionEvent::SessionEnded { .. } => EventKind::SessionEnded,
            SessionEvent::Error { .. } => EventKind::Error,
            SessionEvent::VariablesUpdated { .. } => EventKind::VariablesUpdated,
            SessionEvent::VariableUpdated { .. } => EventKind::VariableUpdated,
            SessionEvent::VariablesCleared => EventKind::VariablesCleared,
        }
    }

    /// Build a variables-updated event
    pub fn variables_updated(variables: Variables) -> Self {
        SessionEvent::VariablesUpdated { variables }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_serde_tags() {
        let events = [
            SessionEvent::SessionCreated { id: "a".into() },
            SessionEvent::MessageSent { message: Message::user("hi") },
            SessionEvent::MessageReceived { message: Message::agent("hello") },
            SessionEvent::SessionEnded { id: "a".into(), auto_ended: true },
            SessionEvent::Error { message: "boom".into() },
            SessionEvent::variables_updated(Variables::new()),
            SessionEvent::VariableUpdated { key: "k".into(), value: Value::Bool(true) },
            SessionEvent::VariablesCleared,
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.kind().name());
        }
    }

    #[test]
    fn test_all_kinds_distinct() {
        let names: std::collections::HashSet<_> = EventKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), EventKind::ALL.len());
    }
}
