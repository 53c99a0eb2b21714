//! /history command - list saved conversations

use super::CommandResult;
use crate::ui::sanitize;
use palaver_session::{HistoryEntry, HistoryStore};

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn execute(history: &dyn HistoryStore) -> CommandResult {
        match history.list_sessions() {
            Ok(entries) if entries.is_empty() => {
                CommandResult::Message("No saved conversations.".to_string())
            }
            Ok(entries) => CommandResult::Message(format_entries(&entries)),
            Err(e) => CommandResult::Message(format!("Failed to read history: {}", e)),
        }
    }
}

/// Table of history entries, newest first
pub fn format_entries(entries: &[HistoryEntry]) -> String {
    let mut output = format!("{:<38} {:<17} {:<5} Preview\n", "ID", "Saved", "Msgs");
    output.push_str(&"-".repeat(90));
    for entry in entries {
        output.push_str(&format!(
            "\n{:<38} {:<17} {:<5} {}",
            sanitize(&entry.id),
            entry.timestamp_display(),
            entry.messages.len(),
            sanitize(&entry.preview)
        ));
    }
    output
}
