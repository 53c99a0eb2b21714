//! Slash commands for interactive mode

mod history;
mod vars;

pub use history::{HistoryCommand, format_entries};
pub use vars::VarsCommand;

use palaver_session::{HistoryStore, SessionOrchestrator};

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Archive the conversation and start a new one
    NewConversation,
    /// End the active session
    EndSession,
    /// Show a message to the user (not sent to the agent)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(
    input: &str,
    orchestrator: &SessionOrchestrator,
    history: &dyn HistoryStore,
) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let command = rest.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => CommandResult::NewConversation,

        "end" | "e" => CommandResult::EndSession,

        "vars" | "v" => VarsCommand::execute(&orchestrator.variables()),

        "history" => HistoryCommand::execute(history),

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /new, /n             Archive this conversation and start a new one
  /end, /e             End the conversation
  /vars, /v            Show variables collected by the agent
  /history             List saved conversations
  /quit, /exit, /q     Exit palaver

Past conversations:
  palaver --sessions         List them
  palaver --show <id>        Print one
  palaver --export <id>      Export one as HTML"#
        .to_string()
}
