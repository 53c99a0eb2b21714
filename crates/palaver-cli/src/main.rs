//! palaver - terminal chat client for a conversational-agent session proxy

mod commands;
mod config;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use palaver_format::MessageFormatter;
use palaver_gateway::HttpGateway;
use palaver_session::{
    EventBus, FileHistoryStore, HistoryStore, SessionOrchestrator, SessionPhase,
};

use crate::commands::CommandResult;
use crate::ui::Terminal;

/// palaver - chat with a hosted conversational agent
#[derive(Parser, Debug)]
#[command(name = "palaver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session proxy base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token for the session proxy
    #[arg(long)]
    api_key: Option<String>,

    /// Opening message sent invisibly so the agent greets first
    #[arg(long)]
    greeting: Option<String>,

    /// Do not send an opening message
    #[arg(long, conflicts_with = "greeting")]
    no_greeting: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// List saved conversations
    #[arg(long)]
    sessions: bool,

    /// Print a saved conversation
    #[arg(long, value_name = "ID")]
    show: Option<String>,

    /// Export a saved conversation as HTML
    #[arg(long, value_name = "ID")]
    export: Option<String>,

    /// Output file for --export (default: stdout)
    #[arg(short, long, requires = "export")]
    output: Option<PathBuf>,

    /// Delete a saved conversation
    #[arg(long, value_name = "ID")]
    delete: Option<String>,

    /// Delete all saved conversations
    #[arg(long)]
    clear_history: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("palaver=debug,palaver_session=debug,palaver_gateway=debug")
    } else if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        let path = config::Config::init().context("Error creating config")?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = config::Config::load();
    let history = Arc::new(FileHistoryStore::new(cfg.history_path()));

    let formatter = match cfg.booking_pattern.as_deref() {
        Some(pattern) => MessageFormatter::with_booking_pattern(pattern)
            .context("Invalid booking_pattern in config")?,
        None => MessageFormatter::new(),
    };
    let terminal = Arc::new(Terminal::new(formatter));

    // History management commands
    if args.sessions {
        return list_sessions(history.as_ref());
    }
    if let Some(id) = args.show {
        return show_session(history.as_ref(), &terminal, &id);
    }
    if let Some(id) = args.export {
        return export_session(history.as_ref(), terminal.formatter(), &id, args.output);
    }
    if let Some(id) = args.delete {
        if history.delete_session(&id)? {
            println!("Deleted conversation {}", id);
        } else {
            bail!("No saved conversation with id {}", id);
        }
        return Ok(());
    }
    if args.clear_history {
        history.clear_all()?;
        println!("Cleared all saved conversations.");
        return Ok(());
    }

    // Merge config with CLI args (CLI takes precedence)
    let mut gateway_config = cfg.gateway_config();
    if let Some(base_url) = args.base_url {
        gateway_config.base_url = base_url;
    }
    if let Some(api_key) = args.api_key {
        gateway_config.api_key = Some(api_key);
    }
    let gateway = HttpGateway::new(gateway_config).context("Invalid gateway configuration")?;

    let greeting = if args.no_greeting {
        None
    } else {
        args.greeting
            .or(cfg.greeting.clone())
            .or_else(|| Some(config::DEFAULT_GREETING.to_string()))
            .filter(|g| !g.trim().is_empty())
    };

    let orchestrator = SessionOrchestrator::new(
        cfg.session_config(),
        Arc::new(gateway),
        Arc::clone(&history) as Arc<dyn HistoryStore>,
        EventBus::new(),
    );

    run_interactive(&orchestrator, history.as_ref(), terminal, greeting.as_deref()).await
}

/// Open a session and, if configured, send the silent greeting
async fn start_conversation(
    orchestrator: &SessionOrchestrator,
    terminal: &Terminal,
    greeting: Option<&str>,
) -> bool {
    // Failures are announced on the event bus
    if orchestrator.start_session(false).await.is_err() {
        return false;
    }
    if let Some(greeting) = greeting {
        terminal.show_typing();
        let _ = orchestrator.send(greeting, true).await;
        terminal.clear_typing();
    }
    true
}

async fn run_interactive(
    orchestrator: &SessionOrchestrator,
    history: &dyn HistoryStore,
    terminal: Arc<Terminal>,
    greeting: Option<&str>,
) -> anyhow::Result<()> {
    let printer = ui::attach(orchestrator.event_bus(), Arc::clone(&terminal));

    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("palaver (type /help for commands)");
        eprintln!();
    }

    start_conversation(orchestrator, &terminal, greeting).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        terminal.prompt();

        let Some(line) = lines.next_line().await? else {
            // EOF
            println!();
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, orchestrator, history) {
            match result {
                CommandResult::NewConversation => {
                    orchestrator.reset_for_new_conversation();
                    println!("Starting a new conversation.");
                    start_conversation(orchestrator, &terminal, greeting).await;
                }
                CommandResult::EndSession => {
                    if !orchestrator.is_active() {
                        println!("No active conversation.");
                    } else {
                        let _ = orchestrator.end_session().await;
                    }
                }
                CommandResult::Message(msg) => println!("{}", msg),
                CommandResult::Exit => break,
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            continue;
        }

        match orchestrator.phase() {
            SessionPhase::Ended => {
                println!("The conversation has ended. Type /new to start a new one.");
                continue;
            }
            SessionPhase::Idle => {
                // The first attempt to connect failed; retry before sending
                if !start_conversation(orchestrator, &terminal, None).await {
                    continue;
                }
            }
            SessionPhase::Creating | SessionPhase::Active => {}
        }

        terminal.show_typing();
        let _ = orchestrator.send(input, false).await;
        terminal.clear_typing();
    }

    if orchestrator.is_active() {
        orchestrator.save_snapshot();
    }
    printer.unsubscribe();
    Ok(())
}

fn list_sessions(history: &FileHistoryStore) -> anyhow::Result<()> {
    let entries = history.list_sessions()?;
    if entries.is_empty() {
        println!("No saved conversations found.");
        println!(
            "Conversations are stored in: {}",
            history.path().display()
        );
    } else {
        println!("Saved conversations:\n");
        println!("{}", commands::format_entries(&entries));
        println!("\nShow one with: palaver --show <id>");
    }
    Ok(())
}

fn show_session(history: &dyn HistoryStore, terminal: &Terminal, id: &str) -> anyhow::Result<()> {
    let Some(entry) = history.get_session(id)? else {
        bail!("No saved conversation with id {}", id);
    };

    println!(
        "Conversation {} ({})\n",
        ui::sanitize(&entry.id),
        entry.timestamp_display()
    );
    for message in &entry.messages {
        println!("{}", terminal.render_message(message));
    }
    if !entry.variables.is_empty() {
        println!();
        if let CommandResult::Message(vars) = commands::VarsCommand::execute(&entry.variables) {
            println!("{}", vars);
        }
    }
    Ok(())
}

fn export_session(
    history: &dyn HistoryStore,
    formatter: &MessageFormatter,
    id: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let Some(entry) = history.get_session(id)? else {
        bail!("No saved conversation with id {}", id);
    };

    let title = format!("Conversation {} ({})", entry.id, entry.timestamp_display());
    let html = formatter.render_transcript(&title, &entry.messages);

    match output {
        Some(path) => {
            std::fs::write(&path, html)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported conversation {} to {}", id, path.display());
        }
        None => print!("{}", html),
    }
    Ok(())
}
