//! Line-mode terminal presentation

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use palaver_format::{BOOKING_LABEL, MessageFormatter, Segment};
use palaver_session::{EventBus, Message, Role, SessionEvent, Subscription};

const UNDERLINE: &str = "\x1b[4m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Strip C0 and C1 control characters other than newline and tab.
///
/// Remote text must not be able to emit escape sequences of its own.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Render formatter segments for a terminal.
///
/// Control characters are stripped from every segment; links are underlined
/// and booking links become a labelled action.
pub fn render_segments(segments: &[Segment], color: bool) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(&sanitize(text)),
            Segment::Link { url, .. } if color => {
                out.push_str(&format!("{}{}{}", UNDERLINE, sanitize(url), RESET));
            }
            Segment::Link { url, .. } => out.push_str(&sanitize(url)),
            Segment::Booking { url } if color => {
                out.push_str(&format!("{}[{}]{} {}", BOLD, BOOKING_LABEL, RESET, sanitize(url)));
            }
            Segment::Booking { url } => {
                out.push_str(&format!("[{}] {}", BOOKING_LABEL, sanitize(url)));
            }
        }
    }
    out
}

/// Terminal output shared by the input loop and event handlers
pub struct Terminal {
    formatter: MessageFormatter,
    color: bool,
    typing: AtomicBool,
}

impl Terminal {
    pub fn new(formatter: MessageFormatter) -> Self {
        Self {
            formatter,
            color: io::IsTerminal::is_terminal(&io::stdout()),
            typing: AtomicBool::new(false),
        }
    }

    pub fn formatter(&self) -> &MessageFormatter {
        &self.formatter
    }

    /// Render one message as a transcript line
    pub fn render_message(&self, message: &Message) -> String {
        let body = render_segments(&self.formatter.segments(&message.content), self.color);
        let speaker = match message.role {
            Role::User => "you",
            Role::Agent => "agent",
        };
        if self.color {
            format!("{}{}:{} {}", BOLD, speaker, RESET, body)
        } else {
            format!("{}: {}", speaker, body)
        }
    }

    pub fn prompt(&self) {
        print!("> ");
        io::stdout().flush().ok();
    }

    /// Show the typing indicator until the next line of output
    pub fn show_typing(&self) {
        self.typing.store(true, Ordering::Release);
        if self.color {
            print!("{}agent is typing...{}", DIM, RESET);
        } else {
            print!("agent is typing...");
        }
        io::stdout().flush().ok();
    }

    pub fn clear_typing(&self) {
        if self.typing.swap(false, Ordering::AcqRel) {
            if self.color {
                print!("\r\x1b[K");
            } else {
                println!();
            }
            io::stdout().flush().ok();
        }
    }

    pub fn print_agent(&self, message: &Message) {
        self.clear_typing();
        println!("{}", self.render_message(message));
    }

    /// Persistent notice shown when the conversation is over
    pub fn print_ended(&self, auto_ended: bool) {
        self.clear_typing();
        let reason = if auto_ended {
            "The agent ended the conversation."
        } else {
            "Conversation ended."
        };
        if self.color {
            println!("{}-- {} Type /new to start again. --{}", DIM, reason, RESET);
        } else {
            println!("-- {} Type /new to start again. --", reason);
        }
    }

    /// Transient notice; conversation state is unaffected
    pub fn print_error(&self, message: &str) {
        self.clear_typing();
        let message = sanitize(message);
        if self.color {
            eprintln!("{}! {}{}", RED, message, RESET);
        } else {
            eprintln!("! {}", message);
        }
    }
}

/// Print session events as they happen. The returned subscription detaches the printer.
pub fn attach(bus: &EventBus, terminal: Arc<Terminal>) -> Subscription {
    bus.subscribe_all(move |event| match event {
        SessionEvent::MessageReceived { message } => terminal.print_agent(message),
        SessionEvent::SessionEnded { auto_ended, .. } => terminal.print_ended(*auto_ended),
        SessionEvent::Error { message } => terminal.print_error(message),
        SessionEvent::SessionCreated { id } => tracing::debug!("Connected to session {}", id),
        _ => {}
    })
}
