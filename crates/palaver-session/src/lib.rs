//! palaver-session: chat session lifecycle
//!
//! This crate owns the live conversation: it creates and ends remote sessions
//! through a [`palaver_gateway::SessionGateway`], reconciles replies and
//! end-of-chat signals with local state, announces every change on an
//! [`EventBus`], and archives finished conversations to a [`HistoryStore`].

pub mod bus;
pub mod error;
pub mod events;
pub mod history;
pub mod message;
pub mod orchestrator;
pub mod state;

pub use bus::{EventBus, HandlerId, Subscription};
pub use error::{Error, Result};
pub use events::{EventKind, SessionEvent};
pub use history::{FileHistoryStore, HistoryEntry, HistoryStore, MemoryHistoryStore};
pub use message::{Message, Role};
pub use orchestrator::{SendOutcome, SessionConfig, SessionOrchestrator, SessionPhase};
pub use state::SessionState;
