//! Session lifecycle and message exchange.
//!
//! `Idle -> Creating -> Active -> Ended`, with `Ended -> Creating` on restart.
//! The orchestrator is the only owner of the live [`SessionState`]; callers get
//! copies. End-of-chat signals from any source (send response, error body,
//! status check) funnel into one idempotent transition.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use palaver_gateway::{SessionGateway, Variables, compat};

use crate::{
    bus::EventBus,
    error::{Error, Result},
    events::SessionEvent,
    history::HistoryStore,
    message::{Message, Role},
    state::SessionState,
};

/// Orchestrator timing configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause between recording an agent reply and announcing it
    pub reply_delay: Duration,
    /// After creation, status checks are not trusted for this long
    pub grace_window: Duration,
    /// Delay of the status check scheduled after each reply (`None` disables it)
    pub follow_up_poll: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_delay: Duration::ZERO,
            grace_window: Duration::from_millis(2000),
            follow_up_poll: Some(Duration::from_millis(500)),
        }
    }
}

/// Lifecycle phase of the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Creating,
    Active,
    Ended,
}

/// Result of a [`SessionOrchestrator::send`]
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// The agent reply that was recorded, if any
    pub reply: Option<Message>,
    /// Whether the exchange ended the session
    pub ended: bool,
}

struct Live {
    state: SessionState,
    creating: bool,
    force_reset_next_create: bool,
    pending_poll: Option<CancellationToken>,
}

impl Live {
    fn phase(&self) -> SessionPhase {
        if self.creating {
            SessionPhase::Creating
        } else if self.state.is_usable() {
            SessionPhase::Active
        } else if self.state.id().is_some() {
            SessionPhase::Ended
        } else {
            SessionPhase::Idle
        }
    }

    fn cancel_pending_poll(&mut self) {
        if let Some(token) = self.pending_poll.take() {
            token.cancel();
        }
    }

    fn is_current(&self, id: &str) -> bool {
        self.state.is_usable() && self.state.id() == Some(id)
    }

    /// Whether `id` is the tracked session and it has ended
    fn has_ended(&self, id: &str) -> bool {
        self.state.id() == Some(id) && !self.state.is_active()
    }
}

struct Inner {
    config: SessionConfig,
    gateway: Arc<dyn SessionGateway>,
    history: Arc<dyn HistoryStore>,
    bus: EventBus,
    live: Mutex<Live>,
    busy: AtomicBool,
}

/// Releases the in-flight latch on drop
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one conversation against the session gateway.
///
/// Cloning is cheap; all clones share the same session.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    pub fn new(
        config: SessionConfig,
        gateway: Arc<dyn SessionGateway>,
        history: Arc<dyn HistoryStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                gateway,
                history,
                bus,
                live: Mutex::new(Live {
                    state: SessionState::new(),
                    creating: false,
                    force_reset_next_create: false,
                    pending_poll: None,
                }),
                busy: AtomicBool::new(false),
            }),
        }
    }

    // ---- Getters (copies only) ----

    pub fn id(&self) -> Option<String> {
        self.inner.live.lock().state.id().map(str::to_string)
    }

    pub fn is_active(&self) -> bool {
        self.inner.live.lock().state.is_usable()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.live.lock().phase()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.live.lock().state.messages().to_vec()
    }

    pub fn variables(&self) -> Variables {
        self.inner.live.lock().state.variables().clone()
    }

    /// Whether `start_session`, `send` or `end_session` is in flight.
    ///
    /// Presentation code should consult this before issuing another operation.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    pub fn force_reset_next_create(&self) -> bool {
        self.inner.live.lock().force_reset_next_create
    }

    pub fn set_force_reset_next_create(&self, value: bool) {
        self.inner.live.lock().force_reset_next_create = value;
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    // ---- Variables ----

    /// Set one variable and announce it
    pub fn set_variable(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.inner
            .live
            .lock()
            .state
            .set_variable(key.clone(), value.clone());
        self.publish(SessionEvent::VariableUpdated { key, value });
    }

    /// Drop all variables and announce it
    pub fn clear_variables(&self) {
        self.inner.live.lock().state.clear_variables();
        self.publish(SessionEvent::VariablesCleared);
    }

    // ---- Lifecycle ----

    /// Create a remote session and make it the active one.
    ///
    /// Valid from `Idle` or `Ended`. On failure the phase is left as it was.
    pub async fn start_session(&self, force_reset: bool) -> Result<String> {
        let _busy = self.begin()?;

        let force_reset = {
            let mut live = self.inner.live.lock();
            match live.phase() {
                SessionPhase::Idle | SessionPhase::Ended => {}
                phase => {
                    drop(live);
                    return Err(self.fail(Error::InvalidState(format!(
                        "cannot start a session while {:?}",
                        phase
                    ))));
                }
            }
            live.cancel_pending_poll();
            live.creating = true;
            force_reset || live.force_reset_next_create
        };

        let result = self.inner.gateway.create(force_reset).await;

        let mut live = self.inner.live.lock();
        live.creating = false;
        match result {
            Ok(created) => {
                if force_reset {
                    live.force_reset_next_create = false;
                }
                live.state.init_session(created.id.clone());
                let cleared = live.state.clear_variables();
                drop(live);

                tracing::info!("Session {} created (reset_chat={})", created.id, force_reset);
                if cleared {
                    self.publish(SessionEvent::VariablesCleared);
                }
                self.publish(SessionEvent::SessionCreated {
                    id: created.id.clone(),
                });
                Ok(created.id)
            }
            Err(e) => {
                drop(live);
                tracing::warn!("Failed to create session: {}", e);
                Err(self.fail(e.into()))
            }
        }
    }

    /// Send a user utterance and record the agent's reply.
    ///
    /// A `silent` send (used for an invisible bootstrap greeting) does not
    /// record the user message. If the vendor reports the chat as over, either
    /// in the reply or in an error body, the session ends instead of failing.
    pub async fn send(&self, text: &str, silent: bool) -> Result<SendOutcome> {
        let _busy = self.begin()?;

        let (id, sent) = {
            let mut live = self.inner.live.lock();
            if !live.state.is_usable() {
                drop(live);
                return Err(self.fail(Error::NotActive));
            }
            let id = live.state.id().unwrap_or_default().to_string();
            let sent = if !silent && !text.trim().is_empty() {
                Some(live.state.append_message(Role::User, text)?)
            } else {
                None
            };
            (id, sent)
        };

        if let Some(message) = sent {
            self.publish(SessionEvent::MessageSent { message });
        }

        match self.inner.gateway.send_message(&id, text).await {
            Ok(raw) => Ok(self.handle_reply(&id, raw).await),
            Err(e) if e.is_session_ended() => {
                tracing::info!("Session {} ended by the vendor: {}", id, e);
                self.finish_session(&id, true);
                Ok(SendOutcome {
                    reply: None,
                    ended: true,
                })
            }
            Err(e) => {
                tracing::warn!("Failed to send message on session {}: {}", id, e);
                Err(self.fail(e.into()))
            }
        }
    }

    /// Record variables and reply from a send response, then apply its end signal.
    async fn handle_reply(&self, id: &str, raw: Value) -> SendOutcome {
        let ended = compat::is_session_ended(&raw);
        let variables = compat::extract_variables(&raw);
        // A terminal response may carry no reply at all; don't invent one then.
        let reply_text = if ended {
            compat::find_reply_text(&raw)
        } else {
            Some(compat::extract_reply_text(&raw))
        };

        let (reply, merged) = {
            let mut live = self.inner.live.lock();
            if !live.is_current(id) {
                tracing::debug!("Dropping reply for session {}: no longer active", id);
                return SendOutcome {
                    reply: None,
                    ended: live.has_ended(id),
                };
            }
            // A status check left over from the previous reply must not race this one.
            live.cancel_pending_poll();
            let merged = variables.map(|vars| {
                live.state.merge_variables(vars);
                live.state.variables().clone()
            });
            let reply = match reply_text {
                Some(text) => live.state.append_message(Role::Agent, text).ok(),
                None => None,
            };
            (reply, merged)
        };

        if let Some(variables) = merged {
            self.publish(SessionEvent::variables_updated(variables));
        }

        if let Some(message) = reply.clone() {
            if !self.inner.config.reply_delay.is_zero() {
                tokio::time::sleep(self.inner.config.reply_delay).await;
                let live = self.inner.live.lock();
                if !live.is_current(id) {
                    tracing::debug!("Session {} changed while the reply was delayed", id);
                    return SendOutcome {
                        ended: live.has_ended(id),
                        reply,
                    };
                }
            }
            self.publish(SessionEvent::MessageReceived { message });
        }

        if ended {
            tracing::info!("Session {} ended by the vendor response", id);
            self.finish_session(id, true);
        } else {
            self.schedule_follow_up_poll(id);
        }

        SendOutcome { reply, ended }
    }

    /// Check the remote session and end it locally if it is gone.
    ///
    /// Safe to call speculatively: returns false when there is no active
    /// session, during the post-creation grace window, or on any failure.
    pub async fn poll_status(&self) -> bool {
        let id = {
            let live = self.inner.live.lock();
            if !live.state.is_usable() {
                return false;
            }
            if live.state.was_created_within(self.inner.config.grace_window) {
                tracing::debug!("Skipping status check inside the creation grace window");
                return false;
            }
            live.state.id().unwrap_or_default().to_string()
        };

        match self.inner.gateway.get_status(&id).await {
            Ok(status) if compat::is_session_ended(&status) => {
                tracing::info!("Session {} reported ended by status check", id);
                self.finish_session(&id, true);
                true
            }
            Ok(_) => false,
            Err(e) if e.is_session_ended() => {
                self.finish_session(&id, true);
                true
            }
            Err(e) => {
                tracing::warn!("Status check for session {} failed: {}", id, e);
                false
            }
        }
    }

    /// Explicitly terminate the active session.
    ///
    /// On failure the session stays active.
    pub async fn end_session(&self) -> Result<()> {
        let _busy = self.begin()?;

        let id = {
            let live = self.inner.live.lock();
            if !live.state.is_usable() {
                drop(live);
                return Err(self.fail(Error::NotActive));
            }
            live.state.id().unwrap_or_default().to_string()
        };

        match self.inner.gateway.end(&id).await {
            Ok(_) => {
                self.finish_session(&id, false);
                Ok(())
            }
            Err(e) if e.is_session_ended() => {
                tracing::debug!("Session {} was already ended remotely", id);
                self.finish_session(&id, false);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to end session {}: {}", id, e);
                Err(self.fail(e.into()))
            }
        }
    }

    /// Archive the current conversation and clear it for a fresh start.
    ///
    /// Usually called from `Ended`; from `Active` the remote session is simply
    /// abandoned. The next `start_session` asks the proxy for a new chat.
    pub fn reset_for_new_conversation(&self) {
        let (snapshot, cleared) = {
            let mut live = self.inner.live.lock();
            live.cancel_pending_poll();
            if live.state.is_usable() {
                tracing::debug!("Discarding active session {:?}", live.state.id());
            }
            let snapshot = live
                .state
                .id()
                .map(|id| (id.to_string(), live.state.messages().to_vec(), live.state.variables().clone()));
            let cleared = !live.state.variables().is_empty();
            live.state.reset();
            live.force_reset_next_create = true;
            (snapshot, cleared)
        };

        if let Some((id, messages, variables)) = snapshot {
            self.persist(&id, &messages, &variables);
        }
        if cleared {
            self.publish(SessionEvent::VariablesCleared);
        }
    }

    /// Save the current conversation to history without touching its state
    pub fn save_snapshot(&self) {
        let snapshot = {
            let live = self.inner.live.lock();
            live.state.id().map(|id| {
                (
                    id.to_string(),
                    live.state.messages().to_vec(),
                    live.state.variables().clone(),
                )
            })
        };
        if let Some((id, messages, variables)) = snapshot {
            self.persist(&id, &messages, &variables);
        }
    }

    // ---- Internals ----

    /// The single ended-transition. No-op unless `id` is still the active session.
    fn finish_session(&self, id: &str, auto_ended: bool) -> bool {
        let (messages, variables) = {
            let mut live = self.inner.live.lock();
            if !live.is_current(id) {
                return false;
            }
            live.cancel_pending_poll();
            live.state.mark_ended();
            (live.state.messages().to_vec(), live.state.variables().clone())
        };

        self.persist(id, &messages, &variables);
        tracing::info!("Session {} ended (auto_ended={})", id, auto_ended);
        self.publish(SessionEvent::SessionEnded {
            id: id.to_string(),
            auto_ended,
        });
        true
    }

    fn persist(&self, id: &str, messages: &[Message], variables: &Variables) {
        if messages.is_empty() {
            return;
        }
        if let Err(e) = self.inner.history.save_session(id, messages, variables) {
            tracing::warn!("Failed to save session {} to history: {}", id, e);
        }
    }

    /// Check the session status shortly after a reply.
    ///
    /// The check is tied to `id`: it is cancelled when the session ends or is
    /// reset, and does nothing if another session has become active meanwhile.
    fn schedule_follow_up_poll(&self, id: &str) {
        let Some(delay) = self.inner.config.follow_up_poll else {
            return;
        };

        let token = CancellationToken::new();
        {
            let mut live = self.inner.live.lock();
            if !live.is_current(id) {
                return;
            }
            live.cancel_pending_poll();
            live.pending_poll = Some(token.clone());
        }

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(inner) = inner.upgrade() else {
                return;
            };
            let this = SessionOrchestrator { inner };
            if !this.inner.live.lock().is_current(&id) {
                return;
            }
            this.poll_status().await;
        });
    }

    fn begin(&self) -> Result<BusyGuard<'_>> {
        if self.inner.busy.swap(true, Ordering::AcqRel) {
            return Err(self.fail(Error::Busy));
        }
        Ok(BusyGuard(&self.inner.busy))
    }

    /// Announce an error on the bus and hand it back for propagation
    fn fail(&self, error: Error) -> Error {
        self.publish(SessionEvent::Error {
            message: error.to_string(),
        });
        error
    }

    fn publish(&self, event: SessionEvent) {
        self.inner.bus.publish(&event);
    }
}
