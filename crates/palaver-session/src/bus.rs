//! Synchronous publish/subscribe hub for session events.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::events::{EventKind, SessionEvent};

/// An event handler
pub type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Identifies one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Entry {
    id: HandlerId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<EventKind, Vec<Entry>>>,
}

impl Registry {
    fn next_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, kind: EventKind, id: HandlerId, handler: Handler) {
        self.handlers
            .lock()
            .entry(kind)
            .or_default()
            .push(Entry { id, handler });
    }

    fn remove(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(entries) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }
}

/// Event hub shared between the orchestrator and its observers.
///
/// Cloning is cheap and yields a handle to the same set of subscribers.
/// Handlers run synchronously on the publishing task, in registration order.
/// A panicking handler is logged and skipped; the rest still run.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

/// Capability to remove one registration from an [`EventBus`].
///
/// Dropping it leaves the handler registered.
pub struct Subscription {
    registry: Weak<Registry>,
    kinds: Vec<EventKind>,
    id: HandlerId,
}

impl Subscription {
    /// The id accepted by [`EventBus::unsubscribe`]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Remove the handler this subscription refers to
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            for kind in &self.kinds {
                registry.remove(*kind, self.id);
            }
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id();
        self.registry.insert(kind, id, Arc::new(handler));
        self.subscription(vec![kind], id)
    }

    /// Register one handler for every event kind
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id();
        let handler: Handler = Arc::new(handler);
        for kind in EventKind::ALL {
            self.registry.insert(kind, id, Arc::clone(&handler));
        }
        self.subscription(EventKind::ALL.to_vec(), id)
    }

    /// Register a handler that removes itself after its first invocation
    pub fn subscribe_once<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id();
        let registry = Arc::downgrade(&self.registry);
        let fired = AtomicBool::new(false);

        let once = move |event: &SessionEvent| {
            if fired.swap(true, Ordering::AcqRel) {
                return;
            }
            if let Some(registry) = registry.upgrade() {
                registry.remove(kind, id);
            }
            handler(event);
        };

        self.registry.insert(kind, id, Arc::new(once));
        self.subscription(vec![kind], id)
    }

    /// Remove a handler by id. Returns false if it was not registered.
    pub fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        self.registry.remove(kind, id)
    }

    /// Deliver an event to every handler currently registered for its kind
    pub fn publish(&self, event: &SessionEvent) {
        let kind = event.kind();

        // Snapshot so handlers may (un)subscribe or publish without deadlocking.
        let handlers: Vec<Handler> = self
            .registry
            .handlers
            .lock()
            .get(&kind)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.handler)).collect())
            .unwrap_or_default();

        tracing::trace!("Publishing {} to {} handler(s)", kind, handlers.len());

        for handler in handlers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                tracing::error!(
                    "Handler for '{}' panicked: {}",
                    kind,
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    /// Number of handlers registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .handlers
            .lock()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn subscription(&self, kinds: Vec<EventKind>, id: HandlerId) -> Subscription {
        Subscription {
            registry: Arc::downgrade(&self.registry),
            kinds,
            id,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(id: &str) -> SessionEvent {
        SessionEvent::SessionCreated { id: id.into() }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&SessionEvent) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |tag: &str| -> Box<dyn Fn(&SessionEvent) + Send + Sync> {
            let sink = Arc::clone(&sink);
            let tag = tag.to_string();
            Box::new(move |_e: &SessionEvent| sink.lock().push(tag.clone()))
        };
        (log, make)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.subscribe(EventKind::SessionCreated, make("first"));
        bus.subscribe(EventKind::SessionCreated, make("second"));
        bus.subscribe(EventKind::SessionEnded, make("other kind"));

        bus.publish(&created("a"));
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handler() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let first = bus.subscribe(EventKind::SessionCreated, make("first"));
        bus.subscribe(EventKind::SessionCreated, make("second"));

        first.unsubscribe();
        bus.publish(&created("a"));
        assert_eq!(*log.lock(), vec!["second"]);
        assert_eq!(bus.listener_count(EventKind::SessionCreated), 1);
    }

    #[test]
    fn test_unsubscribe_by_id_is_noop_when_absent() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::Error, |_| {});
        let id = sub.id();
        assert!(bus.unsubscribe(EventKind::Error, id));
        assert!(!bus.unsubscribe(EventKind::Error, id));
        assert!(!bus.unsubscribe(EventKind::MessageSent, id));
    }

    #[test]
    fn test_subscribe_once_fires_once() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.subscribe_once(EventKind::SessionCreated, make("once"));

        bus.publish(&created("a"));
        bus.publish(&created("b"));
        assert_eq!(*log.lock(), vec!["once"]);
        assert_eq!(bus.listener_count(EventKind::SessionCreated), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.subscribe(EventKind::Error, |_| panic!("handler bug"));
        bus.subscribe(EventKind::Error, make("survivor"));

        bus.publish(&SessionEvent::Error {
            message: "x".into(),
        });
        assert_eq!(*log.lock(), vec!["survivor"]);
    }

    #[test]
    fn test_subscribe_all_receives_every_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe_all(move |e| sink.lock().push(e.kind()));

        bus.publish(&created("a"));
        bus.publish(&SessionEvent::VariablesCleared);
        assert_eq!(
            *seen.lock(),
            vec![EventKind::SessionCreated, EventKind::VariablesCleared]
        );

        sub.unsubscribe();
        for kind in EventKind::ALL {
            assert_eq!(bus.listener_count(kind), 0);
        }
    }

    #[test]
    fn test_handler_may_unsubscribe_during_publish() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let (log, make) = recorder();
        let victim = bus.subscribe(EventKind::SessionCreated, make("victim"));
        let victim_id = victim.id();

        let remover = bus.subscribe(EventKind::SessionCreated, move |_| {
            inner_bus.unsubscribe(EventKind::SessionCreated, victim_id);
        });
        // dropping the capability keeps the handler registered
        drop(remover);

        bus.publish(&created("a"));
        bus.publish(&created("b"));
        assert_eq!(*log.lock(), vec!["victim"]);
        assert_eq!(bus.listener_count(EventKind::SessionCreated), 1);
    }
}
