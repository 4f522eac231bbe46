use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use blade_verifier_core::ProgressEvent;
use tokio::sync::mpsc::UnboundedSender;

/// Process-wide map from session id to the single live subscriber for that
/// session.
///
/// Delivery is best-effort and at-most-once: events published while no
/// subscriber is registered are dropped, never buffered or retried. Each
/// operation touches a single key, so one mutex over the whole map is the
/// entire locking discipline.
pub(crate) struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionSink>>,
    next_token: AtomicU64,
}

struct SessionSink {
    token: u64,
    tx: UnboundedSender<ProgressEvent>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Register a subscriber, replacing any existing sink for the id; the
    /// replaced sender is dropped, which ends the old subscriber's stream.
    /// Returns the token that scopes the matching `unregister`.
    pub(crate) fn register(&self, id: &str, tx: UnboundedSender<ProgressEvent>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .unwrap()
            .insert(id.to_string(), SessionSink { token, tx });
        token
    }

    /// Remove the sink only if it still belongs to `token`. A disconnect
    /// notification from a replaced subscriber must not evict the newer one
    /// registered under the same id.
    pub(crate) fn unregister(&self, id: &str, token: u64) {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.get(id).is_some_and(|sink| sink.token == token) {
            sessions.remove(id);
        }
    }

    /// Best-effort delivery: a no-op when the session has no subscriber. A
    /// send failure means the receiver is already gone, so the stale entry
    /// is dropped on the spot.
    pub(crate) fn publish(&self, id: &str, event: ProgressEvent) {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(sink) = sessions.get(id) else {
            return;
        };
        if sink.tx.send(event).is_err() {
            sessions.remove(id);
        }
    }

    pub(crate) fn active_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn event(log: &str) -> ProgressEvent {
        ProgressEvent::log(log, 10)
    }

    #[test]
    fn publish_without_subscriber_is_a_noop() {
        let registry = SessionRegistry::new();
        registry.publish("nobody-1", event("dropped"));
        assert_eq!(registry.active_sessions(), 0);
    }

    #[test]
    fn publish_delivers_to_registered_sink() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("ann-1", tx);

        registry.publish("ann-1", event("hello"));
        assert_eq!(rx.try_recv().unwrap().log, "hello");
    }

    #[test]
    fn second_registration_replaces_the_first() {
        let registry = SessionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register("ann-1", tx1);
        registry.register("ann-1", tx2);

        registry.publish("ann-1", event("to the newest"));
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap().log, "to the newest");
        assert_eq!(registry.active_sessions(), 1);
    }

    #[test]
    fn stale_unregister_cannot_evict_newer_subscriber() {
        let registry = SessionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let first_token = registry.register("ann-1", tx1);
        registry.register("ann-1", tx2);

        // The first subscriber disconnects after being replaced.
        registry.unregister("ann-1", first_token);

        registry.publish("ann-1", event("still delivered"));
        assert_eq!(rx2.try_recv().unwrap().log, "still delivered");
    }

    #[test]
    fn matching_unregister_removes_the_entry() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = registry.register("ann-1", tx);

        registry.unregister("ann-1", token);
        assert_eq!(registry.active_sessions(), 0);
    }

    #[test]
    fn publish_to_closed_receiver_drops_the_entry() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("ann-1", tx);
        drop(rx);

        registry.publish("ann-1", event("lost"));
        assert_eq!(registry.active_sessions(), 0);
    }
}
