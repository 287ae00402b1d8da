//! Ambient session state and the store that tracks it.
//!
//! The store is written by exactly one provider subscription (claimed via
//! [`SessionStore::mark_subscribed`]) and read by everyone else, either
//! synchronously through [`SessionStore::current`] or reactively through
//! the watch handle.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Identity of a signed-in account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    /// Absent for phone-only accounts until an email is associated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Where the ambient session currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing heard from the provider yet.
    #[default]
    Unknown,
    /// The provider is resolving or restoring a session.
    Loading,
    Authenticated(UserIdentity),
    Unauthenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// True while the ambient session is still being resolved.
    ///
    /// `Unknown` counts: before the provider has reported anything, a
    /// submission could race the restore of an existing session.
    pub fn is_resolving(&self) -> bool {
        matches!(self, Self::Unknown | Self::Loading)
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Ambient session transition reported by a provider stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session mutation or restore has started applying.
    Resolving,
    SignedIn(UserIdentity),
    SignedOut,
}

/// Tracks the ambient session and fans transitions out to readers.
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
    subscribed: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Unknown);
        Self {
            tx,
            subscribed: false,
        }
    }

    /// Synchronous read of the current state. No side effects.
    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Read-only handle for awaiting transitions. Always mirrors
    /// [`Self::current`].
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Claims the single provider subscription for this store.
    ///
    /// Returns false if already claimed; the caller must not wire up a
    /// second stream.
    pub fn mark_subscribed(&mut self) -> bool {
        if self.subscribed {
            return false;
        }
        self.subscribed = true;
        true
    }

    /// Applies one ambient event. Events are applied in arrival order,
    /// never coalesced.
    pub fn apply(&mut self, event: SessionEvent) {
        let next = match event {
            SessionEvent::Resolving => SessionState::Loading,
            SessionEvent::SignedIn(identity) => SessionState::Authenticated(identity),
            SessionEvent::SignedOut => SessionState::Unauthenticated,
        };
        self.tx.send_replace(next);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(user_id: &str) -> UserIdentity {
        UserIdentity {
            user_id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
        }
    }

    /// Test: events map onto states in arrival order.
    #[test]
    fn apply_transitions_in_order() {
        let mut store = SessionStore::new();
        assert_eq!(store.current(), SessionState::Unknown);

        store.apply(SessionEvent::Resolving);
        assert_eq!(store.current(), SessionState::Loading);

        store.apply(SessionEvent::SignedIn(identity("u1")));
        assert_eq!(
            store.current(),
            SessionState::Authenticated(identity("u1"))
        );

        store.apply(SessionEvent::SignedOut);
        assert_eq!(store.current(), SessionState::Unauthenticated);
    }

    /// Test: the watch handle mirrors current() after every apply.
    #[test]
    fn watch_mirrors_current() {
        let mut store = SessionStore::new();
        let rx = store.watch();

        store.apply(SessionEvent::SignedIn(identity("u2")));
        assert_eq!(*rx.borrow(), store.current());
    }

    /// Test: only the first subscription claim succeeds.
    #[test]
    fn single_subscription_guard() {
        let mut store = SessionStore::new();
        assert!(store.mark_subscribed());
        assert!(!store.mark_subscribed());
    }

    /// Test: unknown and loading both gate submissions; resolved states
    /// do not.
    #[test]
    fn resolving_states() {
        assert!(SessionState::Unknown.is_resolving());
        assert!(SessionState::Loading.is_resolving());
        assert!(!SessionState::Unauthenticated.is_resolving());
        assert!(!SessionState::Authenticated(identity("u3")).is_resolving());
    }

    /// Test: events serialize with a snake_case type tag.
    #[test]
    fn event_serialization() {
        let json = serde_json::to_value(SessionEvent::SignedIn(UserIdentity {
            user_id: "abc".to_string(),
            email: None,
        }))
        .unwrap();
        assert_eq!(json["type"], "signed_in");
        assert_eq!(json["user_id"], "abc");

        let json = serde_json::to_value(SessionEvent::SignedOut).unwrap();
        assert_eq!(json["type"], "signed_out");
    }
}
