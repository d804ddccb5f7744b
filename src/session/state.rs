//! Application session state and the observer the client reports to.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// What the UI knows about the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub authenticated: bool,
    pub access_token: Option<String>,
    /// Profile returned by login
    pub user: Option<Value>,
}

/// Session transitions reported by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Login or refresh succeeded. `access_token` is `None` when the backend
    /// only rotated its HTTP-only cookie; `user` is only known after login.
    Authenticated {
        access_token: Option<String>,
        user: Option<Value>,
    },
    /// Logout or unrecoverable refresh failure
    LoggedOut,
}

impl SessionState {
    pub fn apply(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::Authenticated { access_token, user } => {
                self.authenticated = true;
                if access_token.is_some() {
                    self.access_token = access_token;
                }
                if user.is_some() {
                    self.user = user;
                }
            }
            SessionUpdate::LoggedOut => *self = SessionState::default(),
        }
    }
}

/// Receiver for session transitions, handed to the client at construction.
pub trait SessionObserver: Send + Sync + 'static {
    fn on_session_update(&self, update: SessionUpdate);
}

impl<F> SessionObserver for F
where
    F: Fn(SessionUpdate) + Send + Sync + 'static,
{
    fn on_session_update(&self, update: SessionUpdate) {
        self(update)
    }
}

/// Observer that ignores every update.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_session_update(&self, _update: SessionUpdate) {}
}

/// Shared, readable session state that tracks every update it receives.
#[derive(Clone, Default)]
pub struct SharedSession {
    state: Arc<RwLock<SessionState>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .authenticated
    }
}

impl SessionObserver for SharedSession {
    fn on_session_update(&self, update: SessionUpdate) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(update);
    }
}
