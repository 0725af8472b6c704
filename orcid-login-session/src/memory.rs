use async_trait::async_trait;
use dashmap::DashMap;
use orcid_login_core::AuthError;

use crate::{AttemptStore, LoginAttempt, Session, SessionStore};

/// An in-memory implementation of [`SessionStore`] and [`AttemptStore`].
///
/// **Note**: This store is not persistent and will be cleared when the application restarts.
/// Attempts are only shared within one process.
#[derive(Default)]
pub struct MemoryStore {
    sessions: DashMap<String, Session>,
    attempts: DashMap<String, LoginAttempt>,
}

impl MemoryStore {
    /// Create a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending login attempts.
    pub fn pending_attempts(&self) -> usize {
        self.attempts.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_session(&self, id: &str) -> Result<Option<Session>, AuthError> {
        let session = self.sessions.get(id).map(|s| s.value().clone());
        match session {
            Some(s) if s.is_expired() => {
                self.sessions.remove(id);
                Ok(None)
            }
            other => Ok(other),
        }
    }
    async fn save_session(&self, session: &Session) -> Result<(), AuthError> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }
    async fn delete_session(&self, id: &str) -> Result<(), AuthError> {
        self.sessions.remove(id);
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn save_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        // Abandoned attempts are never taken; drop them here instead of on a timer.
        let now = chrono::Utc::now();
        self.attempts.retain(|_, a| !a.is_expired_at(now));
        self.attempts
            .insert(attempt.state_token.clone(), attempt.clone());
        Ok(())
    }

    async fn take_attempt(&self, state_token: &str) -> Result<Option<LoginAttempt>, AuthError> {
        Ok(self.attempts.remove(state_token).map(|(_, attempt)| attempt))
    }
}
