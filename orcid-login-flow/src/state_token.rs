use std::sync::Arc;

use orcid_login_core::{pkce, AuthError};
use orcid_login_session::{AttemptStore, LoginAttempt};

/// 43 alphanumeric characters carry just over 256 bits.
const STATE_TOKEN_LEN: usize = 43;
const MAX_STATE_TOKEN_LEN: usize = 256;

/// Issues single-use state tokens and owns the login attempts bound to them.
pub struct StateTokenManager {
    store: Arc<dyn AttemptStore>,
    ttl: chrono::Duration,
}

impl StateTokenManager {
    /// Create a manager storing attempts in `store` that expire after `ttl`.
    pub fn new(store: Arc<dyn AttemptStore>, ttl: chrono::Duration) -> Self {
        Self { store, ttl }
    }

    /// Lifetime of an issued token.
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Start a login attempt and return its state token.
    pub async fn issue(
        &self,
        return_path: &str,
        code_verifier: Option<String>,
    ) -> Result<String, AuthError> {
        let now = chrono::Utc::now();
        let attempt = LoginAttempt {
            state_token: pkce::random_token(STATE_TOKEN_LEN),
            return_path: return_path.to_string(),
            code_verifier,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.store.save_attempt(&attempt).await?;

        tracing::debug!(
            state = %pkce::fingerprint(&attempt.state_token),
            expires_at = %attempt.expires_at,
            "issued login state"
        );
        Ok(attempt.state_token)
    }

    /// Consume the attempt for `state_token`.
    ///
    /// Fails with [`AuthError::InvalidState`] when the token is unknown, already
    /// consumed or older than the TTL. The attempt is removed in every case, so a
    /// second call with the same token always fails.
    pub async fn validate_and_consume(&self, state_token: &str) -> Result<LoginAttempt, AuthError> {
        if state_token.is_empty() || state_token.len() > MAX_STATE_TOKEN_LEN {
            return Err(AuthError::InvalidState);
        }
        let fingerprint = pkce::fingerprint(state_token);

        let Some(attempt) = self.store.take_attempt(state_token).await? else {
            tracing::warn!(state = %fingerprint, "unknown or already used login state");
            return Err(AuthError::InvalidState);
        };

        let now = chrono::Utc::now();
        if attempt.is_expired_at(now) || attempt.created_at + self.ttl <= now {
            tracing::warn!(state = %fingerprint, created_at = %attempt.created_at, "expired login state");
            return Err(AuthError::InvalidState);
        }

        Ok(attempt)
    }
}
