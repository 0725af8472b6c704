//! Storage for pending login attempts and authenticated sessions.
//!
//! Both concerns are behind traits so a deployment can keep them in process
//! ([`MemoryStore`]) or share them between processes ([`RedisStore`], feature `redis-store`).

use async_trait::async_trait;
pub use orcid_login_core::{AuthError, UserId};
use serde::{Deserialize, Serialize};

#[cfg(feature = "redis-store")]
pub mod redis;

#[cfg(feature = "redis-store")]
pub use redis::RedisStore;

pub mod memory;
pub use memory::MemoryStore;

/// Controls whether a cookie is sent with cross-site requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// The cookie is sent with "safe" cross-site requests (e.g., following a link).
    Lax,
    /// The cookie is only sent for same-site requests.
    Strict,
    /// The cookie is sent with all requests, including cross-site. Requires `Secure`.
    None,
}

/// Configuration for session cookies.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// The name of the session cookie.
    pub cookie_name: String,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Whether the cookie should be inaccessible to client-side scripts.
    pub http_only: bool,
    /// The `SameSite` attribute for the cookie.
    pub same_site: SameSite,
    /// The path for which the cookie is valid.
    pub path: String,
    /// The maximum age of the session.
    pub max_age: Option<chrono::Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "orcid_login_session".to_string(),
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            max_age: Some(chrono::Duration::hours(24)),
        }
    }
}

/// Represents an active user session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// The local account the session belongs to.
    pub user_id: UserId,
    /// The external identity used to log in.
    pub external_id: String,
    /// The display name reported by the provider.
    pub display_name: Option<String>,
    /// When the session expires.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    /// Whether the session is past its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= chrono::Utc::now()
    }
}

/// A pending login, created when the browser is sent to the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    /// The state token sent to the provider.
    pub state_token: String,
    /// Where to send the user after a successful login.
    pub return_path: String,
    /// PKCE verifier, when the provider uses PKCE.
    pub code_verifier: Option<String>,
    /// When the attempt was started.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When the attempt stops being accepted.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl LoginAttempt {
    /// Whether the attempt is expired at `now`.
    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Trait for implementing session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Load a session by its ID.
    async fn load_session(&self, id: &str) -> Result<Option<Session>, AuthError>;
    /// Save or update a session.
    async fn save_session(&self, session: &Session) -> Result<(), AuthError>;
    /// Delete a session by its ID.
    async fn delete_session(&self, id: &str) -> Result<(), AuthError>;
}

/// Trait for storing pending login attempts.
#[async_trait]
pub trait AttemptStore: Send + Sync + 'static {
    /// Store a new attempt under its state token.
    async fn save_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError>;
    /// Remove and return the attempt for a state token.
    ///
    /// Must be atomic: of any number of concurrent calls with the same token,
    /// at most one may return the attempt.
    async fn take_attempt(&self, state_token: &str) -> Result<Option<LoginAttempt>, AuthError>;
}
