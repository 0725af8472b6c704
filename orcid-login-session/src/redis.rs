use async_trait::async_trait;
use orcid_login_core::AuthError;
use redis::AsyncCommands;

use crate::{AttemptStore, LoginAttempt, Session, SessionStore};

/// A Redis-backed [`SessionStore`] and [`AttemptStore`].
///
/// Attempts are consumed with `GETDEL`, so a state token is accepted at most
/// once even when several processes serve callbacks.
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    pub fn new(redis_url: &str, prefix: String) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AuthError::Session(format!("Failed to open redis client: {}", e)))?;
        Ok(Self { client, prefix })
    }

    fn session_key(&self, id: &str) -> String {
        format!("{}:session:{}", self.prefix, id)
    }

    fn attempt_key(&self, state_token: &str) -> String {
        format!("{}:attempt:{}", self.prefix, state_token)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AuthError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AuthError::Session(format!("Redis connection error: {}", e)))
    }
}

fn ttl_secs(expires_at: chrono::DateTime<chrono::Utc>) -> Option<u64> {
    let ttl = (expires_at - chrono::Utc::now()).num_seconds();
    (ttl > 0).then_some(ttl as u64)
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn load_session(&self, id: &str) -> Result<Option<Session>, AuthError> {
        let mut conn = self.connection().await?;

        let data: Option<String> = conn
            .get(self.session_key(id))
            .await
            .map_err(|e| AuthError::Session(format!("Redis get error: {}", e)))?;

        data.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AuthError::Session(format!("Session deserialization error: {}", e)))
        })
        .transpose()
    }

    async fn save_session(&self, session: &Session) -> Result<(), AuthError> {
        let Some(ttl) = ttl_secs(session.expires_at) else {
            return Ok(());
        };
        let json = serde_json::to_string(session)
            .map_err(|e| AuthError::Session(format!("Session serialization error: {}", e)))?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(self.session_key(&session.id), json, ttl)
            .await
            .map_err(|e| AuthError::Session(format!("Redis set error: {}", e)))?;

        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), AuthError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(self.session_key(id))
            .await
            .map_err(|e| AuthError::Session(format!("Redis del error: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl AttemptStore for RedisStore {
    async fn save_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        let Some(ttl) = ttl_secs(attempt.expires_at) else {
            return Ok(());
        };
        let json = serde_json::to_string(attempt)
            .map_err(|e| AuthError::Session(format!("Attempt serialization error: {}", e)))?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(self.attempt_key(&attempt.state_token), json, ttl)
            .await
            .map_err(|e| AuthError::Session(format!("Redis set error: {}", e)))?;

        Ok(())
    }

    async fn take_attempt(&self, state_token: &str) -> Result<Option<LoginAttempt>, AuthError> {
        let mut conn = self.connection().await?;
        let data: Option<String> = redis::cmd("GETDEL")
            .arg(self.attempt_key(state_token))
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Session(format!("Redis getdel error: {}", e)))?;

        data.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| AuthError::Session(format!("Attempt deserialization error: {}", e)))
        })
        .transpose()
    }
}
