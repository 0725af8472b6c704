use serde::{Deserialize, Serialize};

use crate::UserId;

/// Errors that can occur during the login process.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The state token is unknown, expired, already consumed or not bound to this browser
    #[error("Invalid or expired login state")]
    InvalidState,
    /// The user declined consent or the provider reported an error on the callback
    #[error("Provider denied the request: {error}")]
    ProviderDenied {
        /// The OAuth2 error code (e.g. `access_denied`)
        error: String,
        /// The provider's human-readable description, if any
        description: Option<String>,
    },
    /// The authorization code could not be exchanged for a token
    #[error("Token exchange failed: {0}")]
    TokenExchange(#[from] TokenExchangeError),
    /// No account is linked to the identity and account creation is disabled
    #[error("Account creation is disabled")]
    CreationDisabled,
    /// A role configured for new accounts does not exist or could not be assigned
    #[error("Could not assign role `{0}`")]
    RoleAssignment(String),
    /// The local account holds a role or permission that is not allowed to log in
    #[error("Access denied: {0}")]
    AccessDenied(String),
    /// The account was created but the link to the external identity could not be stored
    #[error("Could not persist link for user {user_id}: {reason}")]
    LinkPersistence {
        /// The account created before link persistence failed
        user_id: UserId,
        /// Why persistence failed
        reason: String,
    },
    /// The user store failed outside of link persistence
    #[error("User store error: {0}")]
    Store(#[from] StoreError),
    /// An error occurred during session or login attempt management
    #[error("Session error: {0}")]
    Session(String),
    /// The configuration is missing a value or holds an invalid one
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// The coarse failure category exposed outside the server.
    pub fn kind(&self) -> FailureKind {
        match self {
            AuthError::InvalidState => FailureKind::InvalidState,
            AuthError::ProviderDenied { .. } => FailureKind::ProviderDenied,
            AuthError::TokenExchange(_) => FailureKind::TokenExchange,
            AuthError::CreationDisabled => FailureKind::CreationDisabled,
            AuthError::RoleAssignment(_) => FailureKind::RoleAssignment,
            AuthError::AccessDenied(_) => FailureKind::AccessDenied,
            AuthError::LinkPersistence { .. } => FailureKind::LinkPersistence,
            AuthError::Store(_) => FailureKind::Store,
            AuthError::Session(_) | AuthError::Config(_) => FailureKind::Session,
        }
    }
}

/// Why a code-for-token exchange failed.
#[derive(Debug, thiserror::Error)]
pub enum TokenExchangeError {
    /// The token endpoint could not be reached
    #[error("network error: {0}")]
    Network(String),
    /// The token endpoint did not answer within the configured timeout
    #[error("token endpoint timed out")]
    Timeout,
    /// The provider answered with an OAuth2 error
    #[error("provider rejected the exchange (HTTP {status}): {}", .response.error)]
    Rejected {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// The provider's error body
        response: OAuthErrorResponse,
    },
    /// The response body could not be parsed
    #[error("malformed token response: {0}")]
    Malformed(String),
    /// The response lacks a field required for a successful login
    #[error("token response is missing `{0}`")]
    MissingField(&'static str),
    /// The callback carried no authorization code
    #[error("callback carried no authorization code")]
    MissingCode,
}

/// Errors reported by a host user store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The named role does not exist
    #[error("role `{0}` does not exist")]
    RoleNotFound(String),
    /// The user does not exist
    #[error("user {0} does not exist")]
    UserNotFound(UserId),
    /// The external identity is already linked to another account
    #[error("external identity `{external_id}` is already linked to user {user_id}")]
    LinkExists {
        /// The external identity
        external_id: String,
        /// The account it is linked to
        user_id: UserId,
    },
    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

/// Represents an error response from an OAuth2 provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// The error code.
    pub error: String,
    /// A human-readable ASCII text description of the error.
    pub error_description: Option<String>,
}

/// The failure taxonomy of a login attempt.
///
/// Only the kind leaves the server; the underlying [`AuthError`] is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// CSRF, replay or expired state token
    InvalidState,
    /// The user declined consent or the provider reported an error
    ProviderDenied,
    /// Network or provider failure during code exchange
    TokenExchange,
    /// Unknown identity and account creation is disabled
    CreationDisabled,
    /// A configured role is missing
    RoleAssignment,
    /// The account is excluded by the disallow policy
    AccessDenied,
    /// Storage failure while linking a new account
    LinkPersistence,
    /// User store failure
    Store,
    /// Session store failure
    Session,
}

impl FailureKind {
    /// Stable identifier used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidState => "invalid_state",
            FailureKind::ProviderDenied => "provider_denied",
            FailureKind::TokenExchange => "token_exchange",
            FailureKind::CreationDisabled => "creation_disabled",
            FailureKind::RoleAssignment => "role_assignment",
            FailureKind::AccessDenied => "access_denied",
            FailureKind::LinkPersistence => "link_persistence",
            FailureKind::Store => "store",
            FailureKind::Session => "session",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
