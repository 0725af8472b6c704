//! # ORCID Login Core
//!
//! `orcid-login-core` provides the foundational traits and types shared by the ORCID login crates.
//!
//! ## Key Components
//!
//! - **[`ExternalIdentity`]**: The verified identity returned by a provider after a code exchange.
//! - **[`OAuthProvider`]**: A trait for the Authorization Code client of an identity provider.
//! - **[`UserStore`]**: The host's user, role, permission and account link storage.
//! - **[`LoginConfig`]**: Typed configuration validated at load time.
//! - **[`AuthError`]**: The error taxonomy of a login attempt.

#![warn(missing_docs)]

use async_trait::async_trait;

/// Typed configuration and the admin configuration schema.
pub mod config;
/// Error types.
pub mod error;
/// In-memory [`UserStore`] for development and tests.
pub mod memory;
/// PKCE (Proof Key for Code Exchange) and random token utilities.
pub mod pkce;
/// Identity, token and account types.
pub mod state;

pub use config::{config_schema, AccessPolicy, ConfigField, FieldKind, LoginConfig, ProviderCredential};
pub use error::{AuthError, FailureKind, OAuthErrorResponse, StoreError, TokenExchangeError};
pub use memory::MemoryUserStore;
pub use state::{ExternalIdentity, NewUser, OAuthToken, UserId};

/// Trait for an OAuth2 Authorization Code provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Get the provider identifier.
    fn provider_id(&self) -> &str;

    /// Build the authorization endpoint URL the browser is redirected to.
    ///
    /// Depends only on its inputs and the provider's client registration.
    fn authorization_url(&self, state: &str, scopes: &[&str], code_challenge: Option<&str>)
        -> String;

    /// Whether login attempts must carry a PKCE verifier for this provider.
    fn uses_pkce(&self) -> bool {
        false
    }

    /// Exchange an authorization code for a verified identity.
    ///
    /// Implementations must bound the request with a timeout and must not retry:
    /// the code is single-use.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ExternalIdentity, TokenExchangeError>;
}

/// The host's user, role, permission and account link storage.
///
/// Links map an external identity to exactly one local account and are never
/// overwritten: [`UserStore::persist_link`] must fail with [`StoreError::LinkExists`]
/// when the identity is already linked.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Find the account linked to an external identity.
    async fn find_user_by_external_link(&self, external_id: &str)
        -> Result<Option<UserId>, StoreError>;
    /// Create a new account and return its ID.
    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError>;
    /// Delete an account. Used to undo a creation whose link could not be stored.
    async fn delete_user(&self, user_id: &UserId) -> Result<(), StoreError>;
    /// Whether the role exists.
    async fn role_exists(&self, role: &str) -> Result<bool, StoreError>;
    /// Give a role to an account.
    async fn assign_role(&self, user_id: &UserId, role: &str) -> Result<(), StoreError>;
    /// Whether the account holds the role.
    async fn user_has_role(&self, user_id: &UserId, role: &str) -> Result<bool, StoreError>;
    /// Whether the account holds the permission through any of its roles.
    async fn user_has_permission(&self, user_id: &UserId, permission: &str)
        -> Result<bool, StoreError>;
    /// Link an external identity to an account.
    async fn persist_link(&self, external_id: &str, user_id: &UserId) -> Result<(), StoreError>;
}
