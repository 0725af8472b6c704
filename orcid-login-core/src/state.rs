use std::collections::BTreeSet;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Identifier of an account in the host's user store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a host-specific user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A verified identity returned by the provider after a successful code exchange.
///
/// Lives for the duration of a single callback request.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    /// The provider identifier (e.g. "orcid")
    pub provider_id: String,
    /// The unique, immutable ID of the user within the provider's system (the ORCID iD)
    pub external_id: String,
    /// The user's display name, if the provider shared it
    pub display_name: Option<String>,
    /// The tokens issued by the provider
    pub token: OAuthToken,
}

impl ExternalIdentity {
    /// The scopes granted by the user.
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.token.scopes
    }
}

/// Represents the tokens returned by an OAuth2 provider.
#[derive(Debug, Clone)]
pub struct OAuthToken {
    /// The access token used for API requests
    pub access_token: SecretString,
    /// The type of token (usually "bearer")
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: Option<u64>,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: Option<SecretString>,
    /// The scopes granted by the user
    pub scopes: BTreeSet<String>,
}

/// Parse a space-delimited OAuth2 scope string.
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// The account to create for a first-time login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Login name of the new account
    pub name: String,
    /// Display name reported by the provider
    pub display_name: Option<String>,
    /// The external identity the account is created for
    pub external_id: String,
}
