//! ORCID as an OAuth2 Authorization Code provider.
//!
//! The token endpoint returns the user's ORCID iD and name alongside the access
//! token, so no separate userinfo request is made.

use std::time::Duration;

use async_trait::async_trait;
use orcid_login_core::{
    config::DEFAULT_SCOPE, state::parse_scopes, AuthError, ExternalIdentity, LoginConfig,
    OAuthErrorResponse, OAuthProvider, OAuthToken, ProviderCredential, TokenExchangeError,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

mod orcid_id;

pub use orcid_id::{OrcidId, OrcidIdError};

const PRODUCTION_BASE: &str = "https://orcid.org";
const SANDBOX_BASE: &str = "https://sandbox.orcid.org";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// ORCID's authorize and token endpoints for one registered client.
pub struct OrcidProvider {
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    http_client: reqwest::Client,
    authorization_url: String,
    token_url: String,
    timeout: Duration,
    use_pkce: bool,
}

impl OrcidProvider {
    /// A provider talking to the production registry at orcid.org.
    pub fn new(credential: ProviderCredential) -> Result<Self, AuthError> {
        Self::with_base(credential, PRODUCTION_BASE)
    }

    /// A provider talking to sandbox.orcid.org.
    pub fn sandbox(credential: ProviderCredential) -> Result<Self, AuthError> {
        Self::with_base(credential, SANDBOX_BASE)
    }

    /// A provider configured from a validated [`LoginConfig`].
    pub fn from_config(config: &LoginConfig) -> Result<Self, AuthError> {
        let provider = if config.sandbox {
            Self::sandbox(config.credential.clone())?
        } else {
            Self::new(config.credential.clone())?
        };
        Ok(provider.with_timeout(config.http_timeout))
    }

    fn with_base(credential: ProviderCredential, base: &str) -> Result<Self, AuthError> {
        // A redirect answer from the token endpoint is a rejection, never a new target
        // for the client secret and code.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client_id: credential.client_id,
            client_secret: credential.client_secret,
            redirect_uri: credential.redirect_uri,
            http_client,
            authorization_url: format!("{}/oauth/authorize", base),
            token_url: format!("{}/oauth/token", base),
            timeout: DEFAULT_TIMEOUT,
            use_pkce: false,
        })
    }

    pub fn with_test_urls(mut self, authorization_url: String, token_url: String) -> Self {
        self.authorization_url = authorization_url;
        self.token_url = token_url;
        self
    }

    /// Bound on the token request, connect time included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send an S256 PKCE challenge and verifier.
    pub fn with_pkce(mut self, use_pkce: bool) -> Self {
        self.use_pkce = use_pkce;
        self
    }
}

#[derive(Deserialize)]
struct OrcidTokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
    name: Option<String>,
    orcid: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn transport_error(e: reqwest::Error) -> TokenExchangeError {
    if e.is_timeout() {
        TokenExchangeError::Timeout
    } else {
        TokenExchangeError::Network(e.without_url().to_string())
    }
}

fn rejected(status: u16, body: &str) -> TokenExchangeError {
    let response = serde_json::from_str::<OAuthErrorResponse>(body).unwrap_or(OAuthErrorResponse {
        error: "unexpected_response".to_string(),
        error_description: None,
    });
    TokenExchangeError::Rejected { status, response }
}

#[async_trait]
impl OAuthProvider for OrcidProvider {
    fn provider_id(&self) -> &str {
        "orcid"
    }

    fn uses_pkce(&self) -> bool {
        self.use_pkce
    }

    fn authorization_url(
        &self,
        state: &str,
        scopes: &[&str],
        code_challenge: Option<&str>,
    ) -> String {
        let scope_param = if scopes.is_empty() {
            DEFAULT_SCOPE.to_string()
        } else {
            scopes.join(" ")
        };

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &scope_param)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", state);
        if let Some(challenge) = code_challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", "S256");
        }

        format!("{}?{}", self.authorization_url, query.finish())
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ExternalIdentity, TokenExchangeError> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }

        tracing::debug!(token_url = %self.token_url, "exchanging authorization code");

        // Sent once: a failed exchange consumed the code at the provider.
        let response = self
            .http_client
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let err = rejected(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), error = %err, "ORCID token endpoint rejected the code");
            return Err(err);
        }

        let token_response: OrcidTokenResponse = serde_json::from_str(&body)
            .map_err(|e| TokenExchangeError::Malformed(format!("Failed to parse token response: {}", e)))?;

        if let Some(error) = non_empty(token_response.error) {
            return Err(TokenExchangeError::Rejected {
                status: status.as_u16(),
                response: OAuthErrorResponse {
                    error,
                    error_description: token_response.error_description,
                },
            });
        }

        let access_token = non_empty(token_response.access_token)
            .ok_or(TokenExchangeError::MissingField("access_token"))?;
        let orcid = non_empty(token_response.orcid)
            .ok_or(TokenExchangeError::MissingField("orcid"))?;
        let orcid = OrcidId::parse(&orcid)
            .map_err(|e| TokenExchangeError::Malformed(format!("invalid ORCID iD: {}", e)))?;

        let token = OAuthToken {
            access_token: SecretString::from(access_token),
            token_type: token_response
                .token_type
                .unwrap_or_else(|| "bearer".to_string()),
            expires_in: token_response.expires_in,
            refresh_token: non_empty(token_response.refresh_token).map(SecretString::from),
            scopes: token_response
                .scope
                .as_deref()
                .map(parse_scopes)
                .unwrap_or_default(),
        };

        Ok(ExternalIdentity {
            provider_id: "orcid".to_string(),
            external_id: orcid.into(),
            display_name: non_empty(token_response.name),
            token,
        })
    }
}
