use std::fmt;
use std::sync::Arc;

use orcid_login_core::{
    config::is_local_path, pkce, AccessPolicy, AuthError, FailureKind, LoginConfig,
    OAuthProvider, TokenExchangeError, UserStore,
};
use orcid_login_session::{AttemptStore, MemoryStore, Session, SessionStore};
use serde::Deserialize;

use crate::{IdentityResolver, StateTokenManager};

/// Where a login attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    Redirecting,
    AwaitingCallback,
    Exchanging,
    Resolving,
    Authenticated,
    Failed(FailureKind),
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginState::Idle => f.write_str("idle"),
            LoginState::Redirecting => f.write_str("redirecting"),
            LoginState::AwaitingCallback => f.write_str("awaiting_callback"),
            LoginState::Exchanging => f.write_str("exchanging"),
            LoginState::Resolving => f.write_str("resolving"),
            LoginState::Authenticated => f.write_str("authenticated"),
            LoginState::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

/// Query parameters the provider sends back to the callback endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// The terminal result of a `start` or `callback` step.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Send the browser to the provider.
    Redirecting {
        authorization_url: String,
        /// Bind this to the browser so the callback can be matched to it.
        state_token: String,
    },
    /// The user is logged in.
    Authenticated { session: Session, redirect_to: String },
    /// The attempt failed; only the kind is exposed, details went to the log.
    Failed {
        reason: FailureKind,
        redirect_to: String,
    },
}

impl LoginOutcome {
    pub fn state(&self) -> LoginState {
        match self {
            LoginOutcome::Redirecting { .. } => LoginState::Redirecting,
            LoginOutcome::Authenticated { .. } => LoginState::Authenticated,
            LoginOutcome::Failed { reason, .. } => LoginState::Failed(*reason),
        }
    }

    /// Target of the HTTP redirect that ends this step.
    pub fn location(&self) -> &str {
        match self {
            LoginOutcome::Redirecting {
                authorization_url, ..
            } => authorization_url,
            LoginOutcome::Authenticated { redirect_to, .. }
            | LoginOutcome::Failed { redirect_to, .. } => redirect_to,
        }
    }
}

/// Logs state transitions of one request.
struct Progress {
    state: LoginState,
    attempt: Option<String>,
}

impl Progress {
    fn new(state: LoginState) -> Self {
        Self {
            state,
            attempt: None,
        }
    }

    fn bind(&mut self, state_token: &str) {
        self.attempt = Some(pkce::fingerprint(state_token));
    }

    fn advance(&mut self, next: LoginState) {
        tracing::debug!(
            attempt = self.attempt.as_deref().unwrap_or("-"),
            from = %self.state,
            to = %next,
            "login transition"
        );
        self.state = next;
    }
}

/// Drives a login through the states in [`LoginState`].
///
/// Holds no per-attempt state between requests: everything a callback needs is in
/// the attempt store behind [`StateTokenManager`]. Every failure is recovered here
/// and turned into [`LoginOutcome::Failed`].
pub struct LoginOrchestrator {
    provider: Arc<dyn OAuthProvider>,
    tokens: StateTokenManager,
    resolver: IdentityResolver,
    sessions: Arc<dyn SessionStore>,
    policy: AccessPolicy,
    scopes: Vec<String>,
    after_login_path: String,
    error_login_path: String,
    session_ttl: chrono::Duration,
    bind_to_browser: bool,
}

impl LoginOrchestrator {
    /// An orchestrator keeping attempts and sessions in one in-process [`MemoryStore`].
    pub fn new(
        config: &LoginConfig,
        provider: Arc<dyn OAuthProvider>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            provider,
            tokens: StateTokenManager::new(store.clone(), config.state_ttl),
            resolver: IdentityResolver::new(users).with_username_format(&config.username_format),
            sessions: store,
            policy: config.policy.clone(),
            scopes: config.scopes.clone(),
            after_login_path: config.after_login_path.clone(),
            error_login_path: config.error_login_path.clone(),
            session_ttl: config.session_ttl,
            bind_to_browser: true,
        }
    }

    /// Use dedicated stores, e.g. a shared Redis instance for several processes.
    pub fn with_stores(
        mut self,
        attempts: Arc<dyn AttemptStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        self.tokens = StateTokenManager::new(attempts, self.tokens.ttl());
        self.sessions = sessions;
        self
    }

    /// Require the callback to present the state token it was given by `start`.
    pub fn with_browser_binding(mut self, bind: bool) -> Self {
        self.bind_to_browser = bind;
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn error_login_path(&self) -> &str {
        &self.error_login_path
    }

    /// How long a started login stays acceptable.
    pub fn state_ttl(&self) -> chrono::Duration {
        self.tokens.ttl()
    }

    /// `Idle -> Redirecting`.
    ///
    /// `return_path` is kept only if it is a local path; otherwise the user lands on
    /// the configured after-login path.
    pub async fn start(&self, return_path: Option<&str>) -> LoginOutcome {
        let mut progress = Progress::new(LoginState::Idle);

        let return_path: &str = match return_path {
            Some(path) if is_local_path(path) => path,
            Some(path) => {
                tracing::warn!(return_path = %path, "ignoring non-local return path");
                &self.after_login_path
            }
            None => &self.after_login_path,
        };

        let pkce = self.provider.uses_pkce().then(pkce::Pkce::new);
        let (verifier, challenge) = match pkce {
            Some(p) => (Some(p.code_verifier), Some(p.code_challenge)),
            None => (None, None),
        };

        let state_token = match self.tokens.issue(return_path, verifier).await {
            Ok(token) => token,
            Err(e) => return self.fail(&mut progress, e),
        };
        progress.bind(&state_token);

        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let authorization_url =
            self.provider
                .authorization_url(&state_token, &scopes, challenge.as_deref());
        progress.advance(LoginState::Redirecting);

        LoginOutcome::Redirecting {
            authorization_url,
            state_token,
        }
    }

    /// `AwaitingCallback -> Exchanging -> Resolving -> Authenticated`, or `Failed`.
    ///
    /// `browser_state` is the state token the browser stored at `start`; it is
    /// required when browser binding is on.
    pub async fn callback(
        &self,
        params: &CallbackParams,
        browser_state: Option<&str>,
    ) -> LoginOutcome {
        let mut progress = Progress::new(LoginState::AwaitingCallback);
        match self.complete(params, browser_state, &mut progress).await {
            Ok((session, redirect_to)) => {
                progress.advance(LoginState::Authenticated);
                tracing::info!(
                    user_id = %session.user_id,
                    orcid = %session.external_id,
                    "login succeeded"
                );
                LoginOutcome::Authenticated {
                    session,
                    redirect_to,
                }
            }
            Err(e) => self.fail(&mut progress, e),
        }
    }

    async fn complete(
        &self,
        params: &CallbackParams,
        browser_state: Option<&str>,
        progress: &mut Progress,
    ) -> Result<(Session, String), AuthError> {
        let state_token = params.state.as_deref().unwrap_or_default();
        if !state_token.is_empty() {
            progress.bind(state_token);
        }

        if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
            // The attempt is dead either way; drop it so it cannot be replayed.
            if !state_token.is_empty() {
                let _ = self.tokens.validate_and_consume(state_token).await;
            }
            return Err(AuthError::ProviderDenied {
                error: error.to_string(),
                description: params.error_description.clone(),
            });
        }

        let attempt = self.tokens.validate_and_consume(state_token).await?;
        if self.bind_to_browser && browser_state != Some(state_token) {
            tracing::warn!(
                attempt = progress.attempt.as_deref().unwrap_or("-"),
                "state does not belong to this browser"
            );
            return Err(AuthError::InvalidState);
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(TokenExchangeError::MissingCode)?;

        progress.advance(LoginState::Exchanging);
        let identity = self
            .provider
            .exchange_code(code, attempt.code_verifier.as_deref())
            .await?;

        progress.advance(LoginState::Resolving);
        let user_id = match self.resolver.resolve(&identity, &self.policy).await {
            Ok(user_id) => user_id,
            Err(AuthError::LinkPersistence { user_id, reason }) => {
                self.resolver.discard(&user_id).await;
                return Err(AuthError::LinkPersistence { user_id, reason });
            }
            Err(e) => return Err(e),
        };

        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            external_id: identity.external_id,
            display_name: identity.display_name,
            expires_at: chrono::Utc::now() + self.session_ttl,
        };
        self.sessions.save_session(&session).await?;

        Ok((session, attempt.return_path))
    }

    fn fail(&self, progress: &mut Progress, error: AuthError) -> LoginOutcome {
        let reason = error.kind();
        let attempt = progress.attempt.clone().unwrap_or_else(|| "-".to_string());
        match &error {
            AuthError::ProviderDenied { error, description } => tracing::warn!(
                attempt = %attempt,
                at = %progress.state,
                provider_error = %error,
                description = description.as_deref().unwrap_or(""),
                "login refused by provider"
            ),
            AuthError::LinkPersistence { .. }
            | AuthError::Store(_)
            | AuthError::Session(_)
            | AuthError::Config(_) => tracing::error!(
                attempt = %attempt,
                at = %progress.state,
                error = %error,
                "login failed"
            ),
            _ => tracing::warn!(
                attempt = %attempt,
                at = %progress.state,
                error = %error,
                "login failed"
            ),
        }
        progress.advance(LoginState::Failed(reason));
        LoginOutcome::Failed {
            reason,
            redirect_to: self.error_login_path.clone(),
        }
    }
}
