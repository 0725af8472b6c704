//! Axum integration for ORCID login.
//!
//! Mount [`OrcidLoginAxumExt::axum_router`] and add `tower_cookies::CookieManagerLayer`
//! to the application; the routes and the [`AuthSession`] extractor read and write
//! cookies through it.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use orcid_login_flow::LoginOrchestrator;
use std::sync::Arc;
pub use tower_cookies::cookie::SameSite;
pub use tower_cookies::Cookie;
use tower_cookies::Cookies;

pub mod helpers;

pub use helpers::*;

#[derive(Clone)]
pub struct OrcidLoginState {
    pub orchestrator: Arc<LoginOrchestrator>,
    pub session_config: SessionConfig,
}

impl OrcidLoginState {
    pub fn new(orchestrator: LoginOrchestrator, session_config: SessionConfig) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            session_config,
        }
    }
}

impl From<LoginOrchestrator> for OrcidLoginState {
    fn from(orchestrator: LoginOrchestrator) -> Self {
        Self::new(orchestrator, SessionConfig::default())
    }
}

impl FromRef<OrcidLoginState> for Arc<LoginOrchestrator> {
    fn from_ref(state: &OrcidLoginState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<OrcidLoginState> for Arc<dyn SessionStore> {
    fn from_ref(state: &OrcidLoginState) -> Self {
        state.orchestrator.sessions().clone()
    }
}

impl FromRef<OrcidLoginState> for SessionConfig {
    fn from_ref(state: &OrcidLoginState) -> Self {
        state.session_config.clone()
    }
}

/// The extractor for a validated session.
pub struct AuthSession(pub Session);

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    Arc<dyn SessionStore>: FromRef<S>,
    SessionConfig: FromRef<S>,
{
    type Rejection = OrcidLoginAxumError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session_store = Arc::<dyn SessionStore>::from_ref(state);
        let session_config = SessionConfig::from_ref(state);
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|e| OrcidLoginAxumError::Internal(e.1.to_string()))?;

        let session = helpers::get_session(&session_store, &session_config, &cookies).await?;

        Ok(AuthSession(session))
    }
}

pub trait OrcidLoginAxumExt {
    /// Routes for `/login-orcid`, its callback, logout and the failure page.
    fn axum_router<S>(&self) -> axum::Router<S>
    where
        S: Clone + Send + Sync + 'static,
        Arc<LoginOrchestrator>: FromRef<S>,
        SessionConfig: FromRef<S>,
        Arc<dyn SessionStore>: FromRef<S>;
}

impl OrcidLoginAxumExt for LoginOrchestrator {
    fn axum_router<S>(&self) -> axum::Router<S>
    where
        S: Clone + Send + Sync + 'static,
        Arc<LoginOrchestrator>: FromRef<S>,
        SessionConfig: FromRef<S>,
        Arc<dyn SessionStore>: FromRef<S>,
    {
        use axum::routing::get;
        axum::Router::new()
            .route("/login-orcid", get(helpers::axum_login_handler::<S>))
            .route(
                "/login-orcid/callback",
                get(helpers::axum_callback_handler::<S>),
            )
            .route("/login-orcid/logout", get(helpers::axum_logout_handler::<S>))
            .route("/login-orcid/failed", get(helpers::axum_failed_handler))
    }
}
