pub use orcid_login_session::{Session, SessionConfig, SessionStore};
use orcid_login_flow::{CallbackParams, LoginOrchestrator, LoginOutcome};
use axum::{
    extract::{FromRef, Query, State},
    http::{header::LOCATION, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

/// Prefix of the cookies holding a state token between `/login-orcid` and the callback.
pub const FLOW_COOKIE: &str = "orcid_login_flow";

/// One cookie per attempt, so logins started in several tabs do not clobber each other.
pub fn flow_cookie_name(state_token: &str) -> String {
    format!("{}_{}", FLOW_COOKIE, state_token)
}

#[derive(serde::Deserialize)]
pub struct LoginParams {
    /// Local path to land on after a successful login.
    pub return_to: Option<String>,
}

pub fn to_axum_same_site(ss: orcid_login_session::SameSite) -> SameSite {
    match ss {
        orcid_login_session::SameSite::Lax => SameSite::Lax,
        orcid_login_session::SameSite::Strict => SameSite::Strict,
        orcid_login_session::SameSite::None => SameSite::None,
    }
}

pub fn create_axum_cookie<'a>(config: &SessionConfig, value: String) -> Cookie<'a> {
    let mut cookie = Cookie::new(config.cookie_name.clone(), value);
    cookie.set_path(config.path.clone());
    cookie.set_secure(config.secure);
    cookie.set_http_only(config.http_only);
    cookie.set_same_site(to_axum_same_site(config.same_site));
    if let Some(max_age) = config.max_age {
        cookie.set_max_age(Some(tower_cookies::cookie::time::Duration::seconds(
            max_age.num_seconds(),
        )));
    }
    cookie
}

fn flow_cookie<'a>(config: &SessionConfig, state_token: String, ttl: chrono::Duration) -> Cookie<'a> {
    let mut cookie = Cookie::new(flow_cookie_name(&state_token), state_token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    // Lax still sends the cookie on the provider's top-level redirect back to us.
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(config.secure);
    cookie.set_max_age(Some(tower_cookies::cookie::time::Duration::seconds(
        ttl.num_seconds(),
    )));
    cookie
}

/// A `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Starts a login and redirects the browser to ORCID.
pub async fn axum_login_handler<S>(
    State(state): State<S>,
    Query(params): Query<LoginParams>,
    cookies: Cookies,
) -> Response
where
    S: Clone + Send + Sync + 'static,
    Arc<LoginOrchestrator>: FromRef<S>,
    SessionConfig: FromRef<S>,
{
    let orchestrator = Arc::<LoginOrchestrator>::from_ref(&state);
    let session_config = SessionConfig::from_ref(&state);

    let outcome = orchestrator.start(params.return_to.as_deref()).await;
    if let LoginOutcome::Redirecting { state_token, .. } = &outcome {
        cookies.add(flow_cookie(
            &session_config,
            state_token.clone(),
            orchestrator.state_ttl(),
        ));
    }
    found(outcome.location())
}

/// Receives the provider's redirect and finishes the login.
pub async fn axum_callback_handler<S>(
    State(state): State<S>,
    Query(params): Query<CallbackParams>,
    cookies: Cookies,
) -> Response
where
    S: Clone + Send + Sync + 'static,
    Arc<LoginOrchestrator>: FromRef<S>,
    SessionConfig: FromRef<S>,
{
    let orchestrator = Arc::<LoginOrchestrator>::from_ref(&state);
    let session_config = SessionConfig::from_ref(&state);

    let cookie_name = params.state.as_deref().map(flow_cookie_name);
    let browser_state = cookie_name
        .as_deref()
        .and_then(|name| cookies.get(name))
        .map(|c| c.value().to_string());
    if let (Some(name), Some(_)) = (cookie_name, &browser_state) {
        let mut remove_cookie = Cookie::new(name, "");
        remove_cookie.set_path("/");
        remove_cookie.set_secure(session_config.secure);
        cookies.remove(remove_cookie);
    }

    let outcome = orchestrator
        .callback(&params, browser_state.as_deref())
        .await;
    if let LoginOutcome::Authenticated { session, .. } = &outcome {
        cookies.add(create_axum_cookie(&session_config, session.id.clone()));
    }
    found(outcome.location())
}

/// Helper to handle logout by deleting the session from the store and clearing the cookie.
///
/// Returns a redirect to the specified URL.
pub async fn logout(
    cookies: Cookies,
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    redirect_to: &str,
) -> Result<Response, OrcidLoginAxumError> {
    let session_id = cookies
        .get(&config.cookie_name)
        .map(|c| c.value().to_string());

    if let Some(id) = session_id {
        store
            .delete_session(&id)
            .await
            .map_err(|e| OrcidLoginAxumError::Internal(e.to_string()))?;
    }

    let mut cookie = create_axum_cookie(&config, "".to_string());
    cookie.set_max_age(Some(tower_cookies::cookie::time::Duration::ZERO));
    cookies.remove(cookie);

    Ok(found(redirect_to))
}

pub async fn axum_logout_handler<S>(State(state): State<S>, cookies: Cookies) -> Response
where
    S: Clone + Send + Sync + 'static,
    SessionConfig: FromRef<S>,
    Arc<dyn SessionStore>: FromRef<S>,
{
    let session_config = SessionConfig::from_ref(&state);
    let session_store = Arc::<dyn SessionStore>::from_ref(&state);

    logout(cookies, session_store, session_config, "/")
        .await
        .into_response()
}

/// The generic page every failed login lands on. Details are only in the server log.
pub async fn axum_failed_handler() -> impl IntoResponse {
    (
        StatusCode::UNAUTHORIZED,
        Html(
            "<h1>Login with ORCID failed</h1>\
             <p>We could not sign you in. Please try again or contact the site administrator.</p>\
             <p><a href=\"/login-orcid\">Try again</a></p>",
        ),
    )
}

#[derive(Debug)]
pub enum OrcidLoginAxumError {
    Unauthorized(String),
    Internal(String),
}

impl IntoResponse for OrcidLoginAxumError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            OrcidLoginAxumError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            OrcidLoginAxumError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };
        (status, message).into_response()
    }
}

pub async fn get_session(
    store: &Arc<dyn SessionStore>,
    config: &SessionConfig,
    cookies: &Cookies,
) -> Result<Session, OrcidLoginAxumError> {
    let session_id = cookies
        .get(&config.cookie_name)
        .map(|c| c.value().to_string())
        .ok_or_else(|| OrcidLoginAxumError::Unauthorized("Missing session cookie".to_string()))?;

    let session = store
        .load_session(&session_id)
        .await
        .map_err(|e| OrcidLoginAxumError::Internal(e.to_string()))?
        .ok_or_else(|| OrcidLoginAxumError::Unauthorized("Invalid session".to_string()))?;

    Ok(session)
}
