use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use orcid_login_axum::{
    flow_cookie_name, AuthSession, OrcidLoginAxumExt, OrcidLoginState, SessionConfig, FLOW_COOKIE,
};
use orcid_login_core::{
    ExternalIdentity, LoginConfig, MemoryUserStore, OAuthProvider, OAuthToken, ProviderCredential,
    TokenExchangeError,
};
use orcid_login_flow::LoginOrchestrator;
use secrecy::SecretString;
use tower::ServiceExt;
use tower_cookies::CookieManagerLayer;

const ORCID: &str = "0000-0002-1825-0097";

struct StubProvider;

#[async_trait]
impl OAuthProvider for StubProvider {
    fn provider_id(&self) -> &str {
        "orcid"
    }

    fn authorization_url(&self, state: &str, _scopes: &[&str], _challenge: Option<&str>) -> String {
        format!("https://orcid.test/oauth/authorize?state={}", state)
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<ExternalIdentity, TokenExchangeError> {
        Ok(ExternalIdentity {
            provider_id: "orcid".to_string(),
            external_id: ORCID.to_string(),
            display_name: Some("Josiah Carberry".to_string()),
            token: OAuthToken {
                access_token: SecretString::from("token".to_string()),
                token_type: "bearer".to_string(),
                expires_in: None,
                refresh_token: None,
                scopes: BTreeSet::new(),
            },
        })
    }
}

async fn me(AuthSession(session): AuthSession) -> String {
    session.external_id
}

fn app() -> Router {
    let mut config = LoginConfig::new(ProviderCredential {
        client_id: "APP-TESTCLIENT".to_string(),
        client_secret: SecretString::from("secret".to_string()),
        redirect_uri: "http://localhost/login-orcid/callback".to_string(),
    });
    config.policy.create_users = true;

    let orchestrator = LoginOrchestrator::new(
        &config,
        Arc::new(StubProvider),
        Arc::new(MemoryUserStore::new()),
    );
    let state = OrcidLoginState::new(
        orchestrator,
        SessionConfig {
            secure: false,
            ..SessionConfig::default()
        },
    );

    state
        .orchestrator
        .axum_router::<OrcidLoginState>()
        .route("/me", get(me))
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

fn get_request(uri: &str, cookie: Option<String>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}=", name)))
        .map(|v| {
            v.split(';')
                .next()
                .unwrap()
                .split_once('=')
                .unwrap()
                .1
                .to_string()
        })
}

fn flow_cookie(state: &str) -> String {
    format!("{}={}", flow_cookie_name(state), state)
}

async fn start_login(app: &Router, uri: &str) -> String {
    let response = app.clone().oneshot(get_request(uri, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let flow = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{}_", FLOW_COOKIE)))
        .expect("flow cookie")
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let (name, state) = flow.split_once('=').unwrap();
    assert_eq!(name, flow_cookie_name(state));
    let state = state.to_string();
    assert_eq!(
        location(&response),
        format!("https://orcid.test/oauth/authorize?state={}", state)
    );
    state
}

#[tokio::test]
async fn test_login_and_callback() {
    let app = app();
    let state = start_login(&app, "/login-orcid?return_to=%2Fprojects%3Fpage%3D2").await;

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/login-orcid/callback?code=abc&state={}", state),
            Some(flow_cookie(&state)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/projects?page=2");

    let session_id = set_cookie(&response, "orcid_login_session").expect("session cookie");
    let response = app
        .clone()
        .oneshot(get_request(
            "/me",
            Some(format!("orcid_login_session={}", session_id)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], ORCID.as_bytes());
}

#[tokio::test]
async fn test_logins_from_two_tabs_both_complete() {
    let app = app();
    let first = start_login(&app, "/login-orcid?return_to=%2Ffirst").await;
    let second = start_login(&app, "/login-orcid?return_to=%2Fsecond").await;
    assert_ne!(first, second);

    // The browser now holds both flow cookies and sends them with every callback.
    let jar = format!("{}; {}", flow_cookie(&first), flow_cookie(&second));
    for (state, expected) in [(&first, "/first"), (&second, "/second")] {
        let response = app
            .clone()
            .oneshot(get_request(
                &format!("/login-orcid/callback?code=abc&state={}", state),
                Some(jar.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), expected);
        assert!(set_cookie(&response, "orcid_login_session").is_some());
    }
}

#[tokio::test]
async fn test_flow_cookie_of_another_attempt_is_refused() {
    let app = app();
    let first = start_login(&app, "/login-orcid").await;
    let second = start_login(&app, "/login-orcid").await;

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/login-orcid/callback?code=abc&state={}", first),
            Some(flow_cookie(&second)),
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "/login-orcid/failed");
    assert!(set_cookie(&response, "orcid_login_session").is_none());
}

#[tokio::test]
async fn test_callback_from_other_browser_fails() {
    let app = app();
    let state = start_login(&app, "/login-orcid").await;

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/login-orcid/callback?code=abc&state={}", state),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login-orcid/failed");
    assert!(set_cookie(&response, "orcid_login_session").is_none());
}

#[tokio::test]
async fn test_provider_error_redirects_to_failure_page() {
    let app = app();
    let state = start_login(&app, "/login-orcid").await;

    let response = app
        .clone()
        .oneshot(get_request(
            &format!(
                "/login-orcid/callback?error=access_denied&error_description=User%20denied&state={}",
                state
            ),
            Some(flow_cookie(&state)),
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "/login-orcid/failed");

    let page = app
        .clone()
        .oneshot(get_request("/login-orcid/failed", None))
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(page.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("Login with ORCID failed"));
    assert!(!body.contains("access_denied"));
}

#[tokio::test]
async fn test_open_redirect_is_refused() {
    let app = app();
    let state = start_login(&app, "/login-orcid?return_to=%2F%2Fevil.example%2F").await;

    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/login-orcid/callback?code=abc&state={}", state),
            Some(flow_cookie(&state)),
        ))
        .await
        .unwrap();
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = app();
    let state = start_login(&app, "/login-orcid").await;
    let response = app
        .clone()
        .oneshot(get_request(
            &format!("/login-orcid/callback?code=abc&state={}", state),
            Some(flow_cookie(&state)),
        ))
        .await
        .unwrap();
    let cookie = format!(
        "orcid_login_session={}",
        set_cookie(&response, "orcid_login_session").unwrap()
    );

    let response = app
        .clone()
        .oneshot(get_request("/login-orcid/logout", Some(cookie.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");

    let response = app
        .clone()
        .oneshot(get_request("/me", Some(cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
