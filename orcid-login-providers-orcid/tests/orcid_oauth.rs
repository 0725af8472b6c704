use std::time::Duration;

use orcid_login_core::{OAuthProvider, ProviderCredential, TokenExchangeError};
use orcid_login_providers_orcid::OrcidProvider;
use secrecy::{ExposeSecret, SecretString};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OrcidProvider {
    OrcidProvider::new(ProviderCredential {
        client_id: "APP-TESTCLIENT".to_string(),
        client_secret: SecretString::from("test_client_secret".to_string()),
        redirect_uri: format!("{}/login-orcid/callback", server.uri()),
    })
    .unwrap()
    .with_test_urls(
        format!("{}/oauth/authorize", server.uri()),
        format!("{}/oauth/token", server.uri()),
    )
}

#[tokio::test]
async fn test_orcid_oauth_flow() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("Accept", "application/json"))
        .and(body_string_contains("code=test_code"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("client_secret=test_client_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test_access_token",
            "token_type": "bearer",
            "refresh_token": "test_refresh_token",
            "expires_in": 631138518,
            "scope": "/authenticate",
            "name": "Sofia Garcia",
            "orcid": "0000-0001-2345-6789"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);

    let authorize_url = provider.authorization_url("test_state", &["/authenticate"], None);
    assert!(authorize_url.starts_with(&format!("{}/oauth/authorize", server.uri())));
    assert!(authorize_url.contains("state=test_state"));

    let identity = provider
        .exchange_code("test_code", None)
        .await
        .expect("Failed to exchange code");

    assert_eq!(identity.provider_id, "orcid");
    assert_eq!(identity.external_id, "0000-0001-2345-6789");
    assert_eq!(identity.display_name.as_deref(), Some("Sofia Garcia"));
    assert_eq!(identity.token.access_token.expose_secret(), "test_access_token");
    assert!(identity.scopes().contains("/authenticate"));
}

#[tokio::test]
async fn test_missing_orcid_is_not_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test_access_token",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .exchange_code("test_code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TokenExchangeError::MissingField("orcid")));
}

#[tokio::test]
async fn test_missing_access_token_is_not_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "",
            "orcid": "0000-0001-2345-6789"
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .exchange_code("test_code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TokenExchangeError::MissingField("access_token")));
}

#[tokio::test]
async fn test_invalid_orcid_checksum() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test_access_token",
            "orcid": "0000-0001-2345-6788"
        })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .exchange_code("test_code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TokenExchangeError::Malformed(_)));
}

#[tokio::test]
async fn test_provider_error_is_surfaced_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Reused authorization code: abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server)
        .exchange_code("abc123", None)
        .await
        .unwrap_err();
    match err {
        TokenExchangeError::Rejected { status, response } => {
            assert_eq!(status, 400);
            assert_eq!(response.error, "invalid_grant");
            assert_eq!(
                response.error_description.as_deref(),
                Some("Reused authorization code: abc123")
            );
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_token_endpoint_redirect_is_not_followed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Location", format!("{}/elsewhere/token", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/elsewhere/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test_access_token",
            "orcid": "0000-0001-2345-6789"
        })))
        .expect(0)
        .mount(&server)
        .await;

    let err = provider(&server)
        .exchange_code("test_code", None)
        .await
        .unwrap_err();
    match err {
        TokenExchangeError::Rejected { status, response } => {
            assert_eq!(status, 307);
            assert_eq!(response.error, "unexpected_response");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_token_endpoint_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(serde_json::json!({
                    "access_token": "late",
                    "orcid": "0000-0001-2345-6789"
                })),
        )
        .mount(&server)
        .await;

    let err = provider(&server)
        .with_timeout(Duration::from_millis(200))
        .exchange_code("test_code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TokenExchangeError::Timeout));
}

#[tokio::test]
async fn test_pkce_verifier_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("code_verifier=the_verifier"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test_access_token",
            "orcid": "0000-0002-1694-233X"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = provider(&server)
        .with_pkce(true)
        .exchange_code("test_code", Some("the_verifier"))
        .await
        .unwrap();
    assert_eq!(identity.external_id, "0000-0002-1694-233X");
    assert_eq!(identity.display_name, None);
}
