//! # Axum ORCID Example
//!
//! Serves "Login with ORCID" on http://localhost:3000 with an in-memory user store.
//!
//! Configuration is read from `ORCID_*` environment variables (a `.env` file is loaded
//! first). At least the following must be set:
//! - `ORCID_CLIENT_ID`
//! - `ORCID_CLIENT_SECRET`
//! - `ORCID_REDIRECT_URI` (e.g. `http://localhost:3000/login-orcid/callback`)
//!
//! Set `ORCID_SANDBOX=true` to use sandbox.orcid.org and `REDIS_URL` to keep login
//! attempts and sessions in Redis. `GET /admin/config-schema` lists every setting.

use std::sync::Arc;

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use orcid_login::axum::{AuthSession, OrcidLoginAxumExt, OrcidLoginState, SessionConfig};
use orcid_login::core::{config_schema, MemoryUserStore};
use orcid_login::session::{MemoryStore, RedisStore};
use orcid_login::{LoginConfig, LoginOrchestrator, OrcidProvider};
use tower_cookies::CookieManagerLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LoginConfig::from_env()?;
    let provider = OrcidProvider::from_config(&config)?;

    let users = Arc::new(
        MemoryUserStore::new()
            .with_role("orcid-user", ["view-profile"])
            .with_role("researcher", ["view-profile", "submit-dataset"])
            .with_role("administrator", ["administer-users"]),
    );

    let orchestrator = LoginOrchestrator::new(&config, Arc::new(provider), users);
    let orchestrator = if let Ok(redis_url) = std::env::var("REDIS_URL") {
        tracing::info!(redis_url = %redis_url, "using Redis for login attempts and sessions");
        let store = Arc::new(RedisStore::new(&redis_url, "orcid-login".into())?);
        orchestrator.with_stores(store.clone(), store)
    } else {
        tracing::info!("using in-memory login attempts and sessions");
        let store = Arc::new(MemoryStore::new());
        orchestrator.with_stores(store.clone(), store)
    };

    let secure = config.credential.redirect_uri.starts_with("https://");
    let state = OrcidLoginState::new(
        orchestrator,
        SessionConfig {
            secure,
            max_age: Some(config.session_ttl),
            ..Default::default()
        },
    );

    let app = Router::new()
        .route("/", get(index))
        .route("/protected", get(protected))
        .route("/admin/config-schema", get(schema))
        .merge(state.orchestrator.axum_router::<OrcidLoginState>())
        .layer(CookieManagerLayer::new())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!(sandbox = config.sandbox, "ORCID login example running on http://localhost:3000");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    Html(
        "<h1>ORCID login example</h1>\
         <p><a href=\"/login-orcid?return_to=/protected\">Login with ORCID</a></p>",
    )
}

async fn protected(AuthSession(session): AuthSession) -> impl IntoResponse {
    format!(
        "Hello, {}! Your ORCID iD is {} and your account is {}. <br><a href=\"/login-orcid/logout\">Logout</a>",
        session.display_name.as_deref().unwrap_or("researcher"),
        session.external_id,
        session.user_id,
    )
}

async fn schema() -> impl IntoResponse {
    Json(config_schema())
}
