//! # ORCID Login Flow
//!
//! `orcid-login-flow` runs the Authorization Code login on top of the core traits and
//! the attempt/session stores. It knows nothing about HTTP; the adapters translate
//! its outcomes into redirects and cookies.
//!
//! ## Key Components
//!
//! - **[`StateTokenManager`]**: Issues single-use anti-CSRF state tokens bound to a login attempt.
//! - **[`IdentityResolver`]**: Maps a verified ORCID iD to a local account, creating it when allowed.
//! - **[`LoginOrchestrator`]**: The login state machine, from `start` to an authenticated session.

/// Login state machine.
pub mod orchestrator;
/// Account lookup and creation.
pub mod resolver;
/// State token issue and validation.
pub mod state_token;

pub use orchestrator::{CallbackParams, LoginOrchestrator, LoginOutcome, LoginState};
pub use resolver::{format_username, IdentityResolver};
pub use state_token::StateTokenManager;
