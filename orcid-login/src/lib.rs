//! Login with ORCID for Rust web services.
//!
//! This crate serves as a facade, re-exporting functionality from the other `orcid-login-*`
//! crates based on enabled features.

pub use orcid_login_core as core;

#[cfg(feature = "flow")]
pub use orcid_login_flow as flow;

#[cfg(feature = "session")]
pub use orcid_login_session as session;

#[cfg(feature = "orcid")]
pub use orcid_login_providers_orcid as orcid;

#[cfg(feature = "axum")]
pub use orcid_login_axum as axum;

pub use orcid_login_core::{AccessPolicy, AuthError, FailureKind, LoginConfig, UserStore};

#[cfg(feature = "flow")]
pub use orcid_login_flow::{LoginOrchestrator, LoginOutcome, LoginState};

#[cfg(feature = "orcid")]
pub use orcid_login_providers_orcid::OrcidProvider;
