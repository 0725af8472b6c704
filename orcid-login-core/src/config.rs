//! Typed, validated configuration for the ORCID login service.
//!
//! Values come either from `ORCID_*` environment variables ([`LoginConfig::from_env`])
//! or from any key/value lookup the host provides ([`LoginConfig::from_lookup`]).

use std::collections::BTreeSet;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::AuthError;

/// Default scope requested from ORCID: sign-in only, no record access.
pub const DEFAULT_SCOPE: &str = "/authenticate";
/// Default username pattern for created accounts.
pub const DEFAULT_USERNAME_FORMAT: &str = "orcid-{orcid}";
/// Default generic failure page.
pub const DEFAULT_ERROR_PATH: &str = "/login-orcid/failed";

const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// OAuth client registration at the provider.
#[derive(Debug, Clone)]
pub struct ProviderCredential {
    /// The client ID issued by ORCID
    pub client_id: String,
    /// The client secret issued by ORCID; never logged
    pub client_secret: SecretString,
    /// The redirect URI registered for this client
    pub redirect_uri: String,
}

/// Rules deciding who may log in and what happens to unknown identities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Create a local account for identities without a link
    pub create_users: bool,
    /// Role every created account must receive
    pub required_role: Option<String>,
    /// Additional roles given to created accounts
    pub add_roles: Vec<String>,
    /// Accounts holding any of these roles may not log in with ORCID
    pub disallowed_roles: BTreeSet<String>,
    /// Accounts holding any of these permissions may not log in with ORCID
    pub disallowed_permissions: BTreeSet<String>,
}

impl AccessPolicy {
    /// Every role assigned to a newly created account, required role first, without duplicates.
    pub fn roles_for_new_users(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = Vec::new();
        for role in self.required_role.iter().chain(self.add_roles.iter()) {
            if !roles.contains(&role.as_str()) {
                roles.push(role);
            }
        }
        roles
    }
}

/// Complete configuration of the login service.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// OAuth client registration
    pub credential: ProviderCredential,
    /// Account creation and disallow rules
    pub policy: AccessPolicy,
    /// Use the ORCID sandbox instead of production
    pub sandbox: bool,
    /// Scopes requested at the authorization endpoint
    pub scopes: Vec<String>,
    /// Where to send the user after login when no return path was given
    pub after_login_path: String,
    /// Where to send the user on any failure
    pub error_login_path: String,
    /// Pattern for new account names; supports `{orcid}` and `{name}`
    pub username_format: String,
    /// Lifetime of a pending login attempt
    pub state_ttl: chrono::Duration,
    /// Bound on the token endpoint request
    pub http_timeout: Duration,
    /// Lifetime of the session created after login
    pub session_ttl: chrono::Duration,
}

impl LoginConfig {
    /// A configuration with defaults for everything but the credential.
    pub fn new(credential: ProviderCredential) -> Self {
        Self {
            credential,
            policy: AccessPolicy::default(),
            sandbox: false,
            scopes: vec![DEFAULT_SCOPE.to_string()],
            after_login_path: "/".to_string(),
            error_login_path: DEFAULT_ERROR_PATH.to_string(),
            username_format: DEFAULT_USERNAME_FORMAT.to_string(),
            state_ttl: chrono::Duration::minutes(10),
            http_timeout: Duration::from_secs(10),
            session_ttl: chrono::Duration::hours(24),
        }
    }

    /// Loads the configuration from `ORCID_*` environment variables.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from an arbitrary key/value lookup.
    ///
    /// Keys are the `ORCID_*` names listed by [`config_schema`]. Missing optional keys
    /// keep their defaults; the result is validated before it is returned.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require =
            |key: &str| get(key).ok_or_else(|| AuthError::Config(format!("{} is not set", key)));

        let credential = ProviderCredential {
            client_id: require("ORCID_CLIENT_ID")?,
            client_secret: SecretString::from(require("ORCID_CLIENT_SECRET")?),
            redirect_uri: require("ORCID_REDIRECT_URI")?,
        };
        let mut config = Self::new(credential);

        if let Some(v) = get("ORCID_SANDBOX") {
            config.sandbox = parse_bool("ORCID_SANDBOX", &v)?;
        }
        if let Some(v) = get("ORCID_SCOPES") {
            config.scopes = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = get("ORCID_CREATE_USERS") {
            config.policy.create_users = parse_bool("ORCID_CREATE_USERS", &v)?;
        }
        config.policy.required_role = get("ORCID_REQUIRED_ROLE");
        if let Some(v) = get("ORCID_ADD_ROLES") {
            config.policy.add_roles = split_list(&v).collect();
        }
        if let Some(v) = get("ORCID_DISALLOW_ROLES") {
            config.policy.disallowed_roles = split_list(&v).collect();
        }
        if let Some(v) = get("ORCID_DISALLOW_PERMISSIONS") {
            config.policy.disallowed_permissions = split_list(&v).collect();
        }
        if let Some(v) = get("ORCID_AFTER_LOGIN_PATH") {
            config.after_login_path = v;
        }
        if let Some(v) = get("ORCID_ERROR_LOGIN_PATH") {
            config.error_login_path = v;
        }
        if let Some(v) = get("ORCID_USERNAME_FORMAT") {
            config.username_format = v;
        }
        if let Some(v) = get("ORCID_STATE_TTL_SECS") {
            config.state_ttl = chrono::Duration::seconds(parse_secs("ORCID_STATE_TTL_SECS", &v)?);
        }
        if let Some(v) = get("ORCID_HTTP_TIMEOUT_SECS") {
            config.http_timeout =
                Duration::from_secs(parse_secs("ORCID_HTTP_TIMEOUT_SECS", &v)? as u64);
        }
        if let Some(v) = get("ORCID_SESSION_TTL_SECS") {
            config.session_ttl =
                chrono::Duration::seconds(parse_secs("ORCID_SESSION_TTL_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks every field for consistency.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.credential.client_id.trim().is_empty() {
            return Err(AuthError::Config("client ID is empty".into()));
        }
        if self.credential.client_secret.expose_secret().trim().is_empty() {
            return Err(AuthError::Config("client secret is empty".into()));
        }
        let redirect = url::Url::parse(&self.credential.redirect_uri)
            .map_err(|e| AuthError::Config(format!("invalid redirect URI: {}", e)))?;
        if !matches!(redirect.scheme(), "http" | "https") {
            return Err(AuthError::Config(
                "redirect URI must use http or https".into(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(AuthError::Config("at least one scope is required".into()));
        }
        for (name, path) in [
            ("after-login path", &self.after_login_path),
            ("error path", &self.error_login_path),
        ] {
            if !is_local_path(path) {
                return Err(AuthError::Config(format!(
                    "{} must be a local absolute path, got `{}`",
                    name, path
                )));
            }
        }
        if !self.username_format.contains("{orcid}") {
            return Err(AuthError::Config(
                "username format must contain {orcid} to keep names unique".into(),
            ));
        }
        if self.state_ttl <= chrono::Duration::zero() {
            return Err(AuthError::Config("state TTL must be positive".into()));
        }
        if self.session_ttl <= chrono::Duration::zero() {
            return Err(AuthError::Config("session TTL must be positive".into()));
        }
        if self.http_timeout.is_zero() || self.http_timeout > MAX_HTTP_TIMEOUT {
            return Err(AuthError::Config(format!(
                "HTTP timeout must be between 1 and {} seconds",
                MAX_HTTP_TIMEOUT.as_secs()
            )));
        }
        let roles = self.policy.roles_for_new_users();
        if let Some(role) = roles
            .iter()
            .find(|r| self.policy.disallowed_roles.contains(**r))
        {
            return Err(AuthError::Config(format!(
                "role `{}` is both assigned to new users and disallowed",
                role
            )));
        }
        Ok(())
    }
}

/// Whether `path` is a same-origin absolute path that is safe to redirect to.
pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AuthError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AuthError::Config(format!(
            "{} must be a boolean, got `{}`",
            key, value
        ))),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<i64, AuthError> {
    value
        .parse::<u32>()
        .map(i64::from)
        .map_err(|_| AuthError::Config(format!("{} must be a number of seconds", key)))
}

fn split_list<T: From<String>>(value: &str) -> impl Iterator<Item = T> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| T::from(s.to_string()))
}

/// The kind of input an admin UI should render for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-line text
    Text,
    /// Text that must be masked and never echoed back
    Secret,
    /// On/off switch
    Bool,
    /// Multi-select over the host's roles
    RoleList,
    /// Multi-select over the host's permissions
    PermissionList,
    /// Local absolute path
    Path,
    /// Number of seconds
    Seconds,
}

/// One entry of the declarative admin configuration schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigField {
    /// Configuration key
    pub name: &'static str,
    /// Input type
    pub kind: FieldKind,
    /// Label shown to the administrator
    pub label: &'static str,
    /// Whether the service refuses to start without it
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind, label: &'static str, required: bool) -> ConfigField {
    ConfigField {
        name,
        kind,
        label,
        required,
    }
}

/// The admin configuration schema, in display order.
///
/// Rendering is left to the host; this only describes the fields.
pub fn config_schema() -> Vec<ConfigField> {
    use FieldKind::*;
    vec![
        field("ORCID_CLIENT_ID", Text, "Client ID", true),
        field("ORCID_CLIENT_SECRET", Secret, "Client Secret", true),
        field("ORCID_REDIRECT_URI", Text, "Redirect URI registered at ORCID", true),
        field("ORCID_SANDBOX", Bool, "Use the ORCID sandbox", false),
        field("ORCID_SCOPES", Text, "Requested scopes", false),
        field("ORCID_CREATE_USERS", Bool, "Create a separate user for each ORCID user", false),
        field("ORCID_REQUIRED_ROLE", Text, "Role required for ORCID users", false),
        field("ORCID_ADD_ROLES", RoleList, "Roles to add to users that have ORCID login", false),
        field("ORCID_DISALLOW_ROLES", RoleList, "Disallow ORCID login for roles", false),
        field(
            "ORCID_DISALLOW_PERMISSIONS",
            PermissionList,
            "Disallow ORCID login for users having permissions",
            false,
        ),
        field("ORCID_AFTER_LOGIN_PATH", Path, "Page to show after login", false),
        field("ORCID_ERROR_LOGIN_PATH", Path, "Page to show when login fails", false),
        field("ORCID_USERNAME_FORMAT", Text, "Name format for created users", false),
        field("ORCID_STATE_TTL_SECS", Seconds, "Login attempt lifetime", false),
        field("ORCID_HTTP_TIMEOUT_SECS", Seconds, "Token request timeout", false),
        field("ORCID_SESSION_TTL_SECS", Seconds, "Session lifetime", false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("ORCID_CLIENT_ID", "APP-TESTCLIENT"),
        ("ORCID_CLIENT_SECRET", "shh"),
        ("ORCID_REDIRECT_URI", "https://example.org/login-orcid/callback"),
    ];

    #[test]
    fn test_defaults() {
        let config = LoginConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.scopes, vec!["/authenticate".to_string()]);
        assert!(!config.policy.create_users);
        assert!(!config.sandbox);
        assert_eq!(config.state_ttl, chrono::Duration::minutes(10));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.error_login_path, DEFAULT_ERROR_PATH);
    }

    #[test]
    fn test_policy_lists() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("ORCID_CREATE_USERS", "yes"),
            ("ORCID_REQUIRED_ROLE", "orcid-user"),
            ("ORCID_ADD_ROLES", "researcher, orcid-user"),
            ("ORCID_DISALLOW_ROLES", "superuser,editor"),
            ("ORCID_DISALLOW_PERMISSIONS", "page-edit"),
        ]);
        let config = LoginConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.policy.create_users);
        assert_eq!(
            config.policy.roles_for_new_users(),
            vec!["orcid-user", "researcher"]
        );
        assert!(config.policy.disallowed_roles.contains("editor"));
        assert!(config.policy.disallowed_permissions.contains("page-edit"));
    }

    #[test]
    fn test_missing_secret() {
        let err = LoginConfig::from_lookup(lookup(&BASE[..1])).unwrap_err();
        assert!(err.to_string().contains("ORCID_CLIENT_SECRET"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ORCID_CREATE_USERS", "maybe"));
        assert!(LoginConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = BASE.to_vec();
        pairs.push(("ORCID_ERROR_LOGIN_PATH", "https://evil.example/"));
        assert!(LoginConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = BASE.to_vec();
        pairs.push(("ORCID_HTTP_TIMEOUT_SECS", "600"));
        assert!(LoginConfig::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("ORCID_REQUIRED_ROLE", "orcid-user"),
            ("ORCID_DISALLOW_ROLES", "orcid-user"),
        ]);
        assert!(LoginConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_local_paths() {
        assert!(is_local_path("/members?tab=1"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("/\\evil.example"));
        assert!(!is_local_path("https://evil.example"));
        assert!(!is_local_path("relative"));
    }

    #[test]
    fn test_schema_lists_required_credential_fields() {
        let schema = config_schema();
        let required: Vec<_> = schema.iter().filter(|f| f.required).map(|f| f.name).collect();
        assert_eq!(
            required,
            vec!["ORCID_CLIENT_ID", "ORCID_CLIENT_SECRET", "ORCID_REDIRECT_URI"]
        );
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json[1]["kind"], "secret");
    }
}
