use std::sync::Arc;

use dashmap::DashMap;
use orcid_login_core::{
    config::DEFAULT_USERNAME_FORMAT, AccessPolicy, AuthError, ExternalIdentity, NewUser,
    StoreError, UserId, UserStore,
};
use tokio::sync::Mutex;

/// Maps a verified external identity onto a local account.
///
/// Existing links are returned as-is (after the disallow check). Unknown identities get a
/// new account when the policy allows it. Resolution of one external ID is serialized
/// within the process so concurrent first logins create a single account; across
/// processes the store's refusal to overwrite a link is the last line.
pub struct IdentityResolver {
    store: Arc<dyn UserStore>,
    username_format: String,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            username_format: DEFAULT_USERNAME_FORMAT.to_string(),
            in_flight: DashMap::new(),
        }
    }

    /// Name pattern for created accounts; `{orcid}` and `{name}` are substituted.
    pub fn with_username_format(mut self, format: impl Into<String>) -> Self {
        self.username_format = format.into();
        self
    }

    pub async fn resolve(
        &self,
        identity: &ExternalIdentity,
        policy: &AccessPolicy,
    ) -> Result<UserId, AuthError> {
        if let Some(user_id) = self.linked_user(identity, policy).await? {
            return Ok(user_id);
        }
        if !policy.create_users {
            tracing::info!(orcid = %identity.external_id, "no linked account and creation is disabled");
            return Err(AuthError::CreationDisabled);
        }

        let lock = self
            .in_flight
            .entry(identity.external_id.clone())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            // Whoever held the lock before us may have created the account.
            match self.linked_user(identity, policy).await {
                Ok(Some(user_id)) => Ok(user_id),
                Ok(None) => self.create_linked_user(identity, policy).await,
                Err(e) => Err(e),
            }
        };
        drop(lock);
        // Only the map still holds the lock: nobody is waiting on it.
        self.in_flight
            .remove_if(&identity.external_id, |_, m| Arc::strong_count(m) == 1);
        result
    }

    async fn linked_user(
        &self,
        identity: &ExternalIdentity,
        policy: &AccessPolicy,
    ) -> Result<Option<UserId>, AuthError> {
        let Some(user_id) = self
            .store
            .find_user_by_external_link(&identity.external_id)
            .await?
        else {
            return Ok(None);
        };
        self.check_allowed(&user_id, policy).await?;
        tracing::debug!(orcid = %identity.external_id, user_id = %user_id, "found linked account");
        Ok(Some(user_id))
    }

    async fn create_linked_user(
        &self,
        identity: &ExternalIdentity,
        policy: &AccessPolicy,
    ) -> Result<UserId, AuthError> {
        let roles = policy.roles_for_new_users();
        for role in &roles {
            if !self.store.role_exists(role).await? {
                tracing::error!(role = %role, "role configured for ORCID users does not exist");
                return Err(AuthError::RoleAssignment(role.to_string()));
            }
        }

        let new_user = NewUser {
            name: format_username(
                &self.username_format,
                &identity.external_id,
                identity.display_name.as_deref(),
            ),
            display_name: identity.display_name.clone(),
            external_id: identity.external_id.clone(),
        };
        let user_id = match self.store.create_user(&new_user).await {
            Ok(user_id) => user_id,
            Err(e) => {
                // Another process sharing the store may have won the race for this identity.
                if let Some(winner) = self.linked_user(identity, policy).await? {
                    tracing::info!(
                        orcid = %identity.external_id,
                        user_id = %winner,
                        error = %e,
                        "account was created concurrently"
                    );
                    return Ok(winner);
                }
                return Err(e.into());
            }
        };

        for role in &roles {
            if let Err(e) = self.store.assign_role(&user_id, role).await {
                tracing::error!(user_id = %user_id, role = %role, error = %e, "role assignment failed");
                self.discard(&user_id).await;
                return Err(AuthError::RoleAssignment(role.to_string()));
            }
        }

        match self
            .store
            .persist_link(&identity.external_id, &user_id)
            .await
        {
            Ok(()) => {}
            Err(StoreError::LinkExists {
                user_id: winner, ..
            }) => {
                tracing::info!(
                    orcid = %identity.external_id,
                    user_id = %winner,
                    duplicate = %user_id,
                    "identity was linked concurrently, dropping duplicate account"
                );
                self.discard(&user_id).await;
                self.check_allowed(&winner, policy).await?;
                return Ok(winner);
            }
            Err(e) => {
                return Err(AuthError::LinkPersistence {
                    user_id,
                    reason: e.to_string(),
                })
            }
        }

        tracing::info!(
            orcid = %identity.external_id,
            user_id = %user_id,
            name = %new_user.name,
            "created account for ORCID identity"
        );
        self.check_allowed(&user_id, policy).await?;
        Ok(user_id)
    }

    async fn check_allowed(&self, user_id: &UserId, policy: &AccessPolicy) -> Result<(), AuthError> {
        for role in &policy.disallowed_roles {
            if self.store.user_has_role(user_id, role).await? {
                return Err(AuthError::AccessDenied(format!(
                    "user {} holds disallowed role `{}`",
                    user_id, role
                )));
            }
        }
        for permission in &policy.disallowed_permissions {
            if self.store.user_has_permission(user_id, permission).await? {
                return Err(AuthError::AccessDenied(format!(
                    "user {} holds disallowed permission `{}`",
                    user_id, permission
                )));
            }
        }
        Ok(())
    }

    /// Best-effort removal of an account that must not survive a failed login.
    pub async fn discard(&self, user_id: &UserId) {
        match self.store.delete_user(user_id).await {
            Ok(()) => tracing::info!(user_id = %user_id, "removed account left by failed login"),
            Err(e) => tracing::error!(
                user_id = %user_id,
                error = %e,
                "could not remove account left by failed login; it has no ORCID link"
            ),
        }
    }
}

/// Builds an account name from `format`, lowercased and limited to `[a-z0-9._-]`.
pub fn format_username(format: &str, external_id: &str, display_name: Option<&str>) -> String {
    let raw = format
        .replace("{orcid}", external_id)
        .replace("{name}", display_name.unwrap_or(""));

    let mut name = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_') {
            c
        } else {
            '-'
        };
        if c == '-' && (name.is_empty() || name.ends_with('-')) {
            continue;
        }
        name.push(c);
    }
    while name.ends_with('-') {
        name.pop();
    }
    name
}
