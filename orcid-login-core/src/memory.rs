use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::{NewUser, StoreError, UserId, UserStore};

/// An account held by [`MemoryUserStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryUser {
    /// Login name
    pub name: String,
    /// Display name
    pub display_name: Option<String>,
    /// Assigned roles
    pub roles: BTreeSet<String>,
}

/// An in-memory implementation of [`UserStore`].
///
/// **Note**: This store is not persistent and will be cleared when the application restarts.
/// It is primarily intended for development and testing.
#[derive(Debug)]
pub struct MemoryUserStore {
    users: DashMap<UserId, MemoryUser>,
    links: DashMap<String, UserId>,
    /// role name -> permissions granted by the role
    roles: DashMap<String, BTreeSet<String>>,
    next_id: AtomicU64,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            links: DashMap::new(),
            roles: DashMap::new(),
            next_id: AtomicU64::new(1000),
        }
    }
}

impl MemoryUserStore {
    /// Create a new, empty `MemoryUserStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a role and the permissions it grants.
    pub fn with_role<I, S>(self, role: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.insert(
            role.to_string(),
            permissions.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Insert an account directly, bypassing role existence checks.
    pub fn insert_user(&self, name: &str, roles: &[&str]) -> UserId {
        let id = UserId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.users.insert(
            id.clone(),
            MemoryUser {
                name: name.to_string(),
                display_name: None,
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        id
    }

    /// Look up an account.
    pub fn user(&self, user_id: &UserId) -> Option<MemoryUser> {
        self.users.get(user_id).map(|u| u.value().clone())
    }

    /// Number of accounts.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of account links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// The account linked to an external identity.
    pub fn linked_user(&self, external_id: &str) -> Option<UserId> {
        self.links.get(external_id).map(|u| u.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user_by_external_link(
        &self,
        external_id: &str,
    ) -> Result<Option<UserId>, StoreError> {
        Ok(self.linked_user(external_id))
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserId, StoreError> {
        if self.users.iter().any(|u| u.value().name == user.name) {
            return Err(StoreError::Backend(format!(
                "user name `{}` is taken",
                user.name
            )));
        }
        let id = UserId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.users.insert(
            id.clone(),
            MemoryUser {
                name: user.name.clone(),
                display_name: user.display_name.clone(),
                roles: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<(), StoreError> {
        self.users
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UserNotFound(user_id.clone()))
    }

    async fn role_exists(&self, role: &str) -> Result<bool, StoreError> {
        Ok(self.roles.contains_key(role))
    }

    async fn assign_role(&self, user_id: &UserId, role: &str) -> Result<(), StoreError> {
        if !self.roles.contains_key(role) {
            return Err(StoreError::RoleNotFound(role.to_string()));
        }
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::UserNotFound(user_id.clone()))?;
        user.roles.insert(role.to_string());
        Ok(())
    }

    async fn user_has_role(&self, user_id: &UserId, role: &str) -> Result<bool, StoreError> {
        let user = self
            .users
            .get(user_id)
            .ok_or_else(|| StoreError::UserNotFound(user_id.clone()))?;
        Ok(user.roles.contains(role))
    }

    async fn user_has_permission(
        &self,
        user_id: &UserId,
        permission: &str,
    ) -> Result<bool, StoreError> {
        let roles = self
            .users
            .get(user_id)
            .map(|u| u.roles.clone())
            .ok_or_else(|| StoreError::UserNotFound(user_id.clone()))?;
        Ok(roles.iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|perms| perms.contains(permission))
        }))
    }

    async fn persist_link(&self, external_id: &str, user_id: &UserId) -> Result<(), StoreError> {
        if !self.users.contains_key(user_id) {
            return Err(StoreError::UserNotFound(user_id.clone()));
        }
        match self.links.entry(external_id.to_string()) {
            Entry::Occupied(existing) => Err(StoreError::LinkExists {
                external_id: external_id.to_string(),
                user_id: existing.get().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(user_id.clone());
                Ok(())
            }
        }
    }
}
