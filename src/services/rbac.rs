//! Role and permission resolution and administration.

use std::sync::Arc;

use uuid::Uuid;

use crate::models::{AccountType, Permission, Role, RolePermission, UserRole};
use crate::services::error::ServiceError;
use crate::store::{AuthStore, StoreError};

/// Name of the role guarded against self-removal.
const ADMIN_ROLE: &str = "Admin";

#[derive(Clone)]
pub struct RbacService {
    store: Arc<dyn AuthStore>,
}

impl RbacService {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Role names for a user, sorted.
    pub async fn roles_of(&self, user_id: Uuid) -> Result<Vec<String>, ServiceError> {
        Ok(self.store.role_names_for_user(user_id).await?)
    }

    /// Distinct permission names across the user's roles, sorted.
    pub async fn permissions_of(&self, user_id: Uuid) -> Result<Vec<String>, ServiceError> {
        Ok(self.store.permission_names_for_user(user_id).await?)
    }

    /// Pick the role a new registration gets: the role named by the account
    /// type when it exists, otherwise the store's default role.
    pub async fn default_role_for(
        &self,
        account_type: Option<AccountType>,
    ) -> Result<Option<Role>, ServiceError> {
        if let Some(account_type) = account_type {
            if let Some(role) = self.store.find_role_by_name(account_type.role_name()).await? {
                return Ok(Some(role));
            }
        }
        Ok(self.store.find_default_role().await?)
    }

    /// Assign a role by name. Returns false when already assigned.
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_name: &str,
        assigned_by: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        let role = self
            .store
            .find_role_by_name(role_name)
            .await?
            .ok_or(ServiceError::RoleNotFound)?;

        if self.store.find_user_by_id(user_id).await?.is_none() {
            return Err(ServiceError::UserNotFound);
        }

        let assigned = self
            .store
            .assign_role(&UserRole::new(user_id, role.id, assigned_by))
            .await?;
        if assigned {
            tracing::info!(user_id = %user_id, role = %role_name, "Role assigned");
        }
        Ok(assigned)
    }

    /// Remove a role by name. An actor cannot strip their own admin role.
    pub async fn remove_role(
        &self,
        user_id: Uuid,
        role_name: &str,
        removed_by: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        if role_name == ADMIN_ROLE && removed_by == Some(user_id) {
            return Err(ServiceError::SelfAdminRemoval);
        }

        let role = self
            .store
            .find_role_by_name(role_name)
            .await?
            .ok_or(ServiceError::RoleNotFound)?;

        let removed = self.store.remove_role(user_id, role.id).await?;
        if removed {
            tracing::info!(user_id = %user_id, role = %role_name, "Role removed");
        }
        Ok(removed)
    }

    pub async fn create_role(
        &self,
        name: &str,
        description: &str,
        is_default: bool,
    ) -> Result<Role, ServiceError> {
        let role = Role::new(name.to_string(), description.to_string(), is_default);
        match self.store.insert_role(&role).await {
            Ok(()) => Ok(role),
            Err(StoreError::Conflict(_)) => Err(ServiceError::RoleAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_permission(
        &self,
        name: &str,
        category: &str,
    ) -> Result<Permission, ServiceError> {
        let permission = Permission::new(name.to_string(), category.to_string());
        match self.store.insert_permission(&permission).await {
            Ok(()) => Ok(permission),
            Err(StoreError::Conflict(_)) => Err(ServiceError::PermissionAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Grant a permission to a role, both by name. Returns false when the
    /// grant already exists.
    pub async fn grant_permission(
        &self,
        role_name: &str,
        permission_name: &str,
        granted_by: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        let role = self
            .store
            .find_role_by_name(role_name)
            .await?
            .ok_or(ServiceError::RoleNotFound)?;
        let permission = self
            .store
            .find_permission_by_name(permission_name)
            .await?
            .ok_or(ServiceError::PermissionNotFound)?;

        Ok(self
            .store
            .grant_permission(&RolePermission::new(role.id, permission.id, granted_by))
            .await?)
    }

    /// Revoke a permission from a role. Returns false when it was not
    /// granted.
    pub async fn revoke_permission(
        &self,
        role_name: &str,
        permission_name: &str,
    ) -> Result<bool, ServiceError> {
        let role = self
            .store
            .find_role_by_name(role_name)
            .await?
            .ok_or(ServiceError::RoleNotFound)?;
        let permission = self
            .store
            .find_permission_by_name(permission_name)
            .await?
            .ok_or(ServiceError::PermissionNotFound)?;

        Ok(self
            .store
            .revoke_permission(role.id, permission.id)
            .await?)
    }
}
