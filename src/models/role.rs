//! Role and permission models with their assignment/grant join rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity. `is_default` marks the fallback role assigned at
/// registration when no account type maps to a known role.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: String, description: String, is_default: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            is_default,
            created_at: Utc::now(),
        }
    }
}

/// Permission entity, grouped by category (e.g. "course", "user").
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(name: String, category: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            category,
            created_at: Utc::now(),
        }
    }
}

/// (user, role) assignment. Unique per pair.
#[derive(Debug, Clone, FromRow)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<Uuid>,
}

impl UserRole {
    pub fn new(user_id: Uuid, role_id: Uuid, assigned_by: Option<Uuid>) -> Self {
        Self {
            user_id,
            role_id,
            assigned_at: Utc::now(),
            assigned_by,
        }
    }
}

/// (role, permission) grant. Unique per pair.
#[derive(Debug, Clone, FromRow)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub granted_at: DateTime<Utc>,
    pub granted_by: Option<Uuid>,
}

impl RolePermission {
    pub fn new(role_id: Uuid, permission_id: Uuid, granted_by: Option<Uuid>) -> Self {
        Self {
            role_id,
            permission_id,
            granted_at: Utc::now(),
            granted_by,
        }
    }
}
