//! Audit log model - append-only, never mutated after creation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One audit entry. Before/after snapshots are opaque serialized blobs;
/// the engine never reads them back.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
        user_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id,
            user_id,
            old_values: None,
            new_values: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip_address = ip.map(|s| s.to_string());
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(|s| s.to_string());
        self
    }

    /// Attach a serialized after-snapshot. Serialization failures degrade to
    /// no snapshot rather than failing the audited operation.
    pub fn with_new_values<T: Serialize>(mut self, values: &T) -> Self {
        self.new_values = serde_json::to_string(values).ok();
        self
    }

    /// Attach a serialized before-snapshot.
    pub fn with_old_values<T: Serialize>(mut self, values: &T) -> Self {
        self.old_values = serde_json::to_string(values).ok();
        self
    }
}
