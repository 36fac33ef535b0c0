//! Best-effort audit trail. Failures are logged, never propagated, so an
//! unavailable audit table cannot break an auth flow.

use std::sync::Arc;

use crate::models::AuditLog;
use crate::store::AuthStore;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuthStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Write an audit entry inline.
    pub async fn record(&self, entry: AuditLog) {
        if let Err(e) = self.store.append_audit_log(&entry).await {
            tracing::warn!(
                error = %e,
                action = %entry.action,
                entity_type = %entry.entity_type,
                "Failed to write audit log"
            );
        }
    }

}
