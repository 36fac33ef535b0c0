//! Background reclamation of stale refresh tokens and old audit entries.
//!
//! Each loop runs on its own schedule, independent of request handling.
//! A failed cycle logs and retries sooner; it never crashes the process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::{AuditConfig, TokenRetentionConfig};
use crate::services::tokens::RefreshTokenService;
use crate::store::AuthStore;

/// Periodically deletes refresh tokens past their retention window.
pub struct TokenCleanupService {
    tokens: RefreshTokenService,
    interval: Duration,
    retry: Duration,
}

impl TokenCleanupService {
    pub fn new(tokens: RefreshTokenService, config: &TokenRetentionConfig) -> Self {
        Self {
            tokens,
            interval: Duration::from_secs(config.cleanup_interval_secs),
            retry: Duration::from_secs(config.cleanup_retry_secs),
        }
    }

    /// Run until the token is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Token cleanup started");

        loop {
            let delay = match self.tokens.prune_expired().await {
                Ok(deleted) => {
                    if deleted > 0 {
                        tracing::info!(deleted, "Deleted stale refresh tokens");
                    }
                    self.interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "Token cleanup cycle failed");
                    self.retry
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Token cleanup stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Periodically deletes audit entries older than the retention window.
pub struct AuditCleanupService {
    store: Arc<dyn AuthStore>,
    retention_days: i64,
    interval: Duration,
    retry: Duration,
}

impl AuditCleanupService {
    pub fn new(store: Arc<dyn AuthStore>, config: &AuditConfig) -> Self {
        Self {
            store,
            retention_days: config.retention_days,
            interval: Duration::from_secs(config.cleanup_interval_secs),
            retry: Duration::from_secs(config.cleanup_retry_secs),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            retention_days = self.retention_days,
            "Audit cleanup started"
        );

        loop {
            let cutoff = Utc::now() - chrono::Duration::days(self.retention_days);
            let delay = match self.store.delete_audit_logs_before(cutoff).await {
                Ok(deleted) => {
                    if deleted > 0 {
                        tracing::info!(deleted, "Deleted old audit entries");
                    }
                    self.interval
                }
                Err(e) => {
                    tracing::error!(error = %e, "Audit cleanup cycle failed");
                    self.retry
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Audit cleanup stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
