//! Mercado Pago notification retry and retention
//!
//! Failed notifications are re-submitted through the webhook handler's
//! claim, so a retry racing a fresh provider delivery is processed once.

use heartbalance_billing::WebhookHandler;
use tracing::{error, info, warn};

/// Re-process failed notifications whose backoff has elapsed
pub async fn retry_failed_notifications(webhooks: &WebhookHandler, batch_size: i64) {
    match webhooks.retry_failed(batch_size).await {
        Ok(summary) if summary.attempted == 0 => {}
        Ok(summary) if summary.failed > 0 => {
            warn!(
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Notification retry pass finished with failures"
            );
        }
        Ok(summary) => {
            info!(
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                "Notification retry pass finished"
            );
        }
        Err(e) => {
            error!(error = %e, "Failed to run notification retry pass");
        }
    }
}

/// Delete settled notification records past the retention window
pub async fn cleanup_old_notifications(webhooks: &WebhookHandler, retention_days: i32) {
    match webhooks.cleanup_old_events(retention_days).await {
        Ok(0) => {}
        Ok(deleted) => {
            info!(
                deleted,
                retention_days, "Cleaned up old webhook notification records"
            );
        }
        Err(e) => {
            error!(error = %e, "Failed to clean up webhook notification records");
        }
    }
}
