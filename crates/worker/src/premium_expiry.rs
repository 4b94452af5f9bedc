//! Sweep of lapsed premium plans

use heartbalance_billing::EntitlementService;
use tracing::{error, info, warn};

/// Upper bound on batches per run; the next run picks up the rest
const MAX_BATCHES_PER_RUN: usize = 20;

/// Clear paid flags whose `premium_until` has passed, draining in batches
pub async fn expire_lapsed_plans(entitlement: &EntitlementService, batch_size: i64) {
    let batch_size = batch_size.max(1);
    let mut total = 0usize;
    let mut drained = false;

    for _ in 0..MAX_BATCHES_PER_RUN {
        match entitlement.expire_lapsed_plans(batch_size).await {
            Ok(expired) => {
                total += expired.len();
                if (expired.len() as i64) < batch_size {
                    drained = true;
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to expire lapsed premium plans");
                drained = true;
                break;
            }
        }
    }

    if total > 0 {
        info!(expired = total, "Expired lapsed premium plans");
    }
    if !drained {
        warn!(
            batches = MAX_BATCHES_PER_RUN,
            "Premium expiry backlog not drained; continuing next run"
        );
    }
}
