//! HeartBalance background worker
//!
//! Scheduled jobs: Mercado Pago notification retries, notification record
//! retention and the premium expiry sweep.

mod config;
mod premium_expiry;
mod webhook_processor;

use anyhow::Context;
use heartbalance_billing::{BillingService, EntitlementService};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::WorkerConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("heartbalance_worker=info,heartbalance_billing=info"));
    let registry = tracing_subscriber::registry().with(filter);

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting HeartBalance worker");

    let pool = heartbalance_shared::db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;

    let mut scheduler = JobScheduler::new().await?;

    let entitlement = EntitlementService::new(pool.clone());
    let expiry_batch = config.premium_expiry_batch;
    scheduler
        .add(Job::new_async(config.premium_expiry_cron.as_str(), move |_id, _scheduler| {
            let entitlement = entitlement.clone();
            Box::pin(async move {
                premium_expiry::expire_lapsed_plans(&entitlement, expiry_batch).await;
            })
        })?)
        .await?;
    tracing::info!(cron = %config.premium_expiry_cron, "Scheduled premium expiry sweep");

    match BillingService::from_env(pool.clone()) {
        Ok(billing) => {
            let webhooks = billing.webhooks.clone();
            let retry_batch = config.webhook_retry_batch;
            scheduler
                .add(Job::new_async(config.webhook_retry_cron.as_str(), move |_id, _scheduler| {
                    let webhooks = webhooks.clone();
                    Box::pin(async move {
                        webhook_processor::retry_failed_notifications(&webhooks, retry_batch).await;
                    })
                })?)
                .await?;

            let webhooks = billing.webhooks;
            let retention_days = config.webhook_retention_days;
            scheduler
                .add(Job::new_async(config.webhook_cleanup_cron.as_str(), move |_id, _scheduler| {
                    let webhooks = webhooks.clone();
                    Box::pin(async move {
                        webhook_processor::cleanup_old_notifications(&webhooks, retention_days).await;
                    })
                })?)
                .await?;

            tracing::info!(
                retry_cron = %config.webhook_retry_cron,
                cleanup_cron = %config.webhook_cleanup_cron,
                "Scheduled webhook retry and cleanup"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "Mercado Pago not configured - webhook jobs disabled");
        }
    }

    scheduler.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    scheduler.shutdown().await?;
    pool.close().await;

    tracing::info!("Worker stopped");
    Ok(())
}
