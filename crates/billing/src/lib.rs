//! HeartBalance billing
//!
//! Mercado Pago checkout, webhook processing and premium entitlement.

pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod webhooks;

use sqlx::PgPool;

pub use checkout::{CheckoutLink, CheckoutService};
pub use client::{MercadoPagoClient, MercadoPagoConfig, PlanPrices};
pub use entitlement::{resolve_premium, EntitlementService, PremiumSource, PremiumStatus};
pub use error::{BillingError, BillingResult};
pub use events::{ActorType, BillingEvent, BillingEventBuilder, BillingEventLogger, BillingEventType};
pub use webhooks::{Notification, NotificationQuery, RetrySummary, WebhookHandler, WebhookOutcome};

/// Billing services sharing one provider client and pool
#[derive(Clone)]
pub struct BillingService {
    pub checkout: CheckoutService,
    pub webhooks: WebhookHandler,
    pub events: BillingEventLogger,
}

impl BillingService {
    pub fn new(client: MercadoPagoClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(client.clone(), pool.clone()),
            webhooks: WebhookHandler::new(client, pool.clone()),
            events: BillingEventLogger::new(pool),
        }
    }

    /// Build from `MERCADOPAGO_*` environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        Ok(Self::new(MercadoPagoClient::from_env()?, pool))
    }
}
