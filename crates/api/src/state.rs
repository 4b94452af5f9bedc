//! Shared application state

use std::sync::Arc;

use heartbalance_billing::{BillingService, EntitlementService, MercadoPagoClient};
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;
use crate::insights::InsightsClient;

/// State cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtManager,
    pub entitlement: EntitlementService,
    /// Mercado Pago services; `None` when billing is disabled or unconfigured
    pub billing: Option<BillingService>,
    /// OpenAI client; `None` without an API key
    pub insights: Option<InsightsClient>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let billing = match config.mercadopago() {
            Some(mp_config) => {
                let client = MercadoPagoClient::new(mp_config)?;
                tracing::info!(
                    webhook_signature = client.config().webhook_secret.is_some(),
                    "Mercado Pago billing enabled"
                );
                Some(BillingService::new(client, pool.clone()))
            }
            None => {
                tracing::warn!("Mercado Pago billing disabled (ENABLE_BILLING=false or no access token)");
                None
            }
        };

        let insights = match InsightsClient::from_config(&config) {
            Some(client) => Some(client?),
            None => {
                tracing::warn!("OPENAI_API_KEY not set - AI insights disabled");
                None
            }
        };

        Ok(Self {
            jwt: JwtManager::new(&config.supabase_jwt_secret),
            entitlement: EntitlementService::new(pool.clone()),
            pool,
            config: Arc::new(config),
            billing,
            insights,
        })
    }

    /// State for the auth and premium gates
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt: self.jwt.clone(),
            entitlement: self.entitlement.clone(),
        }
    }
}
