//! Mercado Pago checkout preferences

use heartbalance_shared::PlanType;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::client::{
    BackUrls, MercadoPagoClient, MercadoPagoConfig, PaymentMetadata, PreferenceItem,
    PreferenceRequest,
};
use crate::error::BillingResult;
use crate::events::{ActorType, BillingEventBuilder, BillingEventType};

/// Checkout link returned to the front-end
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLink {
    pub preference_id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
    pub plano: PlanType,
    pub amount_cents: i64,
}

/// Build the preference body for a plan purchase
pub fn build_preference(
    config: &MercadoPagoConfig,
    user_id: Uuid,
    plan: PlanType,
) -> PreferenceRequest {
    let amount_cents = config.price_cents_for(plan);
    let base = config.app_base_url.trim_end_matches('/');

    PreferenceRequest {
        items: vec![PreferenceItem {
            id: format!("premium-{}", plan),
            title: plan.title().to_string(),
            quantity: 1,
            currency_id: config.currency_id.clone(),
            unit_price: amount_cents as f64 / 100.0,
        }],
        external_reference: user_id.to_string(),
        metadata: PaymentMetadata {
            user_id: Some(user_id.to_string()),
            plano: Some(plan.to_string()),
            duration_days: Some(serde_json::json!(plan.duration_days())),
        },
        back_urls: BackUrls {
            success: format!("{}/premium/sucesso", base),
            failure: format!("{}/premium/falha", base),
            pending: format!("{}/premium/pendente", base),
        },
        auto_return: "approved".to_string(),
        notification_url: config.notification_url.clone(),
    }
}

/// Checkout service for creating Mercado Pago preferences
#[derive(Clone)]
pub struct CheckoutService {
    client: MercadoPagoClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(client: MercadoPagoClient, pool: PgPool) -> Self {
        Self { client, pool }
    }

    /// Create a checkout preference for a plan and remember it
    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        plan: PlanType,
    ) -> BillingResult<CheckoutLink> {
        let request = build_preference(self.client.config(), user_id, plan);
        let amount_cents = self.client.config().price_cents_for(plan);
        let idempotency_key = Uuid::new_v4().to_string();

        let preference = self
            .client
            .create_preference(&request, &idempotency_key)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO checkout_sessions (preference_id, user_id, plano_tipo, amount_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (preference_id) DO NOTHING
            "#,
        )
        .bind(&preference.id)
        .bind(user_id)
        .bind(plan.as_str())
        .bind(amount_cents)
        .execute(&mut *tx)
        .await?;

        BillingEventBuilder::new(user_id, BillingEventType::CheckoutCreated)
            .data(serde_json::json!({
                "plano": plan,
                "amount_cents": amount_cents,
            }))
            .preference(preference.id.clone())
            .actor_type(ActorType::User)
            .insert(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            preference_id = %preference.id,
            plano = %plan,
            "Checkout preference created"
        );

        Ok(CheckoutLink {
            preference_id: preference.id,
            init_point: preference.init_point,
            sandbox_init_point: preference.sandbox_init_point,
            plano: plan,
            amount_cents,
        })
    }
}

/// Look up the plan recorded for a checkout preference
pub(crate) async fn plan_for_preference(
    pool: &PgPool,
    preference_id: &str,
) -> BillingResult<Option<PlanType>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT plano_tipo FROM checkout_sessions WHERE preference_id = $1")
            .bind(preference_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.and_then(|(plano,)| plano.parse().ok()))
}
