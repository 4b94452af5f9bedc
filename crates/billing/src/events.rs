//! Billing Events Module
//!
//! Append-only log of premium lifecycle changes. Used to answer
//! "why is this user premium?" and to reconstruct payment history.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Types of billing events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventType {
    CheckoutCreated,
    PremiumActivated,
    PaymentNotApproved,
    PremiumExpired,
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingEventType::CheckoutCreated => "CHECKOUT_CREATED",
            BillingEventType::PremiumActivated => "PREMIUM_ACTIVATED",
            BillingEventType::PaymentNotApproved => "PAYMENT_NOT_APPROVED",
            BillingEventType::PremiumExpired => "PREMIUM_EXPIRED",
        };
        write!(f, "{}", s)
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    User,
    System,
    MercadoPago,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::System => write!(f, "system"),
            ActorType::MercadoPago => write!(f, "mercadopago"),
        }
    }
}

/// A billing event record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub payment_id: Option<String>,
    pub preference_id: Option<String>,
    pub actor_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Builder for creating billing events
pub struct BillingEventBuilder {
    user_id: Uuid,
    event_type: BillingEventType,
    event_data: serde_json::Value,
    payment_id: Option<String>,
    preference_id: Option<String>,
    actor_type: ActorType,
}

impl BillingEventBuilder {
    pub fn new(user_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            user_id,
            event_type,
            event_data: serde_json::json!({}),
            payment_id: None,
            preference_id: None,
            actor_type: ActorType::System,
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    pub fn payment(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    pub fn preference(mut self, preference_id: impl Into<String>) -> Self {
        self.preference_id = Some(preference_id.into());
        self
    }

    pub fn actor_type(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }

    /// Insert the event using any executor (pool or open transaction)
    pub async fn insert<'e, E>(self, executor: E) -> BillingResult<Uuid>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let event_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO billing_events (
                user_id,
                event_type,
                event_data,
                payment_id,
                preference_id,
                actor_type
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(self.user_id)
        .bind(self.event_type.to_string())
        .bind(&self.event_data)
        .bind(&self.payment_id)
        .bind(&self.preference_id)
        .bind(self.actor_type.to_string())
        .fetch_one(executor)
        .await?;

        Ok(event_id.0)
    }
}

/// Service for logging and querying billing events
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get recent events for a user
    pub async fn get_events_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<BillingEvent>> {
        let events: Vec<BillingEvent> = sqlx::query_as(
            r#"
            SELECT id, user_id, event_type, event_data, payment_id, preference_id,
                   actor_type, created_at
            FROM billing_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
