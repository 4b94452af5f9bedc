//! Mercado Pago webhook handling
//!
//! Notifications only carry a topic and a resource id; the resource itself is
//! fetched from the provider before anything is trusted. Processing is
//! idempotent per `topic:resource_id` and failures are recorded so the worker
//! can retry them.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use heartbalance_shared::PlanType;

use crate::checkout::plan_for_preference;
use crate::client::MercadoPagoClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventType};

type HmacSha256 = Hmac<Sha256>;

/// Duration applied when neither the payment nor the checkout names a plan
pub const FALLBACK_DURATION_DAYS: i64 = 30;

/// Minutes after which a claim stuck in `processing` may be taken over
const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Notification topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Payment,
    MerchantOrder,
    Other(String),
}

impl Topic {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "payment" => Topic::Payment,
            "merchant_order" | "topic_merchant_order_wh" => Topic::MerchantOrder,
            other => Topic::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Topic::Payment => "payment",
            Topic::MerchantOrder => "merchant_order",
            Topic::Other(s) => s,
        }
    }
}

/// Query string of a notification (`?topic=payment&id=1` or `?type=payment&data.id=1`)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct NotificationQuery {
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationData {
    id: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationBody {
    #[serde(rename = "type")]
    type_: Option<String>,
    topic: Option<String>,
    data: Option<NotificationData>,
    resource: Option<String>,
}

/// A parsed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: Topic,
    pub resource_id: String,
}

impl Notification {
    /// Parse from the query string and JSON body.
    /// Query values win over body values.
    pub fn parse(query: &NotificationQuery, body: &serde_json::Value) -> BillingResult<Self> {
        let body: NotificationBody = serde_json::from_value(body.clone()).unwrap_or_default();

        let topic = query
            .topic
            .clone()
            .or_else(|| query.type_.clone())
            .or(body.topic)
            .or(body.type_)
            .ok_or_else(|| BillingError::InvalidNotification("missing topic".to_string()))?;

        let body_data_id = body.data.and_then(|d| d.id).and_then(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        let resource_tail = body.resource.as_deref().and_then(|r| {
            r.trim_end_matches('/')
                .rsplit('/')
                .next()
                .map(str::to_string)
        });

        let resource_id = query
            .data_id
            .clone()
            .or(body_data_id)
            .or_else(|| query.id.clone())
            .or(resource_tail)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BillingError::InvalidNotification("missing resource id".to_string()))?;

        if !resource_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(BillingError::InvalidNotification(format!(
                "invalid resource id: {}",
                resource_id
            )));
        }

        Ok(Self {
            topic: Topic::parse(&topic),
            resource_id,
        })
    }

    /// Idempotency key
    pub fn key(&self) -> String {
        format!("{}:{}", self.topic.as_str(), self.resource_id)
    }
}

/// Verify the `x-signature` header.
///
/// Header format: `ts=<unix>,v1=<hex hmac>`. The signed manifest is
/// `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`, where the id and
/// request-id parts are omitted when absent. Alphanumeric ids are lowercased.
pub fn verify_signature(
    secret: &str,
    signature_header: &str,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> BillingResult<()> {
    let mut ts: Option<&str> = None;
    let mut v1: Option<&str> = None;

    for part in signature_header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            match key.trim() {
                "ts" => ts = Some(value.trim()),
                "v1" => v1 = Some(value.trim()),
                _ => {}
            }
        }
    }

    let ts = ts.ok_or_else(|| {
        tracing::warn!("Missing ts in x-signature header");
        BillingError::WebhookSignatureInvalid
    })?;
    let v1 = v1.ok_or_else(|| {
        tracing::warn!("Missing v1 in x-signature header");
        BillingError::WebhookSignatureInvalid
    })?;

    let mut manifest = String::new();
    if let Some(id) = data_id.filter(|id| !id.is_empty()) {
        let id = if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            id.to_lowercase()
        } else {
            id.to_string()
        };
        manifest.push_str(&format!("id:{};", id));
    }
    if let Some(rid) = request_id.filter(|rid| !rid.is_empty()) {
        manifest.push_str(&format!("request-id:{};", rid));
    }
    manifest.push_str(&format!("ts:{};", ts));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(manifest.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed
        .as_bytes()
        .ct_eq(v1.to_ascii_lowercase().as_bytes())
        .into()
    {
        Ok(())
    } else {
        Err(BillingError::WebhookSignatureInvalid)
    }
}

/// Extract the user id from payment metadata, falling back to the external reference
pub fn resolve_user_id(metadata_user_id: Option<&str>, external_reference: Option<&str>) -> Option<Uuid> {
    metadata_user_id
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .or_else(|| external_reference.and_then(|s| Uuid::parse_str(s.trim()).ok()))
}

/// Result of handling one notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Activated {
        user_id: Uuid,
        #[serde(with = "time::serde::rfc3339")]
        premium_until: OffsetDateTime,
    },
    Ignored {
        reason: String,
    },
    Duplicate,
}

/// Premium activation derived from a provider resource
#[derive(Debug, Clone)]
struct Activation {
    user_id: Uuid,
    plan: Option<PlanType>,
    duration_days: i64,
    payment_id: Option<String>,
    preference_id: Option<String>,
}

/// Summary of a worker retry pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Webhook handler for Mercado Pago notifications
#[derive(Clone)]
pub struct WebhookHandler {
    client: MercadoPagoClient,
    pool: PgPool,
}

impl WebhookHandler {
    pub fn new(client: MercadoPagoClient, pool: PgPool) -> Self {
        Self { client, pool }
    }

    /// Verify the request signature if a webhook secret is configured
    pub fn verify_request(
        &self,
        signature_header: Option<&str>,
        request_id: Option<&str>,
        notification: &Notification,
    ) -> BillingResult<()> {
        let Some(secret) = self.client.config().webhook_secret.as_deref() else {
            tracing::debug!("MERCADOPAGO_WEBHOOK_SECRET not set - skipping signature check");
            return Ok(());
        };

        let header = signature_header.ok_or_else(|| {
            tracing::warn!("Webhook missing x-signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        verify_signature(
            secret,
            header,
            request_id,
            Some(notification.resource_id.as_str()),
        )
    }

    /// Handle a verified notification.
    ///
    /// Uses INSERT...ON CONFLICT...RETURNING to atomically claim processing
    /// rights. A key can be claimed again when its last attempt was ignored
    /// (payment not yet approved) or failed, or when a claim is stuck.
    ///
    /// Returns `WebhookNotRecorded` when neither the claim nor a failed
    /// attempt could be stored; other errors are on record for `retry_failed`.
    pub async fn handle_notification(
        &self,
        notification: &Notification,
        payload: &serde_json::Value,
    ) -> BillingResult<WebhookOutcome> {
        if let Topic::Other(topic) = &notification.topic {
            tracing::info!(topic = %topic, "Ignoring unsupported webhook topic");
            return Ok(WebhookOutcome::Ignored {
                reason: format!("unsupported topic {}", topic),
            });
        }

        let key = notification.key();

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO payment_webhook_events
                (notification_key, topic, resource_id, payload, processing_result, processing_started_at)
            VALUES ($1, $2, $3, $4, 'processing', NOW())
            ON CONFLICT (notification_key) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                attempts = payment_webhook_events.attempts + 1,
                payload = EXCLUDED.payload
            WHERE payment_webhook_events.processing_result IN ('ignored', 'error')
               OR (payment_webhook_events.processing_result = 'processing'
                   AND payment_webhook_events.processing_started_at < NOW() - make_interval(mins => $5))
            RETURNING id
            "#,
        )
        .bind(&key)
        .bind(notification.topic.as_str())
        .bind(&notification.resource_id)
        .bind(payload)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(notification_key = %key, error = %e, "Failed to claim webhook notification");
            BillingError::WebhookNotRecorded(e.to_string())
        })?;

        if claimed.is_none() {
            tracing::info!(notification_key = %key, "Duplicate webhook notification");
            return Ok(WebhookOutcome::Duplicate);
        }

        tracing::info!(notification_key = %key, "Processing Mercado Pago notification");

        let result = self.process(notification).await;

        let (processing_result, error_message) = match &result {
            Ok(WebhookOutcome::Activated { .. }) => ("success", None),
            Ok(WebhookOutcome::Ignored { reason }) => ("ignored", Some(reason.clone())),
            Ok(WebhookOutcome::Duplicate) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        let recorded = sqlx::query(
            r#"
            UPDATE payment_webhook_events
            SET processing_result = $1, error_message = $2, processed_at = NOW()
            WHERE notification_key = $3
            "#,
        )
        .bind(processing_result)
        .bind(&error_message)
        .bind(&key)
        .execute(&self.pool)
        .await;

        match (result, recorded) {
            (Err(process_err), Err(record_err)) => {
                tracing::error!(
                    notification_key = %key,
                    error = %process_err,
                    record_error = %record_err,
                    "Webhook failed and the failure could not be recorded"
                );
                Err(BillingError::WebhookNotRecorded(process_err.to_string()))
            }
            (result, Err(record_err)) => {
                // The stale claim is taken over by `retry_failed` or a redelivery
                tracing::error!(
                    notification_key = %key,
                    processing_result = %processing_result,
                    error = %record_err,
                    "Failed to record webhook processing result"
                );
                result
            }
            (result, Ok(_)) => result,
        }
    }

    /// Fetch the resource and activate premium when it is paid
    async fn process(&self, notification: &Notification) -> BillingResult<WebhookOutcome> {
        let activation = match notification.topic {
            Topic::Payment => {
                let payment = self.client.get_payment(&notification.resource_id).await?;
                let metadata = payment.metadata.clone().unwrap_or_default();
                let user_id = resolve_user_id(
                    metadata.user_id.as_deref(),
                    payment.external_reference.as_deref(),
                );

                if !payment.is_approved() {
                    if let Some(user_id) = user_id {
                        BillingEventBuilder::new(user_id, BillingEventType::PaymentNotApproved)
                            .data(serde_json::json!({
                                "status": payment.status,
                                "status_detail": payment.status_detail,
                            }))
                            .payment(payment.id.to_string())
                            .actor_type(ActorType::MercadoPago)
                            .insert(&self.pool)
                            .await?;
                    }
                    return Ok(WebhookOutcome::Ignored {
                        reason: format!("payment status {}", payment.status),
                    });
                }

                let Some(user_id) = user_id else {
                    tracing::warn!(payment_id = payment.id, "Approved payment without user reference");
                    return Ok(WebhookOutcome::Ignored {
                        reason: "payment has no user reference".to_string(),
                    });
                };

                let plan = metadata.plano.as_deref().and_then(|p| p.parse().ok());
                let duration_days = metadata
                    .duration_days()
                    .or_else(|| plan.map(|p: PlanType| p.duration_days()))
                    .unwrap_or(FALLBACK_DURATION_DAYS);

                Activation {
                    user_id,
                    plan,
                    duration_days,
                    payment_id: Some(payment.id.to_string()),
                    preference_id: None,
                }
            }
            Topic::MerchantOrder => {
                let order = self
                    .client
                    .get_merchant_order(&notification.resource_id)
                    .await?;

                if !order.is_paid() {
                    return Ok(WebhookOutcome::Ignored {
                        reason: format!(
                            "merchant order not paid ({})",
                            order.order_status.as_deref().unwrap_or("unknown")
                        ),
                    });
                }

                let Some(user_id) = resolve_user_id(None, order.external_reference.as_deref())
                else {
                    tracing::warn!(order_id = order.id, "Paid merchant order without user reference");
                    return Ok(WebhookOutcome::Ignored {
                        reason: "merchant order has no user reference".to_string(),
                    });
                };

                let plan = match order.preference_id.as_deref() {
                    Some(preference_id) => plan_for_preference(&self.pool, preference_id).await?,
                    None => None,
                };

                Activation {
                    user_id,
                    plan,
                    duration_days: plan
                        .map(|p| p.duration_days())
                        .unwrap_or(FALLBACK_DURATION_DAYS),
                    payment_id: order.approved_payment_id().map(|id| id.to_string()),
                    preference_id: order.preference_id.clone(),
                }
            }
            Topic::Other(ref topic) => {
                return Ok(WebhookOutcome::Ignored {
                    reason: format!("unsupported topic {}", topic),
                })
            }
        };

        let premium_until = self.activate(&activation).await?;

        Ok(WebhookOutcome::Activated {
            user_id: activation.user_id,
            premium_until,
        })
    }

    /// Flip the premium flags and record the event in one transaction
    async fn activate(&self, activation: &Activation) -> BillingResult<OffsetDateTime> {
        let premium_until = OffsetDateTime::now_utc() + Duration::days(activation.duration_days);
        let plan_name = activation.plan.map(|p| p.as_str());

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE profiles
            SET plano_ativo = TRUE,
                plano_tipo = COALESCE($2, plano_tipo),
                premium_until = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(activation.user_id)
        .bind(plan_name)
        .bind(premium_until)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!(
                "Profile {} not found",
                activation.user_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO legacy_user_profiles (user_id, plano_ativo, updated_at)
            VALUES ($1, TRUE, NOW())
            ON CONFLICT (user_id) DO UPDATE SET plano_ativo = TRUE, updated_at = NOW()
            "#,
        )
        .bind(activation.user_id)
        .execute(&mut *tx)
        .await?;

        let mut event = BillingEventBuilder::new(activation.user_id, BillingEventType::PremiumActivated)
            .data(serde_json::json!({
                "plano": plan_name,
                "duration_days": activation.duration_days,
                "premium_until": premium_until.unix_timestamp(),
            }))
            .actor_type(ActorType::MercadoPago);
        if let Some(payment_id) = &activation.payment_id {
            event = event.payment(payment_id.clone());
        }
        if let Some(preference_id) = &activation.preference_id {
            event = event.preference(preference_id.clone());
        }
        event.insert(&mut *tx).await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %activation.user_id,
            plano = ?plan_name,
            duration_days = activation.duration_days,
            "Premium activated"
        );

        Ok(premium_until)
    }

    /// Retry notifications whose last attempt failed or whose claim is stuck
    /// in `processing`. Backoff doubles per attempt (2, 4, 8... minutes) up to
    /// `max_attempts`.
    pub async fn retry_failed(&self, limit: i64) -> BillingResult<RetrySummary> {
        let rows: Vec<(String, String, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT topic, resource_id, payload
            FROM payment_webhook_events
            WHERE attempts < max_attempts
              AND (
                (processing_result = 'error'
                 AND processing_started_at < NOW() - make_interval(mins => POWER(2, attempts)::INTEGER))
                OR
                (processing_result = 'processing'
                 AND processing_started_at < NOW() - make_interval(mins => $2))
              )
            ORDER BY processing_started_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = RetrySummary::default();

        for (topic, resource_id, payload) in rows {
            summary.attempted += 1;
            let notification = Notification {
                topic: Topic::parse(&topic),
                resource_id,
            };

            match self.handle_notification(&notification, &payload).await {
                Ok(outcome) => {
                    summary.succeeded += 1;
                    tracing::info!(
                        notification_key = %notification.key(),
                        outcome = ?outcome,
                        "Webhook retry completed"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        notification_key = %notification.key(),
                        error = %e,
                        "Webhook retry failed"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Delete finished notification records older than the retention window
    pub async fn cleanup_old_events(&self, retention_days: i32) -> BillingResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM payment_webhook_events
            WHERE processed_at < NOW() - make_interval(days => $1)
              AND (processing_result IN ('success', 'ignored')
                   OR (processing_result = 'error' AND attempts >= max_attempts))
            "#,
        )
        .bind(retention_days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
