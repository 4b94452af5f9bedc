//! Mercado Pago client configuration and REST calls

use std::time::Duration;

use heartbalance_shared::PlanType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::error::{BillingError, BillingResult};

const DEFAULT_API_BASE: &str = "https://api.mercadopago.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
// Delays of 200ms, 400ms, 800ms before jitter
const RETRY_BACKOFF_BASE: u64 = 2;
const RETRY_BACKOFF_FACTOR: u64 = 100;
const RETRY_MAX_DELAY: Duration = Duration::from_secs(3);
const MAX_RETRIES: usize = 3;

/// Plan prices in cents (BRL)
#[derive(Debug, Clone)]
pub struct PlanPrices {
    pub mensal_cents: i64,
    pub trimestral_cents: i64,
    pub anual_cents: i64,
}

impl PlanPrices {
    pub fn cents_for(&self, plan: PlanType) -> i64 {
        match plan {
            PlanType::Mensal => self.mensal_cents,
            PlanType::Trimestral => self.trimestral_cents,
            PlanType::Anual => self.anual_cents,
        }
    }
}

impl Default for PlanPrices {
    fn default() -> Self {
        Self {
            mensal_cents: 1990,
            trimestral_cents: 4990,
            anual_cents: 14990,
        }
    }
}

/// Configuration for Mercado Pago billing
#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    /// Private access token (bearer)
    pub access_token: String,
    /// Secret used to verify the `x-signature` header; verification is
    /// skipped when unset
    pub webhook_secret: Option<String>,
    /// REST API base, overridable for tests
    pub api_base: String,
    pub prices: PlanPrices,
    pub currency_id: String,
    /// Front-end base URL for the back_urls after checkout
    pub app_base_url: String,
    /// Public URL of the webhook endpoint
    pub notification_url: String,
}

impl MercadoPagoConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let access_token = std::env::var("MERCADOPAGO_ACCESS_TOKEN")
            .map_err(|_| BillingError::Config("MERCADOPAGO_ACCESS_TOKEN not set".to_string()))?;

        let defaults = PlanPrices::default();
        let public_url = std::env::var("PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            access_token,
            webhook_secret: std::env::var("MERCADOPAGO_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            api_base: std::env::var("MERCADOPAGO_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            prices: PlanPrices {
                mensal_cents: env_cents("PRICE_MENSAL", defaults.mensal_cents),
                trimestral_cents: env_cents("PRICE_TRIMESTRAL", defaults.trimestral_cents),
                anual_cents: env_cents("PRICE_ANUAL", defaults.anual_cents),
            },
            currency_id: std::env::var("MERCADOPAGO_CURRENCY").unwrap_or_else(|_| "BRL".to_string()),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            notification_url: format!(
                "{}/api/v1/billing/webhook",
                public_url.trim_end_matches('/')
            ),
        })
    }

    /// Price of a plan in cents
    pub fn price_cents_for(&self, plan: PlanType) -> i64 {
        self.prices.cents_for(plan)
    }
}

fn env_cents(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v: &i64| *v > 0)
        .unwrap_or(default)
}

// =============================================================================
// Provider resources
// =============================================================================

/// Metadata we attach to checkout preferences; Mercado Pago copies it onto
/// the resulting payment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentMetadata {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub plano: Option<String>,
    #[serde(default)]
    pub duration_days: Option<serde_json::Value>,
}

impl PaymentMetadata {
    /// Duration in days; the provider may echo numbers back as floats or strings
    pub fn duration_days(&self) -> Option<i64> {
        let days = match self.duration_days.as_ref()? {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        days.filter(|d: &i64| *d > 0)
    }
}

/// `GET /v1/payments/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub metadata: Option<PaymentMetadata>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub date_approved: Option<String>,
}

impl Payment {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantOrderPayment {
    pub id: i64,
    pub status: String,
}

/// `GET /merchant_orders/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct MerchantOrder {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub preference_id: Option<String>,
    #[serde(default)]
    pub payments: Vec<MerchantOrderPayment>,
}

impl MerchantOrder {
    /// Paid order, or at least one approved payment attached to it
    pub fn is_paid(&self) -> bool {
        self.order_status.as_deref() == Some("paid")
            || self.payments.iter().any(|p| p.status == "approved")
    }

    /// First approved payment id, used for the audit trail
    pub fn approved_payment_id(&self) -> Option<i64> {
        self.payments
            .iter()
            .find(|p| p.status == "approved")
            .map(|p| p.id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub currency_id: String,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

/// `POST /checkout/preferences` body
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub external_reference: String,
    pub metadata: PaymentMetadata,
    pub back_urls: BackUrls,
    pub auto_return: String,
    pub notification_url: String,
}

/// Created checkout preference
#[derive(Debug, Clone, Deserialize)]
pub struct Preference {
    pub id: String,
    pub init_point: String,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Mercado Pago REST client
#[derive(Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoClient {
    /// Create a new client from config
    pub fn new(config: MercadoPagoConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillingError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Create a new client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Self::new(MercadoPagoConfig::from_env()?)
    }

    /// Get the config
    pub fn config(&self) -> &MercadoPagoConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Fetch a payment by id
    pub async fn get_payment(&self, payment_id: &str) -> BillingResult<Payment> {
        self.get_with_retry(&format!("/v1/payments/{}", payment_id)).await
    }

    /// Fetch a merchant order by id
    pub async fn get_merchant_order(&self, order_id: &str) -> BillingResult<MerchantOrder> {
        self.get_with_retry(&format!("/merchant_orders/{}", order_id))
            .await
    }

    /// Create a checkout preference.
    /// The idempotency key makes retries safe against duplicate preferences.
    pub async fn create_preference(
        &self,
        request: &PreferenceRequest,
        idempotency_key: &str,
    ) -> BillingResult<Preference> {
        let url = self.url("/checkout/preferences");
        let url = url.as_str();
        let http = &self.http;
        let token = self.config.access_token.as_str();

        self.with_retry(move || async move {
            let response = http
                .post(url)
                .bearer_auth(token)
                .header("X-Idempotency-Key", idempotency_key)
                .json(request)
                .send()
                .await?;
            Self::decode(response).await
        })
        .await
    }

    async fn get_with_retry<T: DeserializeOwned>(&self, path: &str) -> BillingResult<T> {
        let url = self.url(path);
        let url = url.as_str();
        let http = &self.http;
        let token = self.config.access_token.as_str();

        self.with_retry(move || async move {
            let response = http.get(url).bearer_auth(token).send().await?;
            Self::decode(response).await
        })
        .await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> BillingResult<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BillingError::ProviderApi {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BillingError::InvalidResponse(e.to_string()))
    }

    /// Run a provider call with exponential backoff.
    /// Only transient errors are retried; permanent errors return immediately.
    async fn with_retry<T, F, Fut>(&self, mut call: F) -> BillingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = BillingResult<T>>,
    {
        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BACKOFF_BASE)
            .factor(RETRY_BACKOFF_FACTOR)
            .max_delay(RETRY_MAX_DELAY)
            .take(MAX_RETRIES)
            .map(jitter);

        Retry::spawn(retry_strategy, || {
            let attempt = call();
            async move {
                let result = attempt.await;
                match &result {
                    Ok(_) => Ok(result),
                    Err(e) if e.is_transient() => {
                        tracing::debug!(error = %e, "Transient Mercado Pago error - will retry");
                        Err(result)
                    }
                    Err(_) => Ok(result),
                }
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_duration_lenient() {
        let numeric: PaymentMetadata =
            serde_json::from_value(serde_json::json!({"duration_days": 30})).unwrap();
        assert_eq!(numeric.duration_days(), Some(30));

        let float: PaymentMetadata =
            serde_json::from_value(serde_json::json!({"duration_days": 90.0})).unwrap();
        assert_eq!(float.duration_days(), Some(90));

        let string: PaymentMetadata =
            serde_json::from_value(serde_json::json!({"duration_days": "365"})).unwrap();
        assert_eq!(string.duration_days(), Some(365));

        let negative: PaymentMetadata =
            serde_json::from_value(serde_json::json!({"duration_days": -3})).unwrap();
        assert_eq!(negative.duration_days(), None);

        assert_eq!(PaymentMetadata::default().duration_days(), None);
    }

    #[test]
    fn test_payment_parses_provider_shape() {
        let payment: Payment = serde_json::from_value(serde_json::json!({
            "id": 1234567890,
            "status": "approved",
            "status_detail": "accredited",
            "external_reference": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "metadata": {"user_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427", "plano": "mensal"},
            "transaction_amount": 19.9,
            "unknown_field": {"ignored": true}
        }))
        .unwrap();
        assert!(payment.is_approved());
        assert_eq!(payment.id, 1234567890);
        assert_eq!(
            payment.metadata.and_then(|m| m.plano),
            Some("mensal".to_string())
        );
    }

    #[test]
    fn test_merchant_order_paid_detection() {
        let order: MerchantOrder = serde_json::from_value(serde_json::json!({
            "id": 55,
            "order_status": "payment_required",
            "payments": [
                {"id": 1, "status": "rejected"},
                {"id": 2, "status": "approved"}
            ]
        }))
        .unwrap();
        assert!(order.is_paid());
        assert_eq!(order.approved_payment_id(), Some(2));

        let unpaid: MerchantOrder =
            serde_json::from_value(serde_json::json!({"id": 56, "payments": []})).unwrap();
        assert!(!unpaid.is_paid());
    }
}
