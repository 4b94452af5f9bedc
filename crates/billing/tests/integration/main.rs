//! Billing integration tests
//!
//! Mercado Pago calls run against a local mockito server. Tests that need
//! Postgres are ignored by default:
//! ```bash
//! export DATABASE_URL="postgres://localhost/heartbalance_test"
//! cargo test -p heartbalance-billing --test integration -- --ignored --test-threads=1
//! ```

mod entitlement_flow;
mod mercadopago_client;
mod webhook_flow;

use heartbalance_billing::{MercadoPagoConfig, PlanPrices};

pub fn test_config(api_base: &str) -> MercadoPagoConfig {
    MercadoPagoConfig {
        access_token: "TEST-access-token".to_string(),
        webhook_secret: None,
        api_base: api_base.to_string(),
        prices: PlanPrices::default(),
        currency_id: "BRL".to_string(),
        app_base_url: "http://localhost:5173".to_string(),
        notification_url: "http://localhost:3000/api/v1/billing/webhook".to_string(),
    }
}
