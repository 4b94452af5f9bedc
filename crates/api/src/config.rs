//! Application configuration

use std::env;

use heartbalance_billing::{MercadoPagoConfig, PlanPrices};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,
    pub app_base_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_bytes: usize,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub supabase_jwt_secret: String,

    // Mercado Pago
    pub mercadopago_access_token: Option<String>,
    pub mercadopago_webhook_secret: Option<String>,
    pub mercadopago_api_base: String,
    pub prices: PlanPrices,

    // OpenAI
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_base: String,

    // Feature flags
    pub enable_billing: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let default_prices = PlanPrices::default();

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            max_request_body_bytes: env::var("MAX_REQUEST_BODY_BYTES")
                .unwrap_or_else(|_| "1048576".to_string())
                .parse()
                .unwrap_or(1_048_576),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            // Authentication
            supabase_jwt_secret: {
                let secret = env::var("SUPABASE_JWT_SECRET")
                    .map_err(|_| ConfigError::Missing("SUPABASE_JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SUPABASE_JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Mercado Pago
            mercadopago_access_token: non_empty_var("MERCADOPAGO_ACCESS_TOKEN"),
            mercadopago_webhook_secret: non_empty_var("MERCADOPAGO_WEBHOOK_SECRET"),
            mercadopago_api_base: env::var("MERCADOPAGO_API_BASE")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            prices: PlanPrices {
                mensal_cents: price_var("PRICE_MENSAL", default_prices.mensal_cents)?,
                trimestral_cents: price_var("PRICE_TRIMESTRAL", default_prices.trimestral_cents)?,
                anual_cents: price_var("PRICE_ANUAL", default_prices.anual_cents)?,
            },

            // OpenAI
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),

            // Feature flags
            enable_billing: env::var("ENABLE_BILLING")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }

    /// Mercado Pago settings, when billing is enabled and an access token is set
    pub fn mercadopago(&self) -> Option<MercadoPagoConfig> {
        if !self.enable_billing {
            return None;
        }
        let access_token = self.mercadopago_access_token.clone()?;

        Some(MercadoPagoConfig {
            access_token,
            webhook_secret: self.mercadopago_webhook_secret.clone(),
            api_base: self.mercadopago_api_base.clone(),
            prices: self.prices.clone(),
            currency_id: "BRL".to_string(),
            app_base_url: self.app_base_url.clone(),
            notification_url: format!(
                "{}/api/v1/billing/webhook",
                self.public_url.trim_end_matches('/')
            ),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn price_var(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(cents) if cents > 0 => Ok(cents),
            _ => Err(ConfigError::InvalidValue(key)),
        },
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
