//! HeartBalance API Library
//!
//! HTTP server components: auth gates, route handlers, the XP engine's
//! persistence and the Mercado Pago/OpenAI integrations.

pub mod auth;
pub mod config;
pub mod error;
pub mod insights;
pub mod progress;
pub mod routes;
pub mod security;
pub mod state;

use axum::{http::HeaderValue, middleware, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Router with the cross-cutting layers applied
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    routes::create_router(state)
        .layer(middleware::from_fn(security::security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(allowed)
}
