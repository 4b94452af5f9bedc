//! API routes

pub mod activities;
pub mod billing;
pub mod cholesterol;
pub mod gamification;
pub mod health;
pub mod insights;
pub mod meals;
pub mod onboarding;
pub mod params;
pub mod premium;
pub mod profile;
pub mod recipes;
pub mod water;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    auth::{require_auth, require_premium},
    state::AppState,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health checks stay at root for infrastructure probes
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes; the webhook authenticates by signature
    let public_api_routes = Router::new()
        .route("/billing/webhook", post(billing::webhook))
        .route("/billing/plans", get(billing::list_plans))
        .route("/gamification/ranks", get(gamification::list_ranks));

    // Premium-only routes, gated after authentication
    let premium_api_routes = Router::new()
        .route("/recipes/:recipe_id/complete", post(recipes::complete_recipe))
        .route(
            "/cholesterol",
            get(cholesterol::list_cholesterol).post(cholesterol::record_cholesterol),
        )
        .route("/insights/nutrition", post(insights::nutrition_insight))
        .route("/insights/meal-analysis", post(insights::analyze_meal))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_premium,
        ));

    let protected_api_routes = Router::new()
        .route(
            "/profile",
            get(profile::get_profile).patch(profile::update_profile),
        )
        .route("/onboarding", post(onboarding::complete_onboarding))
        .route("/premium/status", get(premium::get_premium_status))
        .route("/water", get(water::list_water).post(water::log_water))
        .route("/water/summary", get(water::water_summary))
        .route("/meals", get(meals::list_meals).post(meals::log_meal))
        .route(
            "/activities",
            get(activities::list_activities).post(activities::log_activity),
        )
        .route("/gamification/rank", get(gamification::get_rank))
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/events", get(billing::list_billing_events))
        .merge(premium_api_routes)
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    let body_limit = state.config.max_request_body_bytes;

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::sign_test_token;
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use heartbalance_billing::PlanPrices;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "router-test-secret-at-least-32-characters";

    fn test_config() -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            public_url: "http://localhost:3000".to_string(),
            app_base_url: "http://localhost:5173".to_string(),
            cors_allowed_origins: vec![],
            max_request_body_bytes: 64 * 1024,
            database_url: "postgres://localhost/heartbalance_test".to_string(),
            database_max_connections: 1,
            supabase_jwt_secret: SECRET.to_string(),
            mercadopago_access_token: None,
            mercadopago_webhook_secret: None,
            mercadopago_api_base: "http://127.0.0.1:1".to_string(),
            prices: PlanPrices::default(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_api_base: "http://127.0.0.1:1".to_string(),
            enable_billing: false,
        }
    }

    fn test_state() -> AppState {
        let config = test_config();
        let pool = heartbalance_shared::db::create_lazy_pool(&config.database_url).unwrap();
        AppState::new(pool, config).unwrap()
    }

    fn app() -> Router {
        create_router(test_state())
    }

    fn bearer() -> String {
        format!(
            "Bearer {}",
            sign_test_token(SECRET, Uuid::new_v4(), "authenticated", 600)
        )
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = app()
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        for (method, uri) in [
            ("GET", "/api/v1/profile"),
            ("POST", "/api/v1/meals"),
            ("GET", "/api/v1/water/summary"),
            ("POST", "/api/v1/billing/checkout"),
            ("POST", "/api/v1/insights/nutrition"),
            ("GET", "/api/v1/cholesterol"),
        ] {
            let response = app()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_rank_table_is_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/gamification/ranks")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "public, max-age=3600"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["ranks"][0]["rank"], "Iniciante");
        assert_eq!(json["ranks"][5]["max_xp"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_plans_are_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/billing/plans")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_billing_disabled_returns_503() {
        let webhook = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/billing/webhook?type=payment&data.id=123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(webhook.status(), StatusCode::SERVICE_UNAVAILABLE);

        let checkout = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/billing/checkout")
                    .header(header::AUTHORIZATION, bearer())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"plano":"mensal"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(checkout.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let body = format!(r#"{{"description":"{}"}}"#, "a".repeat(128 * 1024));
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/meals")
                    .header(header::AUTHORIZATION, bearer())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_webhook_answers_503_when_claim_cannot_be_stored() {
        let mut config = test_config();
        config.enable_billing = true;
        config.mercadopago_access_token = Some("TEST-access-token".to_string());
        config.database_url = "postgres://heartbalance@127.0.0.1:1/heartbalance".to_string();
        let pool = heartbalance_shared::db::create_lazy_pool(&config.database_url).unwrap();
        let app = create_router(AppState::new(pool, config).unwrap());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/billing/webhook?type=payment&data.id=123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    // Postgres-backed tests below; run with DATABASE_URL set and --ignored

    async fn db_app() -> (Router, sqlx::PgPool) {
        let mut config = test_config();
        config.database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = heartbalance_shared::db::create_pool(&config.database_url, 2)
            .await
            .unwrap();
        heartbalance_shared::db::run_migrations(&pool).await.unwrap();
        (create_router(AppState::new(pool.clone(), config).unwrap()), pool)
    }

    async fn create_profile(pool: &sqlx::PgPool, assignments: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        crate::progress::ensure_profile(pool, user_id).await.unwrap();
        if !assignments.is_empty() {
            sqlx::query(&format!("UPDATE profiles SET {} WHERE id = $1", assignments))
                .bind(user_id)
                .execute(pool)
                .await
                .unwrap();
        }
        user_id
    }

    async fn send(app: &Router, user_id: Uuid, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", sign_test_token(SECRET, user_id, "authenticated", 600)),
            );
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    #[ignore]
    async fn test_premium_gate_admission() {
        let (app, pool) = db_app().await;

        let free = create_profile(&pool, "").await;
        let (status, body) = send(&app, free, "GET", "/api/v1/cholesterol", None).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "PREMIUM_REQUIRED");

        let admin = create_profile(&pool, "role = 'admin'").await;
        let (status, _) = send(&app, admin, "GET", "/api/v1/cholesterol", None).await;
        assert_eq!(status, StatusCode::OK);

        let paid = create_profile(
            &pool,
            "plano_ativo = TRUE, plano_tipo = 'mensal', premium_until = NOW() + INTERVAL '5 days'",
        )
        .await;
        let (status, _) = send(&app, paid, "GET", "/api/v1/cholesterol", None).await;
        assert_eq!(status, StatusCode::OK);

        let lapsed = create_profile(
            &pool,
            "plano_ativo = TRUE, plano_tipo = 'mensal', premium_until = NOW() - INTERVAL '1 day'",
        )
        .await;
        let (status, _) = send(&app, lapsed, "GET", "/api/v1/cholesterol", None).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    #[ignore]
    async fn test_water_goal_awarded_once_per_day() {
        let (app, pool) = db_app().await;
        let user_id = create_profile(&pool, "meta_agua_ml = 500").await;

        let (status, first) = send(&app, user_id, "POST", "/api/v1/water", Some(r#"{"quantidade_ml":500}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["summary"]["meta_atingida"], true);
        assert_eq!(first["xp"]["xp_ganho"], 10);

        let (status, second) = send(&app, user_id, "POST", "/api/v1/water", Some(r#"{"quantidade_ml":250}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(second["xp"], serde_json::Value::Null);

        let (xp,): (i64,) = sqlx::query_as("SELECT xp_total FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(xp, 10);
    }

    #[tokio::test]
    #[ignore]
    async fn test_recipe_completion_once_per_day() {
        let (app, pool) = db_app().await;
        let user_id = create_profile(&pool, "role = 'admin'").await;

        // A free-text activity naming the recipe must not count as a completion
        let (status, _) = send(
            &app,
            user_id,
            "POST",
            "/api/v1/activities",
            Some(r#"{"tipo":"alimentacao","descricao":"almoço [aveia-1]"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = "/api/v1/recipes/aveia-1/complete";
        let (status, first) = send(&app, user_id, "POST", uri, Some(r#"{"nome":"Mingau de aveia"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["xp_ganho"], 15);

        let (status, repeat) = send(&app, user_id, "POST", uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(repeat["error"]["code"], "CONFLICT");

        let (status, _) = send(&app, user_id, "POST", "/api/v1/recipes/aveia-2/complete", None).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
