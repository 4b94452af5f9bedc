//! Webhook processing against Postgres and a mock Mercado Pago API

use heartbalance_billing::{
    BillingError, EntitlementService, MercadoPagoClient, Notification, NotificationQuery, WebhookHandler,
    WebhookOutcome,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::test_config;

pub(crate) async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = heartbalance_shared::db::create_pool(&database_url, 5)
        .await
        .expect("Failed to connect to test database");
    heartbalance_shared::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn create_profile(pool: &PgPool) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO profiles (id, nome) VALUES ($1, 'Teste')")
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
    user_id
}

fn payment_notification(payment_id: &str) -> Notification {
    let query = NotificationQuery {
        type_: Some("payment".to_string()),
        data_id: Some(payment_id.to_string()),
        ..Default::default()
    };
    Notification::parse(&query, &serde_json::json!({})).unwrap()
}

#[tokio::test]
#[ignore]
async fn test_approved_payment_activates_premium_once() {
    let pool = setup_pool().await;
    let user_id = create_profile(&pool).await;
    let payment_id = (Uuid::new_v4().as_u128() % 1_000_000_000).to_string();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", format!("/v1/payments/{}", payment_id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "id": payment_id.parse::<i64>().unwrap(),
                "status": "approved",
                "external_reference": user_id.to_string(),
                "metadata": {"user_id": user_id.to_string(), "plano": "trimestral", "duration_days": 90}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let handler = WebhookHandler::new(client, pool.clone());
    let notification = payment_notification(&payment_id);
    let payload = serde_json::json!({"type": "payment"});

    let first = handler.handle_notification(&notification, &payload).await.unwrap();
    assert!(matches!(first, WebhookOutcome::Activated { user_id: u, .. } if u == user_id));

    let second = handler.handle_notification(&notification, &payload).await.unwrap();
    assert_eq!(second, WebhookOutcome::Duplicate);
    mock.assert_async().await;

    let status = EntitlementService::new(pool.clone())
        .premium_status(user_id)
        .await
        .unwrap();
    assert!(status.is_premium);
    assert_eq!(status.plano_tipo.as_deref(), Some("trimestral"));

    let legacy: (bool,) =
        sqlx::query_as("SELECT plano_ativo FROM legacy_user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(legacy.0);
}

#[tokio::test]
#[ignore]
async fn test_pending_payment_can_be_reprocessed_when_approved() {
    let pool = setup_pool().await;
    let user_id = create_profile(&pool).await;
    let payment_id = (Uuid::new_v4().as_u128() % 1_000_000_000).to_string();
    let path = format!("/v1/payments/{}", payment_id);

    let mut server = mockito::Server::new_async().await;
    let pending = server
        .mock("GET", path.as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "id": payment_id.parse::<i64>().unwrap(),
                "status": "pending",
                "external_reference": user_id.to_string()
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let handler = WebhookHandler::new(client, pool.clone());
    let notification = payment_notification(&payment_id);
    let payload = serde_json::json!({});

    let first = handler.handle_notification(&notification, &payload).await.unwrap();
    assert!(matches!(first, WebhookOutcome::Ignored { .. }));
    pending.remove_async().await;

    let _approved = server
        .mock("GET", path.as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "id": payment_id.parse::<i64>().unwrap(),
                "status": "approved",
                "external_reference": user_id.to_string(),
                "metadata": {"plano": "mensal"}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let second = handler.handle_notification(&notification, &payload).await.unwrap();
    assert!(matches!(second, WebhookOutcome::Activated { .. }));
}

#[tokio::test]
#[ignore]
async fn test_provider_failure_is_recorded_for_retry() {
    let pool = setup_pool().await;
    let payment_id = (Uuid::new_v4().as_u128() % 1_000_000_000).to_string();

    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", format!("/v1/payments/{}", payment_id).as_str())
        .with_status(401)
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let handler = WebhookHandler::new(client, pool.clone());
    let notification = payment_notification(&payment_id);

    assert!(handler
        .handle_notification(&notification, &serde_json::json!({}))
        .await
        .is_err());

    let row: (String, i32) = sqlx::query_as(
        "SELECT processing_result, attempts FROM payment_webhook_events WHERE notification_key = $1",
    )
    .bind(notification.key())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "error");
    assert_eq!(row.1, 1);
}

fn approved_payment_body(payment_id: &str, user_id: Uuid) -> String {
    serde_json::json!({
        "id": payment_id.parse::<i64>().unwrap(),
        "status": "approved",
        "external_reference": user_id.to_string(),
        "metadata": {"plano": "mensal"}
    })
    .to_string()
}

#[tokio::test]
#[ignore]
async fn test_retry_reprocesses_failed_notification() {
    let pool = setup_pool().await;
    let user_id = create_profile(&pool).await;
    let payment_id = (Uuid::new_v4().as_u128() % 1_000_000_000).to_string();
    let path = format!("/v1/payments/{}", payment_id);

    let mut server = mockito::Server::new_async().await;
    let unauthorized = server
        .mock("GET", path.as_str())
        .with_status(401)
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let handler = WebhookHandler::new(client, pool.clone());
    let notification = payment_notification(&payment_id);

    assert!(handler
        .handle_notification(&notification, &serde_json::json!({}))
        .await
        .is_err());
    unauthorized.remove_async().await;

    // Move the failed attempt past its backoff window
    sqlx::query(
        "UPDATE payment_webhook_events SET processing_started_at = NOW() - INTERVAL '10 minutes' WHERE notification_key = $1",
    )
    .bind(notification.key())
    .execute(&pool)
    .await
    .unwrap();

    let _approved = server
        .mock("GET", path.as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(approved_payment_body(&payment_id, user_id))
        .create_async()
        .await;

    let summary = handler.retry_failed(100).await.unwrap();
    assert!(summary.succeeded >= 1);

    let row: (String, i32) = sqlx::query_as(
        "SELECT processing_result, attempts FROM payment_webhook_events WHERE notification_key = $1",
    )
    .bind(notification.key())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "success");
    assert_eq!(row.1, 2);

    let status = EntitlementService::new(pool.clone())
        .premium_status(user_id)
        .await
        .unwrap();
    assert!(status.is_premium);
}

#[tokio::test]
#[ignore]
async fn test_retry_takes_over_stuck_processing_claim() {
    let pool = setup_pool().await;
    let user_id = create_profile(&pool).await;
    let payment_id = (Uuid::new_v4().as_u128() % 1_000_000_000).to_string();
    let notification = payment_notification(&payment_id);

    sqlx::query(
        r#"
        INSERT INTO payment_webhook_events
            (notification_key, topic, resource_id, processing_result, processing_started_at)
        VALUES ($1, 'payment', $2, 'processing', NOW() - INTERVAL '2 hours')
        "#,
    )
    .bind(notification.key())
    .bind(&payment_id)
    .execute(&pool)
    .await
    .unwrap();

    let mut server = mockito::Server::new_async().await;
    let _approved = server
        .mock("GET", format!("/v1/payments/{}", payment_id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(approved_payment_body(&payment_id, user_id))
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let handler = WebhookHandler::new(client, pool.clone());

    let summary = handler.retry_failed(100).await.unwrap();
    assert!(summary.succeeded >= 1);

    let (result,): (String,) = sqlx::query_as(
        "SELECT processing_result FROM payment_webhook_events WHERE notification_key = $1",
    )
    .bind(notification.key())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(result, "success");
}

#[tokio::test]
async fn test_unreachable_database_leaves_notification_unrecorded() {
    let pool = heartbalance_shared::db::create_lazy_pool("postgres://heartbalance@127.0.0.1:1/heartbalance")
        .unwrap();
    let client = MercadoPagoClient::new(test_config("http://127.0.0.1:1")).unwrap();
    let handler = WebhookHandler::new(client, pool);

    let err = handler
        .handle_notification(&payment_notification("123"), &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::WebhookNotRecorded(_)));
}
