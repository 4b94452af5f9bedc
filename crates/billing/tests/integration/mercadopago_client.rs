//! Mercado Pago REST client against a mock server

use heartbalance_billing::client::{BackUrls, PaymentMetadata, PreferenceItem, PreferenceRequest};
use heartbalance_billing::{BillingError, MercadoPagoClient};
use mockito::Matcher;

use crate::test_config;

#[tokio::test]
async fn test_get_payment_sends_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/payments/123456")
        .match_header("authorization", "Bearer TEST-access-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "id": 123456,
                "status": "approved",
                "status_detail": "accredited",
                "external_reference": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
                "metadata": {"user_id": "1b4e28ba-2fa1-11d2-883f-0016d3cca427", "plano": "anual", "duration_days": 365}
            }"#,
        )
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let payment = client.get_payment("123456").await.unwrap();

    assert!(payment.is_approved());
    assert_eq!(payment.metadata.unwrap().duration_days(), Some(365));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/payments/1")
        .with_status(502)
        .with_body("bad gateway")
        .expect(4)
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let err = client.get_payment("1").await.unwrap_err();

    assert!(matches!(err, BillingError::ProviderApi { status: 502, .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/merchant_orders/99")
        .with_status(404)
        .with_body(r#"{"message":"not found"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let err = client.get_merchant_order("99").await.unwrap_err();

    assert!(matches!(err, BillingError::ProviderApi { status: 404, .. }));
    assert!(!err.is_transient());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/payments/7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"unexpected": true}"#)
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let err = client.get_payment("7").await.unwrap_err();
    assert!(matches!(err, BillingError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_create_preference_sends_idempotency_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/checkout/preferences")
        .match_header("x-idempotency-key", "key-1")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "external_reference": "user-1",
            "metadata": {"plano": "mensal", "duration_days": 30}
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id": "pref-1", "init_point": "https://mp.test/checkout/pref-1", "sandbox_init_point": null}"#,
        )
        .create_async()
        .await;

    let client = MercadoPagoClient::new(test_config(&server.url())).unwrap();
    let request = PreferenceRequest {
        items: vec![PreferenceItem {
            id: "premium-mensal".to_string(),
            title: "HeartBalance Premium Mensal".to_string(),
            quantity: 1,
            currency_id: "BRL".to_string(),
            unit_price: 19.9,
        }],
        external_reference: "user-1".to_string(),
        metadata: PaymentMetadata {
            user_id: Some("user-1".to_string()),
            plano: Some("mensal".to_string()),
            duration_days: Some(serde_json::json!(30)),
        },
        back_urls: BackUrls {
            success: "http://localhost:5173/premium/sucesso".to_string(),
            failure: "http://localhost:5173/premium/falha".to_string(),
            pending: "http://localhost:5173/premium/pendente".to_string(),
        },
        auto_return: "approved".to_string(),
        notification_url: "http://localhost:3000/api/v1/billing/webhook".to_string(),
    };

    let preference = client.create_preference(&request, "key-1").await.unwrap();
    assert_eq!(preference.id, "pref-1");
    assert_eq!(preference.init_point, "https://mp.test/checkout/pref-1");
    mock.assert_async().await;
}
