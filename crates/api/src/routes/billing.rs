//! Billing routes: plans, checkout, history and the Mercado Pago webhook

use axum::{
    body::Bytes,
    extract::{Extension, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use heartbalance_billing::{
    BillingError, BillingEvent, CheckoutLink, Notification, NotificationQuery, PlanPrices,
};
use heartbalance_shared::PlanType;
use serde::{Deserialize, Serialize};

use super::params::clamp_limit;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    progress::ensure_profile,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plano: String,
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PlanInfo {
    pub plano: PlanType,
    pub titulo: &'static str,
    pub duracao_dias: i64,
    pub preco_cents: i64,
}

pub fn plan_catalog(prices: &PlanPrices) -> Vec<PlanInfo> {
    PlanType::ALL
        .iter()
        .map(|plan| PlanInfo {
            plano: *plan,
            titulo: plan.title(),
            duracao_dias: plan.duration_days(),
            preco_cents: prices.cents_for(*plan),
        })
        .collect()
}

/// Available plans and prices
pub async fn list_plans(State(state): State<AppState>) -> Json<Vec<PlanInfo>> {
    Json(plan_catalog(&state.config.prices))
}

/// Create a Mercado Pago checkout preference for a plan
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutLink>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    let plan: PlanType = req.plano.parse()?;

    // checkout_sessions references the profile
    ensure_profile(&state.pool, auth_user.user_id).await?;

    let link = billing.checkout.create_checkout(auth_user.user_id, plan).await?;
    Ok(Json(link))
}

/// The user's billing history
pub async fn list_billing_events(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<Vec<BillingEvent>>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;
    let limit = clamp_limit(query.limit, 20, 100);
    let events = billing
        .events
        .get_events_for_user(auth_user.user_id, limit)
        .await?;
    Ok(Json(events))
}

fn parse_payload(body: &[u8]) -> Result<serde_json::Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid notification body: {}", e)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Mercado Pago notification endpoint.
///
/// Bad signatures get 401 and unparseable notifications 400. Processing
/// failures that are on record get 200 and are left to the worker; when
/// nothing could be recorded the answer is 503 so the provider redelivers.
pub async fn webhook(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let payload = parse_payload(&body)?;
    let notification = Notification::parse(&query, &payload)?;

    billing.webhooks.verify_request(
        header_str(&headers, "x-signature"),
        header_str(&headers, "x-request-id"),
        &notification,
    )?;

    match billing
        .webhooks
        .handle_notification(&notification, &payload)
        .await
    {
        Ok(outcome) => Ok((StatusCode::OK, Json(outcome)).into_response()),
        Err(e @ BillingError::WebhookNotRecorded(_)) => Err(e.into()),
        Err(e) => {
            tracing::error!(
                notification_key = %notification.key(),
                error = %e,
                "Webhook processing failed; recorded for retry"
            );
            Ok((
                StatusCode::OK,
                Json(serde_json::json!({ "status": "error_recorded" })),
            )
                .into_response())
        }
    }
}
