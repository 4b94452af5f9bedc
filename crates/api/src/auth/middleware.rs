//! Auth gate and premium gate middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use heartbalance_billing::{BillingError, EntitlementService, PremiumStatus};
use uuid::Uuid;

use super::jwt::{JwtError, JwtManager};
use crate::error::ApiError;

/// State needed by the gates
#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtManager,
    pub entitlement: EntitlementService,
}

/// Authenticated user attached to the request by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid Supabase session
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;

    let claims = auth.jwt.validate_supabase_token(token).map_err(|e| {
        match &e {
            JwtError::Expired => tracing::debug!("Expired session token"),
            other => tracing::warn!(error = %other, "Rejected session token"),
        }
        ApiError::InvalidToken
    })?;

    let user_id = claims.user_id().map_err(|_| ApiError::InvalidToken)?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// Require premium access. Must run after `require_auth`.
pub async fn require_premium(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = request
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.user_id)
        .ok_or(ApiError::Unauthorized)?;

    let status: PremiumStatus = match auth.entitlement.premium_status(user_id).await {
        Ok(status) => status,
        Err(BillingError::NotFound(_)) => return Err(ApiError::PremiumRequired),
        Err(e) => return Err(e.into()),
    };

    if !status.is_premium {
        tracing::debug!(
            user_id = %user_id,
            expired = status.expired,
            "Premium gate denied access"
        );
        return Err(ApiError::PremiumRequired);
    }

    request.extensions_mut().insert(status);
    Ok(next.run(request).await)
}
