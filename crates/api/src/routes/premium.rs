//! Premium status route

use axum::{
    extract::{Extension, State},
    Json,
};
use heartbalance_billing::PremiumStatus;

use crate::{auth::AuthUser, error::ApiResult, progress::ensure_profile, state::AppState};

/// Resolve premium access for the current user
pub async fn get_premium_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PremiumStatus>> {
    ensure_profile(&state.pool, auth_user.user_id).await?;
    let status = state.entitlement.premium_status(auth_user.user_id).await?;
    Ok(Json(status))
}
