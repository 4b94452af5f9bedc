//! Premium AI insights

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{cholesterol::latest_record, meals::recent_meals, profile::load_profile};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    insights::{InsightsClient, MealAnalysis, NutritionContext},
    progress::ensure_profile,
    state::AppState,
};

const INSIGHT_WINDOW_DAYS: i64 = 7;
const MAX_MEAL_DESCRIPTION_CHARS: usize = 1000;

#[derive(Debug, Serialize)]
pub struct NutritionInsightResponse {
    pub insight: String,
    pub refeicoes_analisadas: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct MealAnalysisRequest {
    pub description: String,
}

fn insights_client(state: &AppState) -> ApiResult<&InsightsClient> {
    state.insights.as_ref().ok_or(ApiError::ServiceUnavailable)
}

/// Advice generated from the last week of meals and the latest exam
pub async fn nutrition_insight(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<NutritionInsightResponse>> {
    let client = insights_client(&state)?;
    let user_id = auth_user.user_id;

    ensure_profile(&state.pool, user_id).await?;
    let profile = load_profile(&state.pool, user_id).await?;
    let meals = recent_meals(&state, user_id, INSIGHT_WINDOW_DAYS).await?;
    let latest_cholesterol = latest_record(&state.pool, user_id).await?;

    let ctx = NutritionContext {
        nome: profile.nome,
        meta_kcal: profile.gasto_diario_kcal,
        meals,
        latest_cholesterol,
    };

    let insight = client.nutrition_insight(&ctx).await?;
    tracing::info!(
        user_id = %user_id,
        meals = ctx.meals.len(),
        "Nutrition insight generated"
    );

    Ok(Json(NutritionInsightResponse {
        insight,
        refeicoes_analisadas: ctx.meals.len(),
        generated_at: OffsetDateTime::now_utc(),
    }))
}

/// Calorie and healthiness estimate for a described meal
pub async fn analyze_meal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<MealAnalysisRequest>,
) -> ApiResult<Json<MealAnalysis>> {
    let client = insights_client(&state)?;

    let description = req.description.trim();
    let len = description.chars().count();
    if len == 0 || len > MAX_MEAL_DESCRIPTION_CHARS {
        return Err(ApiError::Validation(format!(
            "description must be between 1 and {} characters",
            MAX_MEAL_DESCRIPTION_CHARS
        )));
    }

    let analysis = client.analyze_meal(description).await?;
    tracing::debug!(
        user_id = %auth_user.user_id,
        calories = analysis.calories,
        is_healthy = analysis.is_healthy,
        "Meal analyzed"
    );

    Ok(Json(analysis))
}
