//! Meal logging

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use heartbalance_shared::{GamifiedAction, MealLog};
use serde::{Deserialize, Serialize};

use super::params::{clamp_limit, parse_date};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    progress::{record_action, today, ActionRecorded},
    state::AppState,
};

const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct LogMealRequest {
    pub description: String,
    #[serde(default)]
    pub calories: Option<i32>,
    #[serde(default)]
    pub is_healthy: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl LogMealRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let len = self.description.trim().chars().count();
        if len == 0 || len > MAX_DESCRIPTION_CHARS {
            return Err(ApiError::Validation(format!(
                "description must be between 1 and {} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }
        if let Some(calories) = self.calories {
            if !(0..=10_000).contains(&calories) {
                return Err(ApiError::Validation(
                    "calories must be between 0 and 10000".to_string(),
                ));
            }
        }
        if let Some(url) = &self.image_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(ApiError::Validation("image_url must be an http(s) URL".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMealsQuery {
    /// How many days back to include, today counting as one
    #[serde(default)]
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogMealResponse {
    pub meal: MealLog,
    #[serde(flatten)]
    pub xp: ActionRecorded,
}

/// Log a meal and award XP
pub async fn log_meal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<LogMealRequest>,
) -> ApiResult<(StatusCode, Json<LogMealResponse>)> {
    req.validate()?;
    let current_day = today();
    let day = parse_date(req.date.as_deref(), current_day)?;
    if day > current_day {
        return Err(ApiError::Validation("date cannot be in the future".to_string()));
    }
    let description = req.description.trim();
    let user_id = auth_user.user_id;

    let mut tx = state.pool.begin().await?;

    // record_action creates the profile row the meal references
    let xp = record_action(
        &mut tx,
        user_id,
        GamifiedAction::Meal { healthy: req.is_healthy },
        &format!("Refeição: {}", description),
        None,
        day,
    )
    .await?;

    let meal: MealLog = sqlx::query_as(
        r#"
        INSERT INTO meal_logs (user_id, description, calories, is_healthy, image_url, date)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, description, calories, is_healthy, image_url, date, created_at
        "#,
    )
    .bind(user_id)
    .bind(description)
    .bind(req.calories)
    .bind(req.is_healthy)
    .bind(req.image_url.as_deref())
    .bind(day)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        meal_id = %meal.id,
        is_healthy = req.is_healthy,
        xp_ganho = xp.xp_ganho,
        "Meal logged"
    );

    Ok((StatusCode::CREATED, Json(LogMealResponse { meal, xp })))
}

/// List recent meals
pub async fn list_meals(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListMealsQuery>,
) -> ApiResult<Json<Vec<MealLog>>> {
    let days = clamp_limit(query.days, 7, 90);
    let meals = recent_meals(&state, auth_user.user_id, days).await?;
    Ok(Json(meals))
}

/// Meals of the last `days` days, newest first
pub(crate) async fn recent_meals(
    state: &AppState,
    user_id: uuid::Uuid,
    days: i64,
) -> ApiResult<Vec<MealLog>> {
    let since = today() - time::Duration::days(days - 1);
    let meals: Vec<MealLog> = sqlx::query_as(
        r#"
        SELECT id, user_id, description, calories, is_healthy, image_url, date, created_at
        FROM meal_logs
        WHERE user_id = $1 AND date >= $2
        ORDER BY date DESC, created_at DESC
        LIMIT 500
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_all(&state.pool)
    .await?;
    Ok(meals)
}
