//! Activity logging

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use heartbalance_shared::{ActivityKind, ActivityLog, GamifiedAction};
use serde::Deserialize;

use super::params::{clamp_limit, parse_date};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    progress::{record_action, today, ActionRecorded},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LogActivityRequest {
    pub tipo: ActivityKind,
    pub descricao: String,
    #[serde(default)]
    pub duracao_min: Option<i32>,
    #[serde(default)]
    pub data: Option<String>,
}

impl LogActivityRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let len = self.descricao.trim().chars().count();
        if len == 0 || len > 500 {
            return Err(ApiError::Validation(
                "descricao must be between 1 and 500 characters".to_string(),
            ));
        }
        if let Some(minutes) = self.duracao_min {
            if !(1..=1440).contains(&minutes) {
                return Err(ApiError::Validation(
                    "duracao_min must be between 1 and 1440".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListActivitiesQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Log an activity and award XP
pub async fn log_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<LogActivityRequest>,
) -> ApiResult<(StatusCode, Json<ActionRecorded>)> {
    req.validate()?;
    let current_day = today();
    let day = parse_date(req.data.as_deref(), current_day)?;
    if day > current_day {
        return Err(ApiError::Validation("data cannot be in the future".to_string()));
    }

    let mut tx = state.pool.begin().await?;
    let recorded = record_action(
        &mut tx,
        auth_user.user_id,
        GamifiedAction::from_kind(req.tipo),
        req.descricao.trim(),
        req.duracao_min,
        day,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        user_id = %auth_user.user_id,
        tipo = req.tipo.as_str(),
        xp_ganho = recorded.xp_ganho,
        rank = %recorded.rank,
        "Activity logged"
    );

    Ok((StatusCode::CREATED, Json(recorded)))
}

/// List recent activities, newest first
pub async fn list_activities(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListActivitiesQuery>,
) -> ApiResult<Json<Vec<ActivityLog>>> {
    let limit = clamp_limit(query.limit, 50, 200);

    let activities: Vec<ActivityLog> = sqlx::query_as(
        r#"
        SELECT id, user_id, tipo, descricao, xp_ganho, duracao_min, data, created_at
        FROM activity_logs
        WHERE user_id = $1
        ORDER BY data DESC, created_at DESC
        LIMIT $2
        "#,
    )
    .bind(auth_user.user_id)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(activities))
}
