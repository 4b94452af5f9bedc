//! Water intake logging
//!
//! Reaching the daily goal awards XP once per day; the award is claimed
//! through `water_goal_awards` so repeated logs after the goal do not re-award.

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use heartbalance_shared::health::water_goal_ml;
use heartbalance_shared::{GamifiedAction, WaterLog};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::params::{parse_date, parse_time};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    progress::{ensure_profile, record_action, today, ActionRecorded, APP_UTC_OFFSET},
    state::AppState,
};

const MAX_SINGLE_LOG_ML: i32 = 5_000;

#[derive(Debug, Deserialize)]
pub struct LogWaterRequest {
    pub quantidade_ml: i32,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub hora: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WaterSummary {
    pub data: Date,
    pub total_ml: i64,
    pub meta_ml: i32,
    pub percentual: u8,
    pub meta_atingida: bool,
    pub registros: i64,
}

#[derive(Debug, Serialize)]
pub struct LogWaterResponse {
    pub log: WaterLog,
    pub summary: WaterSummary,
    /// Present when this log completed the day's goal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp: Option<ActionRecorded>,
}

impl WaterSummary {
    pub fn new(data: Date, total_ml: i64, meta_ml: i32, registros: i64) -> Self {
        let meta = i64::from(meta_ml.max(1));
        let percentual = (total_ml.max(0) * 100 / meta).min(100) as u8;
        Self {
            data,
            total_ml,
            meta_ml,
            percentual,
            meta_atingida: total_ml >= meta,
            registros,
        }
    }
}

async fn day_summary<'e, E>(executor: E, user_id: Uuid, day: Date) -> ApiResult<WaterSummary>
where
    E: PgExecutor<'e>,
{
    let (total_ml, registros, meta_agua_ml, peso_kg): (i64, i64, Option<i32>, Option<f64>) =
        sqlx::query_as(
            r#"
            SELECT
                COALESCE((SELECT SUM(quantidade_ml) FROM water_logs WHERE user_id = p.id AND data = $2), 0)::BIGINT,
                (SELECT COUNT(*) FROM water_logs WHERE user_id = p.id AND data = $2),
                p.meta_agua_ml,
                p.peso_kg
            FROM profiles p
            WHERE p.id = $1
            "#,
        )
        .bind(user_id)
        .bind(day)
        .fetch_one(executor)
        .await?;

    let meta_ml = meta_agua_ml.unwrap_or_else(|| water_goal_ml(peso_kg));
    Ok(WaterSummary::new(day, total_ml, meta_ml, registros))
}

/// Log a glass of water
pub async fn log_water(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<LogWaterRequest>,
) -> ApiResult<(StatusCode, Json<LogWaterResponse>)> {
    if !(1..=MAX_SINGLE_LOG_ML).contains(&req.quantidade_ml) {
        return Err(ApiError::Validation(format!(
            "quantidade_ml must be between 1 and {}",
            MAX_SINGLE_LOG_ML
        )));
    }
    let current_day = today();
    let day = parse_date(req.data.as_deref(), current_day)?;
    if day > current_day {
        return Err(ApiError::Validation("data cannot be in the future".to_string()));
    }
    let hora = match req.hora.as_deref() {
        Some(raw) => parse_time(raw)?,
        None => OffsetDateTime::now_utc().to_offset(APP_UTC_OFFSET).time(),
    };

    let user_id = auth_user.user_id;
    let mut tx = state.pool.begin().await?;
    ensure_profile(&mut *tx, user_id).await?;

    let log: WaterLog = sqlx::query_as(
        r#"
        INSERT INTO water_logs (user_id, quantidade_ml, data, hora)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, quantidade_ml, data, hora, created_at
        "#,
    )
    .bind(user_id)
    .bind(req.quantidade_ml)
    .bind(day)
    .bind(hora)
    .fetch_one(&mut *tx)
    .await?;

    let summary = day_summary(&mut *tx, user_id, day).await?;

    let mut xp = None;
    if summary.meta_atingida {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO water_goal_awards (user_id, data)
            VALUES ($1, $2)
            ON CONFLICT (user_id, data) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(user_id)
        .bind(day)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_some() {
            let recorded = record_action(
                &mut tx,
                user_id,
                GamifiedAction::WaterGoal,
                "Meta diária de água atingida",
                None,
                day,
            )
            .await?;
            xp = Some(recorded);
        }
    }

    tx.commit().await?;

    tracing::debug!(
        user_id = %user_id,
        quantidade_ml = req.quantidade_ml,
        total_ml = summary.total_ml,
        goal_awarded = xp.is_some(),
        "Water logged"
    );

    Ok((StatusCode::CREATED, Json(LogWaterResponse { log, summary, xp })))
}

/// List a day's water logs
pub async fn list_water(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DayQuery>,
) -> ApiResult<Json<Vec<WaterLog>>> {
    let day = parse_date(query.data.as_deref(), today())?;

    let logs: Vec<WaterLog> = sqlx::query_as(
        r#"
        SELECT id, user_id, quantidade_ml, data, hora, created_at
        FROM water_logs
        WHERE user_id = $1 AND data = $2
        ORDER BY hora ASC, created_at ASC
        "#,
    )
    .bind(auth_user.user_id)
    .bind(day)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(logs))
}

/// Day total against the goal
pub async fn water_summary(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DayQuery>,
) -> ApiResult<Json<WaterSummary>> {
    let day = parse_date(query.data.as_deref(), today())?;
    ensure_profile(&state.pool, auth_user.user_id).await?;
    Ok(Json(day_summary(&state.pool, auth_user.user_id, day).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_summary_percentages() {
        let day = date!(2024 - 03 - 10);

        let half = WaterSummary::new(day, 1000, 2000, 4);
        assert_eq!(half.percentual, 50);
        assert!(!half.meta_atingida);

        let reached = WaterSummary::new(day, 2000, 2000, 8);
        assert_eq!(reached.percentual, 100);
        assert!(reached.meta_atingida);

        let over = WaterSummary::new(day, 3500, 2000, 10);
        assert_eq!(over.percentual, 100);
        assert!(over.meta_atingida);
    }

    #[test]
    fn test_summary_with_zero_goal_does_not_divide_by_zero() {
        let summary = WaterSummary::new(date!(2024 - 03 - 10), 0, 0, 0);
        assert_eq!(summary.percentual, 0);
        assert!(!summary.meta_atingida);
    }
}
