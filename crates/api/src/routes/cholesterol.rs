//! Premium cholesterol exam tracking

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use heartbalance_shared::health::{validate_lipid_panel, LdlClass};
use heartbalance_shared::ColesterolRecord;
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use super::params::{clamp_limit, parse_date};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    progress::{ensure_profile, today},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RecordCholesterolRequest {
    pub ldl: f64,
    pub hdl: f64,
    pub total: f64,
    pub triglicerides: f64,
    pub data_exame: String,
}

#[derive(Debug, Deserialize)]
pub struct ListCholesterolQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CholesterolResponse {
    #[serde(flatten)]
    pub record: ColesterolRecord,
    pub ldl_class: LdlClass,
    /// Human-readable class, e.g. "limítrofe"
    pub ldl_classificacao: String,
}

impl From<ColesterolRecord> for CholesterolResponse {
    fn from(record: ColesterolRecord) -> Self {
        let class = LdlClass::classify(record.ldl);
        Self {
            ldl_class: class,
            ldl_classificacao: class.to_string(),
            record,
        }
    }
}

pub(crate) async fn latest_record<'e, E>(executor: E, user_id: Uuid) -> ApiResult<Option<ColesterolRecord>>
where
    E: PgExecutor<'e>,
{
    let record: Option<ColesterolRecord> = sqlx::query_as(
        r#"
        SELECT id, user_id, ldl, hdl, total, triglicerides, data_exame, created_at
        FROM colesterol_records
        WHERE user_id = $1
        ORDER BY data_exame DESC, created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
    Ok(record)
}

/// Record a lipid panel
pub async fn record_cholesterol(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<RecordCholesterolRequest>,
) -> ApiResult<(StatusCode, Json<CholesterolResponse>)> {
    validate_lipid_panel(req.ldl, req.hdl, req.total, req.triglicerides)?;
    let current_day = today();
    let data_exame = parse_date(Some(&req.data_exame), current_day)?;
    if data_exame > current_day {
        return Err(ApiError::Validation(
            "data_exame cannot be in the future".to_string(),
        ));
    }

    ensure_profile(&state.pool, auth_user.user_id).await?;

    let record: ColesterolRecord = sqlx::query_as(
        r#"
        INSERT INTO colesterol_records (user_id, ldl, hdl, total, triglicerides, data_exame)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, ldl, hdl, total, triglicerides, data_exame, created_at
        "#,
    )
    .bind(auth_user.user_id)
    .bind(req.ldl)
    .bind(req.hdl)
    .bind(req.total)
    .bind(req.triglicerides)
    .bind(data_exame)
    .fetch_one(&state.pool)
    .await?;

    let response = CholesterolResponse::from(record);
    tracing::info!(
        user_id = %auth_user.user_id,
        ldl_class = ?response.ldl_class,
        "Cholesterol exam recorded"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// List exams, newest first
pub async fn list_cholesterol(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListCholesterolQuery>,
) -> ApiResult<Json<Vec<CholesterolResponse>>> {
    let limit = clamp_limit(query.limit, 20, 100);

    let records: Vec<ColesterolRecord> = sqlx::query_as(
        r#"
        SELECT id, user_id, ldl, hdl, total, triglicerides, data_exame, created_at
        FROM colesterol_records
        WHERE user_id = $1
        ORDER BY data_exame DESC, created_at DESC
        LIMIT $2
        "#,
    )
    .bind(auth_user.user_id)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(records.into_iter().map(CholesterolResponse::from).collect()))
}
