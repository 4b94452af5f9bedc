//! Premium recipe completion

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use heartbalance_shared::GamifiedAction;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    progress::{ensure_profile, record_action, today, ActionRecorded},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRecipeRequest {
    /// Display name for the activity log
    #[serde(default)]
    pub nome: Option<String>,
}

fn valid_recipe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn recipe_description(recipe_id: &str, nome: Option<&str>) -> String {
    match nome.map(str::trim).filter(|n| !n.is_empty()) {
        Some(nome) => format!("Receita concluída: {} [{}]", nome, recipe_id),
        None => format!("Receita concluída [{}]", recipe_id),
    }
}

/// Mark a recipe as cooked; XP is granted once per recipe per day
pub async fn complete_recipe(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(recipe_id): Path<String>,
    body: Option<Json<CompleteRecipeRequest>>,
) -> ApiResult<(StatusCode, Json<ActionRecorded>)> {
    if !valid_recipe_id(&recipe_id) {
        return Err(ApiError::Validation("Invalid recipe id".to_string()));
    }
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let day = today();
    let user_id = auth_user.user_id;

    let mut tx = state.pool.begin().await?;
    ensure_profile(&mut *tx, user_id).await?;

    let claimed: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO recipe_completions (user_id, recipe_id, data)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, recipe_id, data) DO NOTHING
        RETURNING user_id
        "#,
    )
    .bind(user_id)
    .bind(&recipe_id)
    .bind(day)
    .fetch_optional(&mut *tx)
    .await?;

    if claimed.is_none() {
        return Err(ApiError::Conflict("Receita já concluída hoje".to_string()));
    }

    let recorded = record_action(
        &mut tx,
        user_id,
        GamifiedAction::Recipe,
        &recipe_description(&recipe_id, req.nome.as_deref()),
        None,
        day,
    )
    .await?;

    sqlx::query(
        "UPDATE recipe_completions SET activity_id = $4 WHERE user_id = $1 AND recipe_id = $2 AND data = $3",
    )
    .bind(user_id)
    .bind(&recipe_id)
    .bind(day)
    .bind(recorded.activity.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        recipe_id = %recipe_id,
        xp_total = recorded.xp_total,
        "Recipe completed"
    );

    Ok((StatusCode::CREATED, Json(recorded)))
}
