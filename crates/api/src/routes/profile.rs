//! Profile routes

use axum::{
    extract::{Extension, State},
    Json,
};
use heartbalance_billing::PremiumStatus;
use heartbalance_shared::{Profile, RankProgress};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    progress::ensure_profile,
    state::AppState,
};

pub(crate) const PROFILE_COLUMNS: &str = "id, nome, role, plano_ativo, plano_tipo, premium_until, \
     xp_total, rank, metas_concluidas, dias_consecutivos, ultima_atividade, sexo, idade, peso_kg, \
     altura_cm, nivel_atividade, basal_kcal, gasto_diario_kcal, meta_agua_ml, onboarding_concluido, \
     created_at, updated_at";

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: Profile,
    pub rank: RankProgress,
    pub premium: PremiumStatus,
}

/// Only these fields are user-editable; XP, rank and plan are server-owned
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub peso_kg: Option<f64>,
    #[serde(default)]
    pub altura_cm: Option<f64>,
    #[serde(default)]
    pub meta_agua_ml: Option<i32>,
}

impl UpdateProfileRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(nome) = &self.nome {
            let len = nome.trim().chars().count();
            if len == 0 || len > 100 {
                return Err(ApiError::Validation(
                    "nome must be between 1 and 100 characters".to_string(),
                ));
            }
        }
        if let Some(peso) = self.peso_kg {
            if !(20.0..=400.0).contains(&peso) {
                return Err(ApiError::Validation("peso_kg must be between 20 and 400".to_string()));
            }
        }
        if let Some(altura) = self.altura_cm {
            if !(100.0..=250.0).contains(&altura) {
                return Err(ApiError::Validation(
                    "altura_cm must be between 100 and 250".to_string(),
                ));
            }
        }
        if let Some(meta) = self.meta_agua_ml {
            if !(500..=10_000).contains(&meta) {
                return Err(ApiError::Validation(
                    "meta_agua_ml must be between 500 and 10000".to_string(),
                ));
            }
        }
        Ok(())
    }
}

pub(crate) async fn load_profile<'e, E>(executor: E, user_id: Uuid) -> ApiResult<Profile>
where
    E: PgExecutor<'e>,
{
    let profile: Profile = sqlx::query_as(&format!(
        "SELECT {} FROM profiles WHERE id = $1",
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_one(executor)
    .await?;
    Ok(profile)
}

async fn profile_response(state: &AppState, profile: Profile) -> ApiResult<ProfileResponse> {
    let premium = state.entitlement.premium_status(profile.id).await?;
    Ok(ProfileResponse {
        rank: RankProgress::for_xp(profile.xp()),
        premium,
        profile,
    })
}

/// Get the current user's profile, creating it on first access
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ProfileResponse>> {
    ensure_profile(&state.pool, auth_user.user_id).await?;
    let profile = load_profile(&state.pool, auth_user.user_id).await?;
    Ok(Json(profile_response(&state, profile).await?))
}

/// Update editable profile fields
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    req.validate()?;
    ensure_profile(&state.pool, auth_user.user_id).await?;

    let profile: Profile = sqlx::query_as(&format!(
        r#"
        UPDATE profiles
        SET nome = COALESCE($2, nome),
            peso_kg = COALESCE($3, peso_kg),
            altura_cm = COALESCE($4, altura_cm),
            meta_agua_ml = COALESCE($5, meta_agua_ml),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(auth_user.user_id)
    .bind(req.nome.as_deref().map(str::trim))
    .bind(req.peso_kg)
    .bind(req.altura_cm)
    .bind(req.meta_agua_ml)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(user_id = %auth_user.user_id, "Profile updated");

    Ok(Json(profile_response(&state, profile).await?))
}
