//! Rank progress and the public rank table

use axum::{
    extract::{Extension, State},
    http::header,
    response::IntoResponse,
    Json,
};
use heartbalance_shared::gamification::{
    HEALTHY_MEAL_BONUS_XP, MEAL_XP, OTHER_XP, RECIPE_XP, WATER_GOAL_XP, WORKOUT_XP,
};
use heartbalance_shared::{Rank, RankProgress};
use serde::Serialize;

use super::profile::load_profile;
use crate::{auth::AuthUser, error::ApiResult, progress::ensure_profile, state::AppState};

#[derive(Debug, Serialize)]
pub struct RankResponse {
    #[serde(flatten)]
    pub progress: RankProgress,
    pub dias_consecutivos: i32,
    pub metas_concluidas: i32,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RankTier {
    pub rank: Rank,
    pub min_xp: u64,
    /// Exclusive upper bound; `None` for the top rank
    pub max_xp: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct XpAward {
    pub action: &'static str,
    pub xp: u32,
}

#[derive(Debug, Serialize)]
pub struct RankTableResponse {
    pub ranks: Vec<RankTier>,
    pub awards: Vec<XpAward>,
}

pub fn rank_table() -> RankTableResponse {
    let ranks = Rank::ALL
        .iter()
        .map(|rank| RankTier {
            rank: *rank,
            min_xp: rank.min_xp(),
            max_xp: rank.next().map(|next| next.min_xp()),
        })
        .collect();

    let awards = vec![
        XpAward { action: "exercicio", xp: WORKOUT_XP },
        XpAward { action: "refeicao", xp: MEAL_XP },
        XpAward { action: "refeicao_saudavel_bonus", xp: HEALTHY_MEAL_BONUS_XP },
        XpAward { action: "receita", xp: RECIPE_XP },
        XpAward { action: "meta_agua", xp: WATER_GOAL_XP },
        XpAward { action: "outro", xp: OTHER_XP },
    ];

    RankTableResponse { ranks, awards }
}

/// Current user's rank progress
pub async fn get_rank(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<RankResponse>> {
    ensure_profile(&state.pool, auth_user.user_id).await?;
    let profile = load_profile(&state.pool, auth_user.user_id).await?;

    Ok(Json(RankResponse {
        progress: RankProgress::for_xp(profile.xp()),
        dias_consecutivos: profile.dias_consecutivos,
        metas_concluidas: profile.metas_concluidas,
    }))
}

/// Rank thresholds and XP awards; static, so cacheable
pub async fn list_ranks() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(rank_table()),
    )
}
