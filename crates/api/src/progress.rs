//! XP awards and profile progression
//!
//! Every XP-earning action goes through `record_action`, inside the caller's
//! transaction: the activity log row and the profile's XP, rank, streak and
//! goal counter are written together or not at all.

use heartbalance_shared::{ActivityLog, GamifiedAction, Rank, RankProgress, StreakUpdate};
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor};
use time::macros::offset;
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::error::ApiError;

/// Day boundaries follow Brasília time (no DST since 2019)
pub const APP_UTC_OFFSET: UtcOffset = offset!(-3);

/// Current calendar day for streaks and daily totals
pub fn today() -> Date {
    OffsetDateTime::now_utc().to_offset(APP_UTC_OFFSET).date()
}

/// Create the profile row for a freshly signed-up user
pub async fn ensure_profile<'e, E>(executor: E, user_id: Uuid) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("INSERT INTO profiles (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Outcome of an XP-earning action
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecorded {
    pub activity: ActivityLog,
    pub xp_ganho: u32,
    pub xp_total: u64,
    pub rank: Rank,
    pub rank_up: bool,
    pub dias_consecutivos: i32,
    pub progress: RankProgress,
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    xp_total: i64,
    dias_consecutivos: i32,
    ultima_atividade: Option<Date>,
}

fn stored_xp(user_id: Uuid, xp_total: i64) -> Result<u64, ApiError> {
    u64::try_from(xp_total).map_err(|_| {
        tracing::error!(user_id = %user_id, xp_total, "Profile has negative XP");
        ApiError::Database(format!("negative xp_total for profile {}", user_id))
    })
}

/// Log an activity and apply its XP award to the profile.
/// Runs on the caller's transaction; the profile row is locked until commit.
pub async fn record_action(
    conn: &mut PgConnection,
    user_id: Uuid,
    action: GamifiedAction,
    descricao: &str,
    duracao_min: Option<i32>,
    day: Date,
) -> Result<ActionRecorded, ApiError> {
    ensure_profile(&mut *conn, user_id).await?;

    let current: ProgressRow = sqlx::query_as(
        r#"
        SELECT xp_total, dias_consecutivos, ultima_atividade
        FROM profiles
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let award = action.xp();
    let previous_xp = stored_xp(user_id, current.xp_total)?;
    let xp_total = previous_xp + u64::from(award);
    let previous_rank = Rank::from_xp(previous_xp);
    let rank = Rank::from_xp(xp_total);
    let streak = StreakUpdate::apply(current.ultima_atividade, current.dias_consecutivos, day);

    let activity: ActivityLog = sqlx::query_as(
        r#"
        INSERT INTO activity_logs (user_id, tipo, descricao, xp_ganho, duracao_min, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, tipo, descricao, xp_ganho, duracao_min, data, created_at
        "#,
    )
    .bind(user_id)
    .bind(action.activity_kind().as_str())
    .bind(descricao)
    .bind(award as i32)
    .bind(duracao_min)
    .bind(day)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE profiles
        SET xp_total = xp_total + $2,
            rank = $3,
            dias_consecutivos = $4,
            ultima_atividade = $5,
            metas_concluidas = metas_concluidas + 1,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(i64::from(award))
    .bind(rank.as_str())
    .bind(streak.dias_consecutivos)
    .bind(streak.ultima_atividade)
    .execute(&mut *conn)
    .await?;

    if rank > previous_rank {
        tracing::info!(user_id = %user_id, from = %previous_rank, to = %rank, "Rank up");
    }
    tracing::debug!(
        user_id = %user_id,
        action = ?action,
        xp_ganho = award,
        xp_total,
        "XP awarded"
    );

    Ok(ActionRecorded {
        activity,
        xp_ganho: award,
        xp_total,
        rank,
        rank_up: rank > previous_rank,
        dias_consecutivos: streak.dias_consecutivos,
        progress: RankProgress::for_xp(xp_total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_today_uses_brasilia_offset() {
        let utc_now = OffsetDateTime::now_utc();
        let expected = utc_now.to_offset(offset!(-3)).date();
        // The two calls can straddle midnight; allow one day of slack
        let got = today();
        assert!(got == expected || got == expected.next_day().unwrap_or(expected));
    }

    #[test]
    fn test_negative_stored_xp_is_an_error() {
        let user_id = Uuid::new_v4();
        assert_eq!(stored_xp(user_id, 120).unwrap(), 120);
        assert!(matches!(stored_xp(user_id, -5), Err(ApiError::Database(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_record_action_is_atomic_and_monotonic() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = heartbalance_shared::db::create_pool(&database_url, 2).await.unwrap();
        heartbalance_shared::db::run_migrations(&pool).await.unwrap();
        let user_id = Uuid::new_v4();
        let day = today();

        let mut tx = pool.begin().await.unwrap();
        let first = record_action(&mut tx, user_id, GamifiedAction::Workout, "Corrida", Some(30), day)
            .await
            .unwrap();
        let second = record_action(&mut tx, user_id, GamifiedAction::Meal { healthy: true }, "Salada", None, day)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.xp_total, 20);
        assert_eq!(second.xp_total, 35);
        assert_eq!(second.dias_consecutivos, 1);

        let (xp, rank, metas): (i64, String, i32) =
            sqlx::query_as("SELECT xp_total, rank, metas_concluidas FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(xp, 35);
        assert_eq!(rank, "Iniciante");
        assert_eq!(metas, 2);

        // Rolled back work leaves no trace
        let mut tx = pool.begin().await.unwrap();
        record_action(&mut tx, user_id, GamifiedAction::Recipe, "Receita", None, day)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let (xp,): (i64,) = sqlx::query_as("SELECT xp_total FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(xp, 35);
    }

    #[tokio::test]
    #[ignore]
    async fn test_backdated_action_keeps_streak_and_last_day() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = heartbalance_shared::db::create_pool(&database_url, 2).await.unwrap();
        heartbalance_shared::db::run_migrations(&pool).await.unwrap();
        let user_id = Uuid::new_v4();
        let day = today();

        ensure_profile(&pool, user_id).await.unwrap();
        sqlx::query("UPDATE profiles SET dias_consecutivos = 10, ultima_atividade = $2 WHERE id = $1")
            .bind(user_id)
            .bind(day)
            .execute(&pool)
            .await
            .unwrap();

        let two_days_ago = day.previous_day().and_then(|d| d.previous_day()).unwrap();
        let mut tx = pool.begin().await.unwrap();
        let recorded = record_action(&mut tx, user_id, GamifiedAction::Meal { healthy: false }, "Jantar esquecido", None, two_days_ago)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(recorded.dias_consecutivos, 10);
        assert_eq!(recorded.activity.data, two_days_ago);

        let (streak, last): (i32, Option<Date>) =
            sqlx::query_as("SELECT dias_consecutivos, ultima_atividade FROM profiles WHERE id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(streak, 10);
        assert_eq!(last, Some(day));
    }
}
