//! Premium Entitlement Module
//!
//! Answers the question: "may this user use premium features right now?"
//!
//! Premium is granted by any of three independent sources:
//! the legacy profile flag, `profiles.plano_ativo`, or the admin role.
//! The two paid flags only count while `premium_until` is unset or in the
//! future; the admin role always counts.
//!
//! `resolve_premium()` is the single function that makes this decision.

use heartbalance_shared::Role;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventType};

/// Which source granted (or would have granted) premium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PremiumSource {
    AdminRole,
    ProfileFlag,
    LegacyFlag,
    None,
}

impl std::fmt::Display for PremiumSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PremiumSource::AdminRole => write!(f, "admin_role"),
            PremiumSource::ProfileFlag => write!(f, "profile_flag"),
            PremiumSource::LegacyFlag => write!(f, "legacy_flag"),
            PremiumSource::None => write!(f, "none"),
        }
    }
}

/// Raw data needed to resolve premium access
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PremiumSources {
    pub user_id: Uuid,
    pub role: String,
    pub profile_plano_ativo: bool,
    pub legacy_plano_ativo: bool,
    pub plano_tipo: Option<String>,
    pub premium_until: Option<OffsetDateTime>,
}

/// Outcome of premium resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumStatus {
    pub is_premium: bool,
    pub source: PremiumSource,
    pub plano_tipo: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub premium_until: Option<OffsetDateTime>,
    /// A paid flag is still set but `premium_until` has passed
    pub expired: bool,
}

/// Pure function: resolve premium access from raw sources.
/// Deterministic given `now`.
pub fn resolve_premium(sources: &PremiumSources, now: OffsetDateTime) -> PremiumStatus {
    let expired = sources
        .premium_until
        .map(|until| until <= now)
        .unwrap_or(false);
    let paid_flag_valid = !expired;

    let source = if Role::parse(&sources.role) == Role::Admin {
        PremiumSource::AdminRole
    } else if sources.profile_plano_ativo && paid_flag_valid {
        PremiumSource::ProfileFlag
    } else if sources.legacy_plano_ativo && paid_flag_valid {
        PremiumSource::LegacyFlag
    } else {
        PremiumSource::None
    };

    PremiumStatus {
        is_premium: source != PremiumSource::None,
        source,
        plano_tipo: sources.plano_tipo.clone(),
        premium_until: sources.premium_until,
        expired: expired && (sources.profile_plano_ativo || sources.legacy_plano_ativo),
    }
}

/// Entitlement service for loading and resolving premium access
#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve premium status for a user
    pub async fn premium_status(&self, user_id: Uuid) -> BillingResult<PremiumStatus> {
        let sources = self.load_sources(user_id).await?;
        let status = resolve_premium(&sources, OffsetDateTime::now_utc());

        if status.expired {
            tracing::debug!(
                user_id = %user_id,
                premium_until = ?status.premium_until,
                "Paid premium flag present but plan expired"
            );
        }

        Ok(status)
    }

    /// Load the three premium sources in one query
    async fn load_sources(&self, user_id: Uuid) -> BillingResult<PremiumSources> {
        let result: Option<PremiumSources> = sqlx::query_as(
            r#"
            SELECT
                p.id AS user_id,
                p.role,
                p.plano_ativo AS profile_plano_ativo,
                COALESCE(l.plano_ativo, false) AS legacy_plano_ativo,
                p.plano_tipo,
                p.premium_until
            FROM profiles p
            LEFT JOIN legacy_user_profiles l ON l.user_id = p.id
            WHERE p.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        result.ok_or_else(|| BillingError::NotFound(format!("Profile {} not found", user_id)))
    }

    /// Clear the paid flags of plans whose `premium_until` has passed.
    /// Returns the users whose premium was revoked.
    pub async fn expire_lapsed_plans(&self, limit: i64) -> BillingResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let expired: Vec<(Uuid, Option<String>, Option<OffsetDateTime>)> = sqlx::query_as(
            r#"
            UPDATE profiles
            SET plano_ativo = FALSE, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM profiles
                WHERE (plano_ativo = TRUE OR EXISTS (
                        SELECT 1 FROM legacy_user_profiles l
                        WHERE l.user_id = profiles.id AND l.plano_ativo = TRUE
                    ))
                  AND premium_until IS NOT NULL
                  AND premium_until <= NOW()
                ORDER BY premium_until ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, plano_tipo, premium_until
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let user_ids: Vec<Uuid> = expired.iter().map(|(id, _, _)| *id).collect();

        if !user_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE legacy_user_profiles
                SET plano_ativo = FALSE, updated_at = NOW()
                WHERE user_id = ANY($1)
                "#,
            )
            .bind(&user_ids)
            .execute(&mut *tx)
            .await?;
        }

        for (user_id, plano_tipo, premium_until) in &expired {
            BillingEventBuilder::new(*user_id, BillingEventType::PremiumExpired)
                .data(serde_json::json!({
                    "plano": plano_tipo,
                    "premium_until": premium_until.map(|t| t.unix_timestamp()),
                }))
                .insert(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        for user_id in &user_ids {
            tracing::info!(user_id = %user_id, "Premium plan expired");
        }

        Ok(user_ids)
    }
}
