//! Premium expiry against Postgres

use heartbalance_billing::EntitlementService;
use uuid::Uuid;

use crate::webhook_flow::setup_pool;

#[tokio::test]
#[ignore]
async fn test_expire_lapsed_plans_clears_both_flags() {
    let pool = setup_pool().await;
    let lapsed = Uuid::new_v4();
    let current = Uuid::new_v4();

    for (user_id, until) in [(lapsed, "NOW() - INTERVAL '1 day'"), (current, "NOW() + INTERVAL '10 days'")] {
        sqlx::query(&format!(
            "INSERT INTO profiles (id, plano_ativo, plano_tipo, premium_until) VALUES ($1, TRUE, 'mensal', {})",
            until
        ))
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO legacy_user_profiles (user_id, plano_ativo) VALUES ($1, TRUE)")
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();
    }

    let entitlement = EntitlementService::new(pool.clone());

    // Reads already ignore the lapsed plan before the sweep runs
    assert!(!entitlement.premium_status(lapsed).await.unwrap().is_premium);
    assert!(entitlement.premium_status(current).await.unwrap().is_premium);

    let mut expired = Vec::new();
    loop {
        let batch = entitlement.expire_lapsed_plans(500).await.unwrap();
        if batch.is_empty() {
            break;
        }
        expired.extend(batch);
    }
    assert!(expired.contains(&lapsed));
    assert!(!expired.contains(&current));

    let (profile_flag, legacy_flag): (bool, bool) = sqlx::query_as(
        r#"
        SELECT p.plano_ativo, l.plano_ativo
        FROM profiles p JOIN legacy_user_profiles l ON l.user_id = p.id
        WHERE p.id = $1
        "#,
    )
    .bind(lapsed)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(!profile_flag);
    assert!(!legacy_flag);

    let (still_active,): (bool,) = sqlx::query_as("SELECT plano_ativo FROM profiles WHERE id = $1")
        .bind(current)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(still_active);
}
