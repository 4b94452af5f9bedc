//! Onboarding quiz

use axum::{
    extract::{Extension, State},
    Json,
};
use heartbalance_shared::health::{water_goal_ml, BodyMeasurements, NivelAtividade, Sexo};
use heartbalance_shared::Profile;
use serde::{Deserialize, Serialize};

use super::profile::PROFILE_COLUMNS;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    pub nome: String,
    pub sexo: Sexo,
    pub idade: i32,
    pub peso_kg: f64,
    pub altura_cm: f64,
    pub nivel_atividade: NivelAtividade,
}

#[derive(Debug, Serialize)]
pub struct OnboardingResponse {
    pub profile: Profile,
    pub basal_kcal: f64,
    pub gasto_diario_kcal: f64,
    pub meta_agua_ml: i32,
    pub imc: f64,
}

/// Metrics derived from the quiz answers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnboardingMetrics {
    pub basal_kcal: f64,
    pub gasto_diario_kcal: f64,
    pub meta_agua_ml: i32,
    pub imc: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn compute_metrics(req: &OnboardingRequest) -> ApiResult<OnboardingMetrics> {
    let nome = req.nome.trim();
    if nome.is_empty() || nome.chars().count() > 100 {
        return Err(ApiError::Validation(
            "nome must be between 1 and 100 characters".to_string(),
        ));
    }

    let body = BodyMeasurements {
        sexo: req.sexo,
        idade: req.idade,
        peso_kg: req.peso_kg,
        altura_cm: req.altura_cm,
    };
    body.validate()?;

    Ok(OnboardingMetrics {
        basal_kcal: round1(body.basal_kcal()),
        gasto_diario_kcal: round1(body.daily_kcal(req.nivel_atividade)),
        meta_agua_ml: water_goal_ml(Some(req.peso_kg)),
        imc: round1(body.bmi()),
    })
}

/// Store quiz answers and the computed metrics on the profile
pub async fn complete_onboarding(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<OnboardingRequest>,
) -> ApiResult<Json<OnboardingResponse>> {
    let metrics = compute_metrics(&req)?;

    let profile: Profile = sqlx::query_as(&format!(
        r#"
        INSERT INTO profiles (
            id, nome, sexo, idade, peso_kg, altura_cm, nivel_atividade,
            basal_kcal, gasto_diario_kcal, meta_agua_ml, onboarding_concluido
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)
        ON CONFLICT (id) DO UPDATE SET
            nome = EXCLUDED.nome,
            sexo = EXCLUDED.sexo,
            idade = EXCLUDED.idade,
            peso_kg = EXCLUDED.peso_kg,
            altura_cm = EXCLUDED.altura_cm,
            nivel_atividade = EXCLUDED.nivel_atividade,
            basal_kcal = EXCLUDED.basal_kcal,
            gasto_diario_kcal = EXCLUDED.gasto_diario_kcal,
            meta_agua_ml = EXCLUDED.meta_agua_ml,
            onboarding_concluido = TRUE,
            updated_at = NOW()
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(auth_user.user_id)
    .bind(req.nome.trim())
    .bind(req.sexo.as_str())
    .bind(req.idade)
    .bind(req.peso_kg)
    .bind(req.altura_cm)
    .bind(req.nivel_atividade.as_str())
    .bind(metrics.basal_kcal)
    .bind(metrics.gasto_diario_kcal)
    .bind(metrics.meta_agua_ml)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        user_id = %auth_user.user_id,
        nivel_atividade = req.nivel_atividade.as_str(),
        "Onboarding completed"
    );

    Ok(Json(OnboardingResponse {
        profile,
        basal_kcal: metrics.basal_kcal,
        gasto_diario_kcal: metrics.gasto_diario_kcal,
        meta_agua_ml: metrics.meta_agua_ml,
        imc: metrics.imc,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> OnboardingRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_metrics_for_typical_answers() {
        let req = request(serde_json::json!({
            "nome": "Maria",
            "sexo": "feminino",
            "idade": 30,
            "peso_kg": 60.0,
            "altura_cm": 165.0,
            "nivel_atividade": "moderado"
        }));

        let metrics = compute_metrics(&req).unwrap();
        // 10*60 + 6.25*165 - 5*30 - 161
        assert_eq!(metrics.basal_kcal, 1320.3);
        assert_eq!(metrics.meta_agua_ml, 2100);
        assert_eq!(metrics.imc, 22.0);
        assert!(metrics.gasto_diario_kcal > metrics.basal_kcal);
    }

    #[test]
    fn test_rejects_implausible_measurements() {
        let req = request(serde_json::json!({
            "nome": "Teste",
            "sexo": "masculino",
            "idade": 5,
            "peso_kg": 70.0,
            "altura_cm": 175.0,
            "nivel_atividade": "sedentario"
        }));
        assert!(matches!(compute_metrics(&req), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_rejects_blank_name() {
        let req = request(serde_json::json!({
            "nome": "  ",
            "sexo": "masculino",
            "idade": 40,
            "peso_kg": 80.0,
            "altura_cm": 180.0,
            "nivel_atividade": "leve"
        }));
        assert!(compute_metrics(&req).is_err());
    }
}
