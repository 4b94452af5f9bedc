//! Common types used across HeartBalance

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use crate::error::HeartError;

// =============================================================================
// Enums
// =============================================================================

/// Role stored on `profiles.role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Lenient parse: anything that is not `admin` is a regular user.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

/// Premium plan sold through checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Mensal,
    Trimestral,
    Anual,
}

impl PlanType {
    pub const ALL: [PlanType; 3] = [PlanType::Mensal, PlanType::Trimestral, PlanType::Anual];

    /// How long one purchase of this plan keeps premium active
    pub fn duration_days(&self) -> i64 {
        match self {
            Self::Mensal => 30,
            Self::Trimestral => 90,
            Self::Anual => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mensal => "mensal",
            Self::Trimestral => "trimestral",
            Self::Anual => "anual",
        }
    }

    /// Checkout title shown by the payment provider
    pub fn title(&self) -> &'static str {
        match self {
            Self::Mensal => "HeartBalance Premium - Mensal",
            Self::Trimestral => "HeartBalance Premium - Trimestral",
            Self::Anual => "HeartBalance Premium - Anual",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = HeartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mensal" | "monthly" => Ok(Self::Mensal),
            "trimestral" | "quarterly" => Ok(Self::Trimestral),
            "anual" | "annual" | "yearly" => Ok(Self::Anual),
            other => Err(HeartError::Validation(format!("Unknown plan: {}", other))),
        }
    }
}

/// Kind of a logged activity (`activity_logs.tipo`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Exercicio,
    Alimentacao,
    Outro,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exercicio => "exercicio",
            Self::Alimentacao => "alimentacao",
            Self::Outro => "outro",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = HeartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exercicio" => Ok(Self::Exercicio),
            "alimentacao" => Ok(Self::Alimentacao),
            "outro" => Ok(Self::Outro),
            other => Err(HeartError::Validation(format!(
                "Unknown activity type: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

/// `profiles` row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub nome: Option<String>,
    pub role: String,
    pub plano_ativo: bool,
    pub plano_tipo: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub premium_until: Option<OffsetDateTime>,
    pub xp_total: i64,
    pub rank: String,
    pub metas_concluidas: i32,
    pub dias_consecutivos: i32,
    pub ultima_atividade: Option<Date>,
    pub sexo: Option<String>,
    pub idade: Option<i32>,
    pub peso_kg: Option<f64>,
    pub altura_cm: Option<f64>,
    pub nivel_atividade: Option<String>,
    pub basal_kcal: Option<f64>,
    pub gasto_diario_kcal: Option<f64>,
    pub meta_agua_ml: Option<i32>,
    pub onboarding_concluido: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Profile {
    /// XP as an unsigned count; a corrupt negative value reads as zero.
    pub fn xp(&self) -> u64 {
        u64::try_from(self.xp_total).unwrap_or(0)
    }
}

/// `activity_logs` row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tipo: String,
    pub descricao: String,
    pub xp_ganho: i32,
    pub duracao_min: Option<i32>,
    pub data: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// `colesterol_records` row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ColesterolRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ldl: f64,
    pub hdl: f64,
    pub total: f64,
    pub triglicerides: f64,
    pub data_exame: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// `meal_logs` row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub calories: Option<i32>,
    pub is_healthy: bool,
    pub image_url: Option<String>,
    pub date: Date,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// `water_logs` row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaterLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quantidade_ml: i32,
    pub data: Date,
    pub hora: Time,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
