//! Health metric formulas used by onboarding and exam tracking

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HeartError, HeartResult};

/// Daily water recommendation per kilogram of body weight
pub const WATER_ML_PER_KG: f64 = 35.0;

/// Fallback daily water goal when weight is unknown
pub const DEFAULT_WATER_GOAL_ML: i32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sexo {
    Masculino,
    Feminino,
}

impl Sexo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Masculino => "masculino",
            Self::Feminino => "feminino",
        }
    }
}

/// Self-reported activity level from the onboarding quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NivelAtividade {
    Sedentario,
    Leve,
    Moderado,
    Intenso,
    MuitoIntenso,
}

impl NivelAtividade {
    /// Harris-Benedict activity multiplier
    pub fn factor(&self) -> f64 {
        match self {
            Self::Sedentario => 1.2,
            Self::Leve => 1.375,
            Self::Moderado => 1.55,
            Self::Intenso => 1.725,
            Self::MuitoIntenso => 1.9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sedentario => "sedentario",
            Self::Leve => "leve",
            Self::Moderado => "moderado",
            Self::Intenso => "intenso",
            Self::MuitoIntenso => "muito_intenso",
        }
    }
}

impl FromStr for NivelAtividade {
    type Err = HeartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sedentario" => Ok(Self::Sedentario),
            "leve" => Ok(Self::Leve),
            "moderado" => Ok(Self::Moderado),
            "intenso" => Ok(Self::Intenso),
            "muito_intenso" => Ok(Self::MuitoIntenso),
            other => Err(HeartError::Validation(format!(
                "Unknown activity level: {}",
                other
            ))),
        }
    }
}

/// Body measurements collected at onboarding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyMeasurements {
    pub sexo: Sexo,
    pub idade: i32,
    pub peso_kg: f64,
    pub altura_cm: f64,
}

impl BodyMeasurements {
    /// Reject values outside plausible human ranges
    pub fn validate(&self) -> HeartResult<()> {
        if !(10..=120).contains(&self.idade) {
            return Err(HeartError::Validation(
                "idade must be between 10 and 120".to_string(),
            ));
        }
        if !(20.0..=400.0).contains(&self.peso_kg) {
            return Err(HeartError::Validation(
                "peso_kg must be between 20 and 400".to_string(),
            ));
        }
        if !(100.0..=250.0).contains(&self.altura_cm) {
            return Err(HeartError::Validation(
                "altura_cm must be between 100 and 250".to_string(),
            ));
        }
        Ok(())
    }

    /// Basal metabolic rate in kcal/day (Mifflin-St Jeor)
    pub fn basal_kcal(&self) -> f64 {
        let base = 10.0 * self.peso_kg + 6.25 * self.altura_cm - 5.0 * f64::from(self.idade);
        match self.sexo {
            Sexo::Masculino => base + 5.0,
            Sexo::Feminino => base - 161.0,
        }
    }

    /// Total daily energy expenditure in kcal/day
    pub fn daily_kcal(&self, nivel: NivelAtividade) -> f64 {
        self.basal_kcal() * nivel.factor()
    }

    pub fn bmi(&self) -> f64 {
        let meters = self.altura_cm / 100.0;
        self.peso_kg / (meters * meters)
    }
}

/// Daily water goal in ml
pub fn water_goal_ml(peso_kg: Option<f64>) -> i32 {
    match peso_kg {
        Some(kg) if kg > 0.0 => (kg * WATER_ML_PER_KG).round() as i32,
        _ => DEFAULT_WATER_GOAL_ML,
    }
}

/// LDL cholesterol classification (mg/dL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LdlClass {
    Otimo,
    Desejavel,
    Limitrofe,
    Alto,
    MuitoAlto,
}

impl LdlClass {
    pub fn classify(ldl: f64) -> Self {
        if ldl < 100.0 {
            Self::Otimo
        } else if ldl < 130.0 {
            Self::Desejavel
        } else if ldl < 160.0 {
            Self::Limitrofe
        } else if ldl < 190.0 {
            Self::Alto
        } else {
            Self::MuitoAlto
        }
    }
}

impl fmt::Display for LdlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Otimo => "ótimo",
            Self::Desejavel => "desejável",
            Self::Limitrofe => "limítrofe",
            Self::Alto => "alto",
            Self::MuitoAlto => "muito alto",
        };
        f.write_str(s)
    }
}

/// Sanity check for lipid panel values (mg/dL)
pub fn validate_lipid_panel(ldl: f64, hdl: f64, total: f64, triglicerides: f64) -> HeartResult<()> {
    for (name, value) in [
        ("ldl", ldl),
        ("hdl", hdl),
        ("total", total),
        ("triglicerides", triglicerides),
    ] {
        if !value.is_finite() || value <= 0.0 || value > 2000.0 {
            return Err(HeartError::Validation(format!(
                "{} must be between 0 and 2000 mg/dL",
                name
            )));
        }
    }
    Ok(())
}
