//! Gamification Engine
//!
//! XP awards, rank derivation and daily streaks.
//!
//! `Rank::from_xp` is the only place where XP is mapped to a rank. Every
//! writer of `profiles.rank` and every reader that reports a rank goes
//! through it, so the thresholds cannot drift between call sites.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::types::ActivityKind;

/// Progression tier derived from cumulative XP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    Iniciante,
    Bronze,
    Prata,
    Ouro,
    Diamante,
    Mestre,
}

impl Rank {
    /// All ranks in ascending order
    pub const ALL: [Rank; 6] = [
        Rank::Iniciante,
        Rank::Bronze,
        Rank::Prata,
        Rank::Ouro,
        Rank::Diamante,
        Rank::Mestre,
    ];

    /// Resolve the rank for a cumulative XP total.
    /// Bands are half-open: [0,100) [100,300) [300,600) [600,1000) [1000,1500) [1500,∞)
    pub fn from_xp(xp: u64) -> Self {
        match xp {
            0..=99 => Self::Iniciante,
            100..=299 => Self::Bronze,
            300..=599 => Self::Prata,
            600..=999 => Self::Ouro,
            1000..=1499 => Self::Diamante,
            _ => Self::Mestre,
        }
    }

    /// Inclusive lower XP bound of this rank
    pub fn min_xp(&self) -> u64 {
        match self {
            Self::Iniciante => 0,
            Self::Bronze => 100,
            Self::Prata => 300,
            Self::Ouro => 600,
            Self::Diamante => 1000,
            Self::Mestre => 1500,
        }
    }

    /// The rank after this one, if any
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Iniciante => Some(Self::Bronze),
            Self::Bronze => Some(Self::Prata),
            Self::Prata => Some(Self::Ouro),
            Self::Ouro => Some(Self::Diamante),
            Self::Diamante => Some(Self::Mestre),
            Self::Mestre => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iniciante => "Iniciante",
            Self::Bronze => "Bronze",
            Self::Prata => "Prata",
            Self::Ouro => "Ouro",
            Self::Diamante => "Diamante",
            Self::Mestre => "Mestre",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a user stands inside their current rank band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankProgress {
    pub xp_total: u64,
    pub rank: Rank,
    pub next_rank: Option<Rank>,
    /// XP still missing to reach `next_rank` (0 at the top rank)
    pub xp_to_next: u64,
    /// Progress through the current band, 0-100 (100 at the top rank)
    pub progress_percent: u8,
}

impl RankProgress {
    pub fn for_xp(xp_total: u64) -> Self {
        let rank = Rank::from_xp(xp_total);
        let next_rank = rank.next();

        let (xp_to_next, progress_percent) = match next_rank {
            Some(next) => {
                let band = next.min_xp() - rank.min_xp();
                let done = xp_total - rank.min_xp();
                let percent = (done * 100 / band).min(100) as u8;
                (next.min_xp() - xp_total, percent)
            }
            None => (0, 100),
        };

        Self {
            xp_total,
            rank,
            next_rank,
            xp_to_next,
            progress_percent,
        }
    }
}

/// Actions that earn XP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamifiedAction {
    Workout,
    Meal { healthy: bool },
    Recipe,
    WaterGoal,
    Other,
}

pub const WORKOUT_XP: u32 = 20;
pub const MEAL_XP: u32 = 10;
pub const HEALTHY_MEAL_BONUS_XP: u32 = 5;
pub const RECIPE_XP: u32 = 15;
pub const WATER_GOAL_XP: u32 = 10;
pub const OTHER_XP: u32 = 5;

impl GamifiedAction {
    /// XP granted for this action
    pub fn xp(&self) -> u32 {
        match self {
            Self::Workout => WORKOUT_XP,
            Self::Meal { healthy: true } => MEAL_XP + HEALTHY_MEAL_BONUS_XP,
            Self::Meal { healthy: false } => MEAL_XP,
            Self::Recipe => RECIPE_XP,
            Self::WaterGoal => WATER_GOAL_XP,
            Self::Other => OTHER_XP,
        }
    }

    /// Activity log category the action is recorded under
    pub fn activity_kind(&self) -> ActivityKind {
        match self {
            Self::Workout => ActivityKind::Exercicio,
            Self::Meal { .. } | Self::Recipe => ActivityKind::Alimentacao,
            Self::WaterGoal | Self::Other => ActivityKind::Outro,
        }
    }

    /// Map a free-form activity log kind to its action
    pub fn from_kind(kind: ActivityKind) -> Self {
        match kind {
            ActivityKind::Exercicio => Self::Workout,
            ActivityKind::Alimentacao => Self::Meal { healthy: false },
            ActivityKind::Outro => Self::Other,
        }
    }
}

/// Result of applying one day's activity to a streak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub dias_consecutivos: i32,
    /// Latest activity day after the update; never moves backwards
    pub ultima_atividade: Date,
}

impl StreakUpdate {
    /// Compute the streak after an action dated `day`.
    ///
    /// Same day keeps the streak, the following day extends it and any gap
    /// restarts at 1. A backdated action (before the last activity) leaves
    /// both the streak and the last activity day untouched.
    pub fn apply(last_activity: Option<Date>, current: i32, day: Date) -> Self {
        match last_activity {
            Some(last) if last >= day => Self {
                dias_consecutivos: current.max(1),
                ultima_atividade: last,
            },
            Some(last) if last.next_day() == Some(day) => Self {
                dias_consecutivos: current.max(0).saturating_add(1),
                ultima_atividade: day,
            },
            _ => Self {
                dias_consecutivos: 1,
                ultima_atividade: day,
            },
        }
    }
}
