//! HeartBalance Shared Types and Utilities
//!
//! This crate contains the domain types, errors, and pure domain logic
//! (rank engine, health metrics) shared across the HeartBalance backend.

pub mod db;
pub mod error;
pub mod gamification;
pub mod health;
pub mod types;

pub use db::*;
pub use error::*;
pub use gamification::{GamifiedAction, Rank, RankProgress, StreakUpdate};
pub use types::*;
