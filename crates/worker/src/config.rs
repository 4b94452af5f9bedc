//! Worker configuration

use std::env;

/// Schedules use six-field cron expressions (seconds first)
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub webhook_retry_cron: String,
    pub webhook_retry_batch: i64,
    pub webhook_cleanup_cron: String,
    pub webhook_retention_days: i32,
    pub premium_expiry_cron: String,
    pub premium_expiry_batch: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| WorkerConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_var("WORKER_DATABASE_MAX_CONNECTIONS", 5)?,
            webhook_retry_cron: cron_var("WEBHOOK_RETRY_CRON", "0 */2 * * * *")?,
            webhook_retry_batch: parse_var("WEBHOOK_RETRY_BATCH", 50)?,
            webhook_cleanup_cron: cron_var("WEBHOOK_CLEANUP_CRON", "0 30 3 * * *")?,
            webhook_retention_days: parse_var("WEBHOOK_RETENTION_DAYS", 90)?,
            premium_expiry_cron: cron_var("PREMIUM_EXPIRY_CRON", "0 */10 * * * *")?,
            premium_expiry_batch: parse_var("PREMIUM_EXPIRY_BATCH", 200)?,
        })
    }
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, WorkerConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => Ok(value),
            _ => Err(WorkerConfigError::InvalidValue { key, value: raw }),
        },
        _ => Ok(default),
    }
}

fn cron_var(key: &'static str, default: &str) -> Result<String, WorkerConfigError> {
    let value = env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string());

    if value.split_whitespace().count() != 6 {
        return Err(WorkerConfigError::InvalidValue { key, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "DATABASE_URL",
        "WORKER_DATABASE_MAX_CONNECTIONS",
        "WEBHOOK_RETRY_CRON",
        "WEBHOOK_RETRY_BATCH",
        "WEBHOOK_CLEANUP_CRON",
        "WEBHOOK_RETENTION_DAYS",
        "PREMIUM_EXPIRY_CRON",
        "PREMIUM_EXPIRY_BATCH",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/heartbalance");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.webhook_retry_cron, "0 */2 * * * *");
        assert_eq!(config.webhook_retention_days, 90);
        assert_eq!(config.premium_expiry_batch, 200);

        clear();
    }

    #[test]
    #[serial]
    fn test_database_url_required() {
        clear();
        assert!(matches!(
            WorkerConfig::from_env(),
            Err(WorkerConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    #[serial]
    fn test_rejects_bad_values() {
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/heartbalance");

        env::set_var("WEBHOOK_RETENTION_DAYS", "0");
        assert!(WorkerConfig::from_env().is_err());
        env::remove_var("WEBHOOK_RETENTION_DAYS");

        // Five-field cron lacks the seconds column
        env::set_var("PREMIUM_EXPIRY_CRON", "*/10 * * * *");
        assert!(matches!(
            WorkerConfig::from_env(),
            Err(WorkerConfigError::InvalidValue { key: "PREMIUM_EXPIRY_CRON", .. })
        ));

        clear();
    }
}
