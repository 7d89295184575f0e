//! Process configuration read from the environment.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

use campusops_core::Money;
use campusops_lending::LendingPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not valid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres connection string. `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub policy: LendingPolicy,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `BIND_ADDR` | `0.0.0.0:8080` |
    /// | `DATABASE_URL` | unset (in-memory store) |
    /// | `RESERVATION_WINDOW_SECS` | `86400` |
    /// | `LOAN_PERIOD_DAYS` | `14` |
    /// | `FINE_PER_DAY` | `5` (whole rupees) |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`], with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = LendingPolicy::default();

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", e.to_string()))?;

        let reservation_window = match get("RESERVATION_WINDOW_SECS") {
            Some(raw) => Duration::try_seconds(positive("RESERVATION_WINDOW_SECS", &raw)?)
                .ok_or_else(|| ConfigError::invalid("RESERVATION_WINDOW_SECS", "out of range"))?,
            None => defaults.reservation_window,
        };
        let loan_period = match get("LOAN_PERIOD_DAYS") {
            Some(raw) => Duration::try_days(positive("LOAN_PERIOD_DAYS", &raw)?)
                .ok_or_else(|| ConfigError::invalid("LOAN_PERIOD_DAYS", "out of range"))?,
            None => defaults.loan_period,
        };
        let fine_per_day = match get("FINE_PER_DAY") {
            Some(raw) => Money::from_major(non_negative("FINE_PER_DAY", &raw)?),
            None => defaults.fine_per_day,
        };

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            policy: LendingPolicy {
                reservation_window,
                loan_period,
                fine_per_day,
            },
        })
    }
}

fn non_negative(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    let value = raw
        .parse::<i64>()
        .map_err(|e| ConfigError::invalid(var, format!("'{raw}': {e}")))?;
    if value < 0 {
        return Err(ConfigError::invalid(var, format!("'{raw}' is negative")));
    }
    Ok(value)
}

fn positive(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    match non_negative(var, raw)? {
        0 => Err(ConfigError::invalid(var, "must be greater than zero")),
        v => Ok(v),
    }
}
