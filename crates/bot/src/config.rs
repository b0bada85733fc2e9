//! Configuration loaded from the environment

use std::env;

use primebot_membership::{EngineSettings, DEFAULT_MONTHLY_PRICE};

const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_WARN_WINDOW_DAYS: u32 = 3;
/// Daily at 12:00 UTC (sec min hour day month weekday)
const DEFAULT_SWEEP_CRON: &str = "0 0 12 * * *";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub guild_id: String,
    pub prime_role_id: String,
    pub discord_api_base: String,
    /// In-memory store when unset
    pub database_url: Option<String>,
    /// Backup disabled when unset
    pub backup_webhook_url: Option<String>,
    pub admin_api_token: String,
    pub bind_address: String,
    pub monthly_price: i64,
    pub warn_window_days: u32,
    pub sweep_cron: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let monthly_price = parsed("PRIME_MONTHLY_PRICE", DEFAULT_MONTHLY_PRICE)?;
        if monthly_price <= 0 {
            return Err(ConfigError::Invalid {
                name: "PRIME_MONTHLY_PRICE",
                reason: format!("must be positive, got {}", monthly_price),
            });
        }

        let warn_window_days = parsed("WARN_WINDOW_DAYS", DEFAULT_WARN_WINDOW_DAYS)?;
        if warn_window_days == 0 {
            return Err(ConfigError::Invalid {
                name: "WARN_WINDOW_DAYS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            guild_id: required("DISCORD_GUILD_ID")?,
            prime_role_id: required("PRIME_ROLE_ID")?,
            discord_api_base: optional("DISCORD_API_BASE")
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            database_url: optional("DATABASE_URL"),
            backup_webhook_url: optional("BACKUP_WEBHOOK_URL"),
            admin_api_token: required("ADMIN_API_TOKEN")?,
            bind_address: optional("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            monthly_price,
            warn_window_days,
            sweep_cron: optional("SWEEP_CRON").unwrap_or_else(|| DEFAULT_SWEEP_CRON.to_string()),
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings::default()
            .with_price_per_month(self.monthly_price)
            .with_warn_window_days(self.warn_window_days)
    }
}

/// Unset and blank are treated the same
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("{:?}: {}", raw, e),
        }),
    }
}
