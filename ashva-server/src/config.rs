use ashva_core::{
    EngineConfig, TierPolicy, GLOBAL_PARTNER_THRESHOLD, MARKET_PARTNER_THRESHOLD,
    MAX_REFERRAL_DEPTH, NODE_DEPLOYMENT_HOURS,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PRICE_POINTER: &str = "/pairs/0/priceUsd";

/// Upper bound for `NODE_DEPLOYMENT_HOURS` (one hundred years)
pub const MAX_DEPLOYMENT_HOURS: i64 = 876_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub environment: Environment,
    pub db_max_connections: u32,

    /// Bearer token for the admin routes. Admin routes are closed when unset.
    pub admin_token: Option<String>,

    /// Static price, also the fallback when the oracle fails
    pub price_usd: Decimal,
    pub price_oracle_url: Option<String>,
    pub price_oracle_pointer: String,
    pub price_oracle_timeout_ms: u64,

    pub withdraw_burn_rate: Decimal,
    pub min_withdraw_usd: Decimal,
    pub market_partner_threshold: Decimal,
    pub global_partner_threshold: Decimal,
    pub max_referral_depth: usize,
    pub node_deployment_hours: i64,

    /// Seconds between in-process node sweeps, 0 disables the task
    pub node_sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    #[serde(rename = "development")]
    Development,
    #[serde(rename = "production")]
    Production,
    #[serde(rename = "test")]
    Test,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 3000,
            environment: Environment::Development,
            db_max_connections: 5,
            admin_token: None,
            price_usd: Decimal::new(1, 1),
            price_oracle_url: None,
            price_oracle_pointer: DEFAULT_PRICE_POINTER.to_string(),
            price_oracle_timeout_ms: 3000,
            withdraw_burn_rate: Decimal::new(5, 2),
            min_withdraw_usd: Decimal::TEN,
            market_partner_threshold: MARKET_PARTNER_THRESHOLD,
            global_partner_threshold: GLOBAL_PARTNER_THRESHOLD,
            max_referral_depth: MAX_REFERRAL_DEPTH,
            node_deployment_hours: NODE_DEPLOYMENT_HOURS,
            node_sweep_interval_secs: 0,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            database_url: env_string("DATABASE_URL"),
            port: env_parse("PORT", defaults.port)?,
            environment: match env_string("ENVIRONMENT").as_deref() {
                Some("production") => Environment::Production,
                Some("test") => Environment::Test,
                _ => Environment::Development,
            },
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            admin_token: env_string("ADMIN_TOKEN"),
            price_usd: env_parse("ASHVA_PRICE_USD", defaults.price_usd)?,
            price_oracle_url: env_string("PRICE_ORACLE_URL"),
            price_oracle_pointer: env_string("PRICE_ORACLE_POINTER")
                .unwrap_or(defaults.price_oracle_pointer),
            price_oracle_timeout_ms: env_parse(
                "PRICE_ORACLE_TIMEOUT_MS",
                defaults.price_oracle_timeout_ms,
            )?,
            withdraw_burn_rate: env_parse("WITHDRAW_BURN_RATE", defaults.withdraw_burn_rate)?,
            min_withdraw_usd: env_parse("MIN_WITHDRAW_USD", defaults.min_withdraw_usd)?,
            market_partner_threshold: env_parse(
                "MARKET_PARTNER_THRESHOLD",
                defaults.market_partner_threshold,
            )?,
            global_partner_threshold: env_parse(
                "GLOBAL_PARTNER_THRESHOLD",
                defaults.global_partner_threshold,
            )?,
            max_referral_depth: env_parse("MAX_REFERRAL_DEPTH", defaults.max_referral_depth)?,
            node_deployment_hours: env_parse(
                "NODE_DEPLOYMENT_HOURS",
                defaults.node_deployment_hours,
            )?,
            node_sweep_interval_secs: env_parse(
                "NODE_SWEEP_INTERVAL_SECS",
                defaults.node_sweep_interval_secs,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.price_usd <= Decimal::ZERO {
            anyhow::bail!("ASHVA_PRICE_USD must be positive, got {}", self.price_usd);
        }
        if !(0..=MAX_DEPLOYMENT_HOURS).contains(&self.node_deployment_hours) {
            anyhow::bail!(
                "NODE_DEPLOYMENT_HOURS must be between 0 and {}, got {}",
                MAX_DEPLOYMENT_HOURS,
                self.node_deployment_hours
            );
        }
        if !self.price_oracle_pointer.starts_with('/') {
            anyhow::bail!(
                "PRICE_ORACLE_POINTER must be a JSON pointer, got {:?}",
                self.price_oracle_pointer
            );
        }
        self.engine_config().validate()?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tiers: TierPolicy {
                market_partner_threshold: self.market_partner_threshold,
                global_partner_threshold: self.global_partner_threshold,
                ..TierPolicy::default()
            },
            burn_rate: self.withdraw_burn_rate,
            min_withdraw_usd: self.min_withdraw_usd,
            max_referral_depth: self.max_referral_depth,
            node_deployment_window: chrono::Duration::hours(self.node_deployment_hours),
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.price_oracle_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.node_sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
