use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

/// Main configuration struct containing all ledger settings
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub risk: RiskConfig,
    pub security: SecurityConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub monitoring: MonitoringConfig,
}

/// Default risk settings stamped onto every newly submitted trade
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// Maximum tolerated relative deviation between expected and actual profit (0.01 = 1%)
    pub max_slippage: Decimal,
    /// Minimum profit as a fraction of the opening balance (0.001 = 0.1%)
    pub min_profit_threshold: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_slippage: Decimal::new(1, 2),
            min_profit_threshold: Decimal::new(1, 3),
        }
    }
}

/// Login lockout policy
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityConfig {
    pub max_login_attempts: u32,
    pub lock_duration: chrono::Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lock_duration: chrono::Duration::hours(2),
        }
    }
}

/// API credential issuance settings
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub key_bytes: usize,
    pub secret_bytes: usize,
    /// Requests per minute granted to newly issued keys
    pub rate_limit: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key_bytes: 32,
            secret_bytes: 32,
            rate_limit: 100,
        }
    }
}

/// Journal file locations
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub trade_journal_path: PathBuf,
    pub account_journal_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            trade_journal_path: PathBuf::from("data/trades.jsonl"),
            account_journal_path: PathBuf::from("data/accounts.jsonl"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringConfig {
    pub log_level: String,
    /// "pretty" or "json"
    pub log_format: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file
        dotenvy::dotenv().ok();

        let risk_defaults = RiskConfig::default();
        let risk = RiskConfig {
            max_slippage: get_decimal_env("MAX_SLIPPAGE", risk_defaults.max_slippage)?,
            min_profit_threshold: get_decimal_env(
                "MIN_PROFIT_THRESHOLD",
                risk_defaults.min_profit_threshold,
            )?,
        };
        if risk.max_slippage.is_sign_negative() || risk.min_profit_threshold.is_sign_negative() {
            anyhow::bail!("MAX_SLIPPAGE and MIN_PROFIT_THRESHOLD must be non-negative");
        }

        let security = SecurityConfig {
            max_login_attempts: get_u32_env("MAX_LOGIN_ATTEMPTS", 5)?,
            lock_duration: get_duration_secs_env("LOCK_DURATION_SECS", 7200)?,
        };
        if security.max_login_attempts == 0 {
            anyhow::bail!("MAX_LOGIN_ATTEMPTS must be at least 1");
        }

        let api = ApiConfig {
            key_bytes: get_u32_env("API_KEY_BYTES", 32)? as usize,
            secret_bytes: get_u32_env("API_SECRET_BYTES", 32)? as usize,
            rate_limit: get_u32_env("API_RATE_LIMIT", 100)?,
        };

        let storage = StorageConfig {
            trade_journal_path: PathBuf::from(get_env_or_default(
                "TRADE_JOURNAL_PATH",
                "data/trades.jsonl",
            )),
            account_journal_path: PathBuf::from(get_env_or_default(
                "ACCOUNT_JOURNAL_PATH",
                "data/accounts.jsonl",
            )),
        };

        let monitoring = MonitoringConfig {
            log_level: get_env_or_default("LOG_LEVEL", "info"),
            log_format: get_env_or_default("LOG_FORMAT", "pretty"),
        };

        Ok(Config {
            risk,
            security,
            api,
            storage,
            monitoring,
        })
    }
}

// ============================================================================
// Helper Functions for Environment Variable Parsing
// ============================================================================

/// Get environment variable or return default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get u32 environment variable with default
fn get_u32_env(key: &str, default: u32) -> Result<u32> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .context(format!("Failed to parse {} as u32", key))
}

/// Get u64 environment variable with default
fn get_u64_env(key: &str, default: u64) -> Result<u64> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .context(format!("Failed to parse {} as u64", key))
}

/// Get a positive duration in whole seconds, rejecting values chrono cannot hold
fn get_duration_secs_env(key: &str, default: u64) -> Result<chrono::Duration> {
    let secs = get_u64_env(key, default)?;
    if secs == 0 {
        anyhow::bail!("{} must be at least 1 second", key);
    }
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .with_context(|| format!("{} is out of range: {}", key, secs))
}

/// Get decimal environment variable with default
fn get_decimal_env(key: &str, default: Decimal) -> Result<Decimal> {
    match std::env::var(key) {
        Ok(raw) => Decimal::from_str(raw.trim()).context(format!("Failed to parse {} as decimal", key)),
        Err(_) => Ok(default),
    }
}
