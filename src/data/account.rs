// UserAccount entity: identity, wallets, preferences, trading stats,
// login security and API access for one trading participant.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::validate::{normalize_email, validate_username};
use crate::config::RiskConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConnection {
    pub address: String,
    pub network: String,
    pub is_active: bool,
    pub connected_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub trade_alerts: bool,
    pub opportunity_alerts: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            trade_alerts: true,
            opportunity_alerts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub risk_tolerance: RiskTolerance,
    pub max_slippage: Decimal,
    pub min_profit_threshold: Decimal,
    pub max_trade_amount: Decimal,
    pub auto_execute: bool,
    pub notifications: NotificationPreferences,
}

impl From<&RiskConfig> for Preferences {
    fn from(risk: &RiskConfig) -> Self {
        Self {
            risk_tolerance: RiskTolerance::Medium,
            max_slippage: risk.max_slippage,
            min_profit_threshold: risk.min_profit_threshold,
            max_trade_amount: Decimal::from(1000),
            auto_execute: false,
            notifications: NotificationPreferences::default(),
        }
    }
}

/// Running trading statistics.
///
/// `success_rate` and `average_profit` are recomputed by
/// [`crate::stats::AccountStatsAggregator`] on every update and are never set
/// on their own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountStats {
    pub total_trades: u64,
    pub successful_trades: u64,
    pub total_profit: Decimal,
    pub total_volume: Decimal,
    pub average_profit: Decimal,
    /// Percentage in [0, 100]
    pub success_rate: Decimal,
    pub last_trade_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityState {
    pub login_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAccess {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub rate_limit: u32,
    pub last_api_call: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    /// Stored lowercase
    pub email: String,
    pub password_hash: String,
    pub wallets: Vec<WalletConnection>,
    pub preferences: Preferences,
    pub stats: AccountStats,
    pub security: SecurityState,
    pub api_access: ApiAccess,
    pub status: AccountStatus,
    /// Trades whose outcome has been folded into `stats`
    #[serde(default)]
    pub applied_trades: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every committed update; journal replay keeps the highest
    #[serde(default)]
    pub version: u64,
}

/// Registration payload; the password is already hashed by the caller
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl UserAccount {
    pub fn new(new: NewAccount, risk: &RiskConfig, api_rate_limit: u32, now: DateTime<Utc>) -> Result<Self> {
        validate_username(&new.username)?;
        let email = normalize_email(&new.email)?;

        Ok(Self {
            username: new.username,
            email,
            password_hash: new.password_hash,
            wallets: Vec::new(),
            preferences: Preferences::from(risk),
            stats: AccountStats::default(),
            security: SecurityState {
                password_changed_at: Some(now),
                ..Default::default()
            },
            api_access: ApiAccess {
                enabled: false,
                api_key: None,
                api_secret: None,
                rate_limit: api_rate_limit,
                last_api_call: None,
            },
            status: AccountStatus::Active,
            applied_trades: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn wallet(&self, address: &str) -> Option<&WalletConnection> {
        self.wallets.iter().find(|w| w.address == address)
    }

    pub fn wallet_mut(&mut self, address: &str) -> Option<&mut WalletConnection> {
        self.wallets.iter_mut().find(|w| w.address == address)
    }

    /// Any wallet ever connected, active or not, identifies the account's trades
    pub fn owns_wallet(&self, address: &str) -> bool {
        self.wallet(address).is_some()
    }

    pub fn active_wallets(&self) -> impl Iterator<Item = &WalletConnection> {
        self.wallets.iter().filter(|w| w.is_active)
    }
}
