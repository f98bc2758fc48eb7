use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{AccountStats, Trade, UserAccount};
use crate::error::{LedgerError, Result};

/// What one finished trade contributes to its account's statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub success: bool,
    pub profit: Decimal,
    pub volume: Decimal,
}

impl TradeOutcome {
    /// Derive the outcome of a terminal trade
    ///
    /// Profit is the measured actual profit (zero when unmeasured); volume is
    /// the opportunity's executable amount. Non-terminal trades have no
    /// outcome yet.
    pub fn from_trade(trade: &Trade) -> Option<Self> {
        if !trade.is_terminal() {
            return None;
        }
        Some(Self {
            success: trade.is_successful(),
            profit: trade.actual_profit().unwrap_or_default(),
            volume: trade.opportunity.max_executable_amount,
        })
    }
}

/// Running per-account statistics
pub struct AccountStatsAggregator;

impl AccountStatsAggregator {
    /// Fold one outcome into `stats`
    ///
    /// `average_profit` keeps its previous value while there are no
    /// successful trades.
    pub fn apply(mut stats: AccountStats, outcome: &TradeOutcome, now: DateTime<Utc>) -> AccountStats {
        stats.total_trades += 1;
        if outcome.success {
            stats.successful_trades += 1;
            stats.total_profit += outcome.profit;
        }
        stats.total_volume += outcome.volume;
        stats.last_trade_at = Some(now);

        if stats.successful_trades > 0 {
            stats.average_profit = stats.total_profit / Decimal::from(stats.successful_trades);
        }
        stats.success_rate = success_rate(stats.successful_trades, stats.total_trades);
        stats
    }

    /// Fold a trade's outcome into the account exactly once
    ///
    /// # Errors
    /// `InvalidStateTransition` when this trade was already applied.
    pub fn apply_to_account(
        mut account: UserAccount,
        tx_hash: &str,
        outcome: &TradeOutcome,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        if account.applied_trades.contains(tx_hash) {
            return Err(LedgerError::InvalidStateTransition {
                key: tx_hash.to_string(),
                reason: format!("outcome already applied to {}", account.username),
            });
        }
        account.stats = Self::apply(account.stats, outcome, now);
        account.applied_trades.insert(tx_hash.to_string());
        account.updated_at = now;

        debug!(
            "Applied {} to {}: trades={} success_rate={} avg_profit={}",
            tx_hash,
            account.username,
            account.stats.total_trades,
            account.stats.success_rate,
            account.stats.average_profit
        );
        Ok(account)
    }
}

/// `100 * successful / total`, or zero with no trades
pub fn success_rate(successful: u64, total: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::ONE_HUNDRED * Decimal::from(successful) / Decimal::from(total)
}
