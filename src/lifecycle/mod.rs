// Trade state machine.
//
//   pending -> submitted -> success | failed | timeout
//   pending ------------------^
//
// Terminal states are final. Every transition takes the trade by value and
// returns the updated trade; the caller persists it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::data::trade::check_balance_keys;
use crate::data::{BalanceSheet, ExecutionStatus, NewTrade, Trade, TradeResults};
use crate::error::{LedgerError, Result};
use crate::risk::RiskEvaluator;

/// Outcome reported by the execution engine for one trade
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub success: bool,
    pub final_amount: Option<Decimal>,
    pub balance_after: Option<BalanceSheet>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<Decimal>,
    pub total_fees: Option<Decimal>,
}

impl Completion {
    pub fn succeeded(final_amount: Option<Decimal>) -> Self {
        Self {
            success: true,
            final_amount,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn with_balance_after(mut self, balance_after: BalanceSheet) -> Self {
        self.balance_after = Some(balance_after);
        self
    }

    pub fn with_gas(mut self, gas_used: u64, gas_price: Decimal, total_fees: Decimal) -> Self {
        self.gas_used = Some(gas_used);
        self.gas_price = Some(gas_price);
        self.total_fees = Some(total_fees);
        self
    }
}

pub struct TradeLifecycle {
    risk: RiskConfig,
}

impl TradeLifecycle {
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }

    pub fn risk_config(&self) -> &RiskConfig {
        &self.risk
    }

    /// Create a pending trade with the configured risk defaults
    pub fn open(&self, new: NewTrade, now: DateTime<Utc>) -> Result<Trade> {
        let trade = Trade::new(new, &self.risk, now)?;
        info!(
            "Trade {} opened: loop={:?} expected_profit={:?}",
            trade.tx_hash, trade.opportunity.asset_loop, trade.opportunity.expected_profit
        );
        Ok(trade)
    }

    /// pending -> submitted
    ///
    /// `submitted_at` keeps the time the execution engine handed the trade
    /// over, so `execution_time` spans the whole attempt.
    pub fn mark_submitted(&self, mut trade: Trade, now: DateTime<Utc>) -> Result<Trade> {
        if trade.execution.status != ExecutionStatus::Pending {
            return Err(invalid_transition(&trade, ExecutionStatus::Submitted));
        }
        trade.execution.status = ExecutionStatus::Submitted;
        trade.updated_at = now;
        info!("Trade {} submitted", trade.tx_hash);
        Ok(trade)
    }

    /// Finalize a trade as success or failed and annotate profit and slippage
    ///
    /// # Errors
    /// `InvalidStateTransition` when the trade is already terminal,
    /// `Validation` when the closing balances name assets outside the loop.
    pub fn complete(&self, mut trade: Trade, completion: Completion, now: DateTime<Utc>) -> Result<Trade> {
        let target = if completion.success {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };
        if trade.is_terminal() {
            return Err(invalid_transition(&trade, target));
        }
        if let Some(balance_after) = &completion.balance_after {
            check_balance_keys(&trade.opportunity, balance_after)?;
        }

        trade.execution.status = target;
        trade.execution.completed_at = Some(now);
        if completion.gas_used.is_some() {
            trade.execution.gas_used = completion.gas_used;
        }
        if completion.gas_price.is_some() {
            trade.execution.gas_price = completion.gas_price;
        }
        if completion.total_fees.is_some() {
            trade.execution.total_fees = completion.total_fees;
        }
        if completion.balance_after.is_some() {
            trade.wallet.balance_after = completion.balance_after;
        }

        trade.results = Some(TradeResults {
            success: completion.success,
            final_amount: completion.final_amount.filter(|amount| !amount.is_zero()),
            ..Default::default()
        });
        RiskEvaluator::evaluate(&mut trade);
        trade.updated_at = now;

        let results = trade.results.as_ref();
        info!(
            "Trade {} completed: status={} profit={:?} slippage={:?} flags={:?}",
            trade.tx_hash,
            trade.execution.status,
            results.and_then(|r| r.actual_profit),
            results.and_then(|r| r.slippage),
            results.map(|r| r.flags.as_slice()).unwrap_or_default()
        );
        Ok(trade)
    }

    /// Finalize a trade whose confirmation never arrived; no profit is computed
    pub fn time_out(&self, mut trade: Trade, now: DateTime<Utc>) -> Result<Trade> {
        if trade.is_terminal() {
            return Err(invalid_transition(&trade, ExecutionStatus::Timeout));
        }
        trade.execution.status = ExecutionStatus::Timeout;
        trade.execution.completed_at = Some(now);
        trade.results = Some(TradeResults::default());
        trade.updated_at = now;
        warn!("Trade {} timed out without confirmation", trade.tx_hash);
        Ok(trade)
    }
}

fn invalid_transition(trade: &Trade, target: ExecutionStatus) -> LedgerError {
    LedgerError::InvalidStateTransition {
        key: trade.tx_hash.clone(),
        reason: format!("cannot move from {} to {}", trade.execution.status, target),
    }
}
