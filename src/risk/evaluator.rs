use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::data::{ResultFlag, Trade, TradeResults};

/// Realised profit on the loop's anchor asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitMeasurement {
    pub actual_profit: Decimal,
    /// `None` when the opening anchor balance is zero
    pub actual_profit_percent: Option<Decimal>,
}

/// Deviation between expected and realised profit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippageMeasurement {
    /// `None` when the expected profit is zero
    pub slippage: Option<Decimal>,
    pub exceeded: bool,
}

/// Stateless profit and slippage calculations over a trade snapshot
pub struct RiskEvaluator;

impl RiskEvaluator {
    /// Profit measured on `opportunity.loop[0]`
    ///
    /// Returns `None` when either balance snapshot is missing. Assets missing
    /// from a present snapshot count as zero.
    pub fn compute_actual_profit(trade: &Trade) -> Option<ProfitMeasurement> {
        let before_sheet = trade.wallet.balance_before.as_ref()?;
        let after_sheet = trade.wallet.balance_after.as_ref()?;
        let asset = trade.opportunity.anchor_asset()?;

        let before = before_sheet.get(asset).copied().unwrap_or_default();
        let after = after_sheet.get(asset).copied().unwrap_or_default();
        let actual_profit = after - before;

        let actual_profit_percent = actual_profit
            .checked_div(before)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED));

        Some(ProfitMeasurement {
            actual_profit,
            actual_profit_percent,
        })
    }

    /// Relative slippage `|expected - actual| / expected` against `risk.max_slippage`
    ///
    /// Returns `None` when the expected profit or the recorded actual profit
    /// is missing.
    pub fn compute_slippage(trade: &Trade) -> Option<SlippageMeasurement> {
        let expected = trade.opportunity.expected_profit?;
        let actual = trade.actual_profit()?;

        let slippage = (expected - actual).abs().checked_div(expected);
        let exceeded = slippage.is_some_and(|s| s > trade.risk.max_slippage);

        Some(SlippageMeasurement { slippage, exceeded })
    }

    /// Write profit and slippage into `trade.results` in place
    ///
    /// Missing inputs leave the corresponding fields unset and add a
    /// [`ResultFlag`]; nothing here fails.
    pub fn evaluate(trade: &mut Trade) {
        let mut results = trade.results.take().unwrap_or_default();
        Self::apply_profit(trade, &mut results);
        trade.results = Some(results);

        let slippage = Self::compute_slippage(trade);
        let results = trade.results.get_or_insert_with(TradeResults::default);
        match slippage {
            Some(measurement) => {
                results.slippage = measurement.slippage;
                trade.risk.slippage_exceeded = measurement.exceeded;
                if measurement.slippage.is_none() {
                    push_flag(results, ResultFlag::NoSlippageReference);
                }
                if measurement.exceeded {
                    warn!(
                        "Trade {} slippage {:?} exceeded max {}",
                        trade.tx_hash, measurement.slippage, trade.risk.max_slippage
                    );
                }
            }
            None => push_flag(results, ResultFlag::ExpectedProfitUnavailable),
        }
    }

    fn apply_profit(trade: &Trade, results: &mut TradeResults) {
        match Self::compute_actual_profit(trade) {
            Some(measurement) => {
                results.actual_profit = Some(measurement.actual_profit);
                results.actual_profit_percent = measurement.actual_profit_percent;
                if measurement.actual_profit_percent.is_none() {
                    push_flag(results, ResultFlag::ZeroOpeningBalance);
                }
                debug!(
                    "Trade {} actual profit {} ({:?}%)",
                    trade.tx_hash, measurement.actual_profit, measurement.actual_profit_percent
                );
            }
            None => push_flag(results, ResultFlag::BalancesUnavailable),
        }
    }
}

fn push_flag(results: &mut TradeResults, flag: ResultFlag) {
    if !results.flags.contains(&flag) {
        results.flags.push(flag);
    }
}
