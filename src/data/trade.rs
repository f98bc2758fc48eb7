// Trade entity: one arbitrage execution attempt and its outcome.
//
// `results` is `Some` exactly when the execution status is terminal and
// `completed_at` is set. Only `crate::lifecycle` writes either of them.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::validate::{validate_account_id, validate_asset_id};
use crate::config::RiskConfig;
use crate::error::{LedgerError, Result};

/// Balance snapshot keyed by asset identifier
pub type BalanceSheet = BTreeMap<String, Decimal>;

/// Execution state of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Submitted,
    Success,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        };
        write!(f, "{}", label)
    }
}

/// The proposed arbitrage cycle and its predicted economics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Ordered asset cycle; the first entry is the anchor asset
    #[serde(rename = "loop")]
    pub asset_loop: Vec<String>,
    pub profit_percent: Decimal,
    pub max_executable_amount: Decimal,
    pub expected_profit: Option<Decimal>,
}

impl Opportunity {
    pub fn anchor_asset(&self) -> Option<&str> {
        self.asset_loop.first().map(String::as_str)
    }

    /// Distinct assets of the loop, in first-seen order
    pub fn distinct_assets(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.asset_loop.len());
        for asset in &self.asset_loop {
            if !seen.contains(&asset.as_str()) {
                seen.push(asset);
            }
        }
        seen
    }

    pub fn validate(&self) -> Result<()> {
        if self.asset_loop.len() < 2 {
            return Err(LedgerError::validation(
                "opportunity.loop",
                "an arbitrage cycle needs at least two assets",
            ));
        }
        for asset in &self.asset_loop {
            validate_asset_id(asset)?;
        }
        if self.max_executable_amount.is_sign_negative() {
            return Err(LedgerError::validation(
                "opportunity.max_executable_amount",
                "must not be negative",
            ));
        }
        if matches!(self.expected_profit, Some(p) if p.is_sign_negative()) {
            return Err(LedgerError::validation(
                "opportunity.expected_profit",
                "must not be negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub status: ExecutionStatus,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<Decimal>,
    pub total_fees: Option<Decimal>,
}

/// Why a result field could not be measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFlag {
    /// Balance snapshots were missing, profit was not computed
    BalancesUnavailable,
    /// Opening anchor balance was zero, profit percent is undefined
    ZeroOpeningBalance,
    /// Expected or actual profit was missing, slippage was not computed
    ExpectedProfitUnavailable,
    /// Expected profit was zero, slippage is undefined
    NoSlippageReference,
}

impl ResultFlag {
    /// Map the flag onto the error kind a direct caller would receive
    pub fn to_error(self, tx_hash: &str) -> LedgerError {
        match self {
            Self::BalancesUnavailable | Self::ExpectedProfitUnavailable => {
                LedgerError::UnmeasurableResult(format!("{}: {:?}", tx_hash, self))
            }
            Self::ZeroOpeningBalance | Self::NoSlippageReference => {
                LedgerError::DivisionUndefined(format!("{}: {:?}", tx_hash, self))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeResults {
    pub actual_profit: Option<Decimal>,
    pub actual_profit_percent: Option<Decimal>,
    pub slippage: Option<Decimal>,
    pub final_amount: Option<Decimal>,
    pub success: bool,
    #[serde(default)]
    pub flags: Vec<ResultFlag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub address: String,
    pub balance_before: Option<BalanceSheet>,
    pub balance_after: Option<BalanceSheet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRisk {
    pub max_slippage: Decimal,
    pub min_profit_threshold: Decimal,
    pub slippage_exceeded: bool,
}

impl From<&RiskConfig> for TradeRisk {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_slippage: config.max_slippage,
            min_profit_threshold: config.min_profit_threshold,
            slippage_exceeded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub tx_hash: String,
    pub opportunity: Opportunity,
    pub execution: Execution,
    pub results: Option<TradeResults>,
    pub wallet: WalletSnapshot,
    pub risk: TradeRisk,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every committed update; journal replay keeps the highest
    #[serde(default)]
    pub version: u64,
}

/// Submission payload from the execution engine
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub tx_hash: String,
    pub opportunity: Opportunity,
    pub wallet_address: String,
    pub balance_before: Option<BalanceSheet>,
    pub max_slippage: Option<Decimal>,
    pub min_profit_threshold: Option<Decimal>,
}

impl Trade {
    /// Build a pending trade, validating the submission at the boundary
    pub fn new(new: NewTrade, risk: &RiskConfig, now: DateTime<Utc>) -> Result<Self> {
        if new.tx_hash.trim().is_empty() {
            return Err(LedgerError::validation("tx_hash", "must not be empty"));
        }
        new.opportunity.validate()?;
        validate_account_id(&new.wallet_address)?;
        if let Some(balances) = &new.balance_before {
            check_balance_keys(&new.opportunity, balances)?;
        }

        let mut trade_risk = TradeRisk::from(risk);
        if let Some(max_slippage) = new.max_slippage {
            trade_risk.max_slippage = max_slippage;
        }
        if let Some(min_profit) = new.min_profit_threshold {
            trade_risk.min_profit_threshold = min_profit;
        }

        Ok(Self {
            tx_hash: new.tx_hash,
            opportunity: new.opportunity,
            execution: Execution {
                status: ExecutionStatus::Pending,
                submitted_at: now,
                completed_at: None,
                gas_used: None,
                gas_price: None,
                total_fees: None,
            },
            results: None,
            wallet: WalletSnapshot {
                address: new.wallet_address,
                balance_before: new.balance_before,
                balance_after: None,
            },
            risk: trade_risk,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.execution.status.is_terminal()
    }

    pub fn is_successful(&self) -> bool {
        self.execution.status == ExecutionStatus::Success
    }

    pub fn actual_profit(&self) -> Option<Decimal> {
        self.results.as_ref().and_then(|r| r.actual_profit)
    }

    pub fn actual_profit_percent(&self) -> Option<Decimal> {
        self.results.as_ref().and_then(|r| r.actual_profit_percent)
    }

    /// Time from submission to completion
    pub fn execution_time(&self) -> Option<Duration> {
        self.execution
            .completed_at
            .map(|completed| completed - self.execution.submitted_at)
    }

    pub fn is_profitable(&self) -> bool {
        self.actual_profit().is_some_and(|p| p > Decimal::ZERO)
    }

    /// Actual over expected profit
    pub fn profit_ratio(&self) -> Option<Decimal> {
        let actual = self.actual_profit()?;
        let expected = self.opportunity.expected_profit?;
        actual.checked_div(expected)
    }

    /// Whether the realised profit percent reached the trade's minimum threshold
    ///
    /// # Errors
    /// `DivisionUndefined` when the opening balance was zero,
    /// `UnmeasurableResult` when balances were missing or the trade is open.
    pub fn meets_profit_threshold(&self) -> Result<bool> {
        let percent = self.measured_profit_percent()?;
        Ok(percent >= self.risk.min_profit_threshold * Decimal::ONE_HUNDRED)
    }

    /// `actual_profit_percent`, or the error matching why it is absent
    pub fn measured_profit_percent(&self) -> Result<Decimal> {
        let results = self.results.as_ref().ok_or_else(|| {
            LedgerError::UnmeasurableResult(format!(
                "{}: trade is {}",
                self.tx_hash, self.execution.status
            ))
        })?;
        if let Some(percent) = results.actual_profit_percent {
            return Ok(percent);
        }
        let flag = results
            .flags
            .iter()
            .copied()
            .find(|f| matches!(f, ResultFlag::ZeroOpeningBalance | ResultFlag::BalancesUnavailable))
            .unwrap_or(ResultFlag::BalancesUnavailable);
        Err(flag.to_error(&self.tx_hash))
    }
}

/// Balance snapshots may only carry assets that appear in the loop
pub(crate) fn check_balance_keys(opportunity: &Opportunity, balances: &BalanceSheet) -> Result<()> {
    match balances
        .keys()
        .find(|asset| !opportunity.asset_loop.contains(asset))
    {
        Some(stray) => Err(LedgerError::validation(
            "wallet.balances",
            format!("asset '{}' is not part of the opportunity loop", stray),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rust_decimal_macros::dec;

    pub const WALLET: &str = "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H";

    pub fn opportunity(assets: &[&str], expected_profit: Option<Decimal>) -> Opportunity {
        Opportunity {
            asset_loop: assets.iter().map(|a| a.to_string()).collect(),
            profit_percent: dec!(1.8),
            max_executable_amount: dec!(100),
            expected_profit,
        }
    }

    pub fn balances(entries: &[(&str, Decimal)]) -> BalanceSheet {
        entries.iter().map(|(a, v)| (a.to_string(), *v)).collect()
    }

    pub fn new_trade(tx_hash: &str) -> NewTrade {
        NewTrade {
            tx_hash: tx_hash.to_string(),
            opportunity: opportunity(&["XLM", "USDC", "XLM"], Some(dec!(1.8))),
            wallet_address: WALLET.to_string(),
            balance_before: Some(balances(&[("XLM", dec!(100))])),
            max_slippage: None,
            min_profit_threshold: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_trade_is_pending_without_results() {
        let now = Utc::now();
        let trade = Trade::new(new_trade("tx1"), &RiskConfig::default(), now).unwrap();

        assert_eq!(trade.execution.status, ExecutionStatus::Pending);
        assert!(trade.results.is_none());
        assert!(trade.execution.completed_at.is_none());
        assert_eq!(trade.risk.max_slippage, dec!(0.01));
        assert_eq!(trade.risk.min_profit_threshold, dec!(0.001));
        assert!(!trade.risk.slippage_exceeded);
        assert!(trade.execution_time().is_none());
        assert!(!trade.is_profitable());
    }

    #[test]
    fn test_risk_overrides_apply() {
        let mut new = new_trade("tx1");
        new.max_slippage = Some(dec!(0.05));
        let trade = Trade::new(new, &RiskConfig::default(), Utc::now()).unwrap();
        assert_eq!(trade.risk.max_slippage, dec!(0.05));
        assert_eq!(trade.risk.min_profit_threshold, dec!(0.001));
    }

    #[test]
    fn test_submission_validation() {
        let risk = RiskConfig::default();
        let now = Utc::now();

        let mut short_loop = new_trade("tx1");
        short_loop.opportunity = opportunity(&["XLM"], None);
        assert!(Trade::new(short_loop, &risk, now).is_err());

        let mut bad_asset = new_trade("tx2");
        bad_asset.opportunity = opportunity(&["XLM", "not an asset"], None);
        assert!(Trade::new(bad_asset, &risk, now).is_err());

        let mut stray_balance = new_trade("tx3");
        stray_balance.balance_before = Some(balances(&[("BTC", dec!(1))]));
        assert!(Trade::new(stray_balance, &risk, now).is_err());

        let mut empty_hash = new_trade(" ");
        empty_hash.tx_hash = " ".to_string();
        assert!(Trade::new(empty_hash, &risk, now).is_err());

        let mut bad_wallet = new_trade("tx4");
        bad_wallet.wallet_address = "wallet".to_string();
        assert!(Trade::new(bad_wallet, &risk, now).is_err());
    }

    #[test]
    fn test_derived_fields() {
        let now = Utc::now();
        let mut trade = Trade::new(new_trade("tx1"), &RiskConfig::default(), now).unwrap();
        trade.execution.status = ExecutionStatus::Success;
        trade.execution.completed_at = Some(now + Duration::milliseconds(1500));
        trade.results = Some(TradeResults {
            actual_profit: Some(dec!(2)),
            actual_profit_percent: Some(dec!(2)),
            success: true,
            ..Default::default()
        });

        assert_eq!(trade.execution_time(), Some(Duration::milliseconds(1500)));
        assert!(trade.is_profitable());
        assert_eq!(trade.profit_ratio().unwrap().round_dp(4), dec!(1.1111));
        assert_eq!(trade.meets_profit_threshold(), Ok(true));
    }

    #[test]
    fn test_threshold_check_reports_why_unmeasured() {
        let now = Utc::now();
        let mut trade = Trade::new(new_trade("tx1"), &RiskConfig::default(), now).unwrap();
        assert!(matches!(
            trade.meets_profit_threshold(),
            Err(LedgerError::UnmeasurableResult(_))
        ));

        trade.results = Some(TradeResults {
            actual_profit: Some(dec!(5)),
            flags: vec![ResultFlag::ZeroOpeningBalance],
            ..Default::default()
        });
        assert!(matches!(
            trade.meets_profit_threshold(),
            Err(LedgerError::DivisionUndefined(_))
        ));

        trade.results = Some(TradeResults {
            flags: vec![ResultFlag::BalancesUnavailable],
            ..Default::default()
        });
        assert!(matches!(
            trade.measured_profit_percent(),
            Err(LedgerError::UnmeasurableResult(_))
        ));

        trade.results = Some(TradeResults {
            actual_profit_percent: Some(dec!(0.05)),
            ..Default::default()
        });
        assert_eq!(trade.meets_profit_threshold(), Ok(false));
    }

    #[test]
    fn test_profit_ratio_without_reference() {
        let now = Utc::now();
        let mut new = new_trade("tx1");
        new.opportunity.expected_profit = Some(Decimal::ZERO);
        let mut trade = Trade::new(new, &RiskConfig::default(), now).unwrap();
        trade.results = Some(TradeResults {
            actual_profit: Some(dec!(2)),
            ..Default::default()
        });
        assert!(trade.profit_ratio().is_none());
    }

    #[test]
    fn test_distinct_assets_keep_order() {
        let opp = opportunity(&["XLM", "USDC", "BTC", "XLM"], None);
        assert_eq!(opp.distinct_assets(), vec!["XLM", "USDC", "BTC"]);
        assert_eq!(opp.anchor_asset(), Some("XLM"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ExecutionStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Submitted.is_terminal());
    }
}
