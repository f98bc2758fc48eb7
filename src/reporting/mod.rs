use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::data::{AccountStatus, ExecutionStatus, LedgerStore, Trade, UserAccount};
use crate::stats::success_rate;

/// Fleet-wide totals across every trade and account
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetStats {
    pub total_trades: usize,
    pub successful_trades: usize,
    pub failed_trades: usize,
    pub timed_out_trades: usize,
    pub open_trades: usize,
    pub success_rate: Decimal,
    /// Sum of actual profit over successful trades
    pub total_profit: Decimal,
    /// Mean `actual_profit_percent` over successful trades that have one
    pub average_profit_percent: Option<Decimal>,
    /// Mean submit-to-completion time over completed trades
    pub average_execution_time_ms: Option<i64>,
    pub slippage_exceeded_trades: usize,
    pub total_accounts: usize,
    pub active_accounts: usize,
}

/// Per-asset performance over successful trades
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetPerformance {
    pub asset: String,
    pub trade_count: usize,
    pub average_profit_percent: Option<Decimal>,
    pub total_profit: Decimal,
}

/// Read-only aggregations over the ledger store
pub struct FleetStatsReporter {
    store: LedgerStore,
}

impl FleetStatsReporter {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub fn fleet_stats(&self) -> FleetStats {
        calculate_fleet_stats(&self.store.trades(), &self.store.accounts())
    }

    pub fn top_assets(&self, limit: usize) -> Vec<AssetPerformance> {
        top_assets(&self.store.trades(), limit)
    }

    pub fn recent_trades(&self, hours: i64, limit: usize, now: DateTime<Utc>) -> Vec<Trade> {
        recent_trades(self.store.trades(), hours, limit, now)
    }

    pub fn trades_in_profit_range(&self, min: Decimal, max: Decimal) -> Vec<Trade> {
        trades_in_profit_range(self.store.trades(), min, max)
    }

    /// Render fleet totals and the top assets as Markdown
    pub fn generate_report(&self, top_limit: usize, now: DateTime<Utc>) -> String {
        let trades = self.store.trades();
        if trades.is_empty() {
            return "# Fleet Report\n\nNo trade data available yet.\n".to_string();
        }
        let stats = calculate_fleet_stats(&trades, &self.store.accounts());
        let assets = top_assets(&trades, top_limit);
        format_report(&stats, &assets, now)
    }
}

/// Totals over a trade and account snapshot
pub fn calculate_fleet_stats(trades: &[Trade], accounts: &[UserAccount]) -> FleetStats {
    let mut stats = FleetStats {
        total_trades: trades.len(),
        total_accounts: accounts.len(),
        active_accounts: accounts
            .iter()
            .filter(|a| a.status == AccountStatus::Active)
            .count(),
        ..Default::default()
    };

    let mut percent_sum = Decimal::ZERO;
    let mut percent_count = 0u32;
    let mut elapsed_ms_sum = 0i64;
    let mut elapsed_count = 0i64;

    for trade in trades {
        match trade.execution.status {
            ExecutionStatus::Success => {
                stats.successful_trades += 1;
                stats.total_profit += trade.actual_profit().unwrap_or_default();
                if let Some(percent) = trade.actual_profit_percent() {
                    percent_sum += percent;
                    percent_count += 1;
                }
            }
            ExecutionStatus::Failed => stats.failed_trades += 1,
            ExecutionStatus::Timeout => stats.timed_out_trades += 1,
            ExecutionStatus::Pending | ExecutionStatus::Submitted => stats.open_trades += 1,
        }
        if let Some(elapsed) = trade.execution_time() {
            elapsed_ms_sum += elapsed.num_milliseconds();
            elapsed_count += 1;
        }
        if trade.risk.slippage_exceeded {
            stats.slippage_exceeded_trades += 1;
        }
    }

    stats.success_rate = success_rate(stats.successful_trades as u64, stats.total_trades as u64);
    if percent_count > 0 {
        stats.average_profit_percent = Some(percent_sum / Decimal::from(percent_count));
    }
    if elapsed_count > 0 {
        stats.average_execution_time_ms = Some(elapsed_ms_sum / elapsed_count);
    }
    stats
}

/// Successful trades grouped by every asset in their loop
///
/// A trade contributes its full profit to each distinct asset it touches.
/// Sorted by summed profit, highest first.
pub fn top_assets(trades: &[Trade], limit: usize) -> Vec<AssetPerformance> {
    struct Acc {
        count: usize,
        total_profit: Decimal,
        percent_sum: Decimal,
        percent_count: u32,
    }

    let mut by_asset: HashMap<&str, Acc> = HashMap::new();
    for trade in trades.iter().filter(|t| t.is_successful()) {
        let profit = trade.actual_profit().unwrap_or_default();
        let percent = trade.actual_profit_percent();
        for asset in trade.opportunity.distinct_assets() {
            let acc = by_asset.entry(asset).or_insert(Acc {
                count: 0,
                total_profit: Decimal::ZERO,
                percent_sum: Decimal::ZERO,
                percent_count: 0,
            });
            acc.count += 1;
            acc.total_profit += profit;
            if let Some(p) = percent {
                acc.percent_sum += p;
                acc.percent_count += 1;
            }
        }
    }

    let mut ranked: Vec<AssetPerformance> = by_asset
        .into_iter()
        .map(|(asset, acc)| AssetPerformance {
            asset: asset.to_string(),
            trade_count: acc.count,
            average_profit_percent: (acc.percent_count > 0)
                .then(|| acc.percent_sum / Decimal::from(acc.percent_count)),
            total_profit: acc.total_profit,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_profit
            .cmp(&a.total_profit)
            .then_with(|| a.asset.cmp(&b.asset))
    });
    ranked.truncate(limit);
    ranked
}

/// Trades created within the last `hours`, newest first
///
/// A window reaching past the representable date range has no lower bound.
pub fn recent_trades(trades: Vec<Trade>, hours: i64, limit: usize, now: DateTime<Utc>) -> Vec<Trade> {
    let since = Duration::try_hours(hours)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut recent: Vec<Trade> = trades.into_iter().filter(|t| t.created_at >= since).collect();
    recent.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.tx_hash.cmp(&b.tx_hash))
    });
    recent.truncate(limit);
    recent
}

/// Trades whose predicted profit percent lies in `[min, max]`, highest first
pub fn trades_in_profit_range(trades: Vec<Trade>, min: Decimal, max: Decimal) -> Vec<Trade> {
    let mut matching: Vec<Trade> = trades
        .into_iter()
        .filter(|t| t.opportunity.profit_percent >= min && t.opportunity.profit_percent <= max)
        .collect();
    matching.sort_by(|a, b| {
        b.opportunity
            .profit_percent
            .cmp(&a.opportunity.profit_percent)
            .then_with(|| a.tx_hash.cmp(&b.tx_hash))
    });
    matching
}

/// Format fleet totals into a readable Markdown report
pub fn format_report(stats: &FleetStats, assets: &[AssetPerformance], now: DateTime<Utc>) -> String {
    let mut report = String::new();

    report.push_str("# Fleet Report\n\n");
    report.push_str("## Executive Summary\n\n");
    report.push_str(&format!("- **Total Trades**: {}\n", stats.total_trades));
    report.push_str(&format!(
        "- **Successful**: {} ({:.2}%)\n",
        stats.successful_trades, stats.success_rate
    ));
    report.push_str(&format!("- **Failed**: {}\n", stats.failed_trades));
    report.push_str(&format!("- **Timed Out**: {}\n", stats.timed_out_trades));
    report.push_str(&format!("- **Open**: {}\n", stats.open_trades));
    if let Some(ms) = stats.average_execution_time_ms {
        report.push_str(&format!("- **Average Execution Time**: {} ms\n", ms));
    }
    report.push_str(&format!(
        "- **Accounts**: {} ({} active)\n\n",
        stats.total_accounts, stats.active_accounts
    ));

    if stats.successful_trades > 0 {
        report.push_str("## Profit Analysis\n\n");
        report.push_str(&format!("- **Total Profit**: {:.6}\n", stats.total_profit));
        if let Some(percent) = stats.average_profit_percent {
            report.push_str(&format!("- **Average Profit**: {:.4}%\n", percent));
        }
        report.push_str(&format!(
            "- **Slippage Exceeded**: {} trades\n\n",
            stats.slippage_exceeded_trades
        ));
    }

    if !assets.is_empty() {
        report.push_str("## Top Assets\n\n");
        report.push_str("| Asset | Trades | Avg Profit % | Total Profit |\n");
        report.push_str("|---|---|---|---|\n");
        for asset in assets {
            let avg = asset
                .average_profit_percent
                .map(|p| format!("{:.4}", p))
                .unwrap_or_else(|| "-".to_string());
            report.push_str(&format!(
                "| {} | {} | {} | {:.6} |\n",
                asset.asset, asset.trade_count, avg, asset.total_profit
            ));
        }
        report.push('\n');
    }

    report.push_str("---\n\n");
    report.push_str(&format!("*Report generated at: {}*\n", now.to_rfc3339()));
    report
}
