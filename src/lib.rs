// Stellar Arbitrage Ledger
//
// Records arbitrage trades executed on the Stellar network and the accounts
// that run them:
// - Trade lifecycle from submission to a terminal status
// - Post-trade profit, slippage and threshold evaluation
// - Per-account login lockout, wallets and API credentials
// - Running per-account trade statistics
// - JSONL journals and fleet-wide reporting

pub mod config;
pub mod data;
pub mod error;
pub mod lifecycle;
pub mod reporting;
pub mod risk;
pub mod security;
pub mod service;
pub mod stats;

pub use config::Config;
pub use error::{LedgerError, Result};
pub use lifecycle::{Completion, TradeLifecycle};
pub use reporting::FleetStatsReporter;
pub use risk::RiskEvaluator;
pub use security::AccountSecurityGuard;
pub use service::LedgerService;
pub use stats::AccountStatsAggregator;
