pub mod aggregator;

pub use aggregator::{success_rate, AccountStatsAggregator, TradeOutcome};
