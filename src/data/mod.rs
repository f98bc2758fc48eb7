pub mod account;
pub mod storage;
pub mod store;
pub mod trade;
pub mod validate;

pub use account::{
    AccountStats, AccountStatus, ApiAccess, NewAccount, NotificationPreferences, Preferences,
    RiskTolerance, SecurityState, UserAccount, WalletConnection,
};
pub use storage::{AccountJournal, Journal, Keyed, TradeJournal};
pub use store::LedgerStore;
pub use trade::{
    BalanceSheet, Execution, ExecutionStatus, NewTrade, Opportunity, ResultFlag, Trade,
    TradeResults, TradeRisk, WalletSnapshot,
};
