use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the ledger core.
///
/// Missing or degenerate measurement inputs are not raised from the risk
/// evaluator; they are recorded as [`crate::data::ResultFlag`]s on the trade.
/// The `UnmeasurableResult` and `DivisionUndefined` variants exist for callers
/// that ask for a measurement directly and need an error value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("invalid state transition for {key}: {reason}")]
    InvalidStateTransition { key: String, reason: String },

    #[error("result not measurable: {0}")]
    UnmeasurableResult(String),

    #[error("division undefined: {0}")]
    DivisionUndefined(String),

    #[error("account {account} locked until {lock_until}")]
    AccountLocked {
        account: String,
        lock_until: DateTime<Utc>,
    },

    #[error("invalid credentials for {0}")]
    InvalidCredentials(String),

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl LedgerError {
    pub fn trade_not_found(tx_hash: &str) -> Self {
        Self::NotFound {
            entity: "trade",
            key: tx_hash.to_string(),
        }
    }

    pub fn account_not_found(account_id: &str) -> Self {
        Self::NotFound {
            entity: "account",
            key: account_id.to_string(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        Self::StorageFailure(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
