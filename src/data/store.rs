// Concurrent in-memory store for trades and accounts.
//
// Each `update_*` call runs its closure while holding the entry's shard
// lock, on a working copy that is committed only when the closure returns
// Ok. Concurrent updates of the same entity therefore serialize, and a
// rejected update leaves the stored entity untouched. Every commit bumps the
// entity's `version`, which orders snapshots independently of journal
// append order.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{Trade, UserAccount};
use crate::error::{LedgerError, Result};

#[derive(Default, Clone)]
pub struct LedgerStore {
    trades: Arc<DashMap<String, Trade>>,
    accounts: Arc<DashMap<String, UserAccount>>,
    /// lowercase email -> username
    emails: Arc<DashMap<String, String>>,
    /// wallet address -> username
    wallets: Arc<DashMap<String, String>>,
    /// api key -> username
    api_keys: Arc<DashMap<String, String>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    pub fn insert_trade(&self, trade: Trade) -> Result<()> {
        match self.trades.entry(trade.tx_hash.clone()) {
            Entry::Occupied(_) => Err(LedgerError::Duplicate {
                field: "tx_hash",
                value: trade.tx_hash,
            }),
            Entry::Vacant(slot) => {
                debug!("Stored trade {}", trade.tx_hash);
                slot.insert(trade);
                Ok(())
            }
        }
    }

    pub fn trade(&self, tx_hash: &str) -> Result<Trade> {
        self.trades
            .get(tx_hash)
            .map(|t| t.clone())
            .ok_or_else(|| LedgerError::trade_not_found(tx_hash))
    }

    /// Atomically read-modify-write one trade
    pub fn update_trade<F>(&self, tx_hash: &str, f: F) -> Result<Trade>
    where
        F: FnOnce(Trade) -> Result<Trade>,
    {
        let mut entry = self
            .trades
            .get_mut(tx_hash)
            .ok_or_else(|| LedgerError::trade_not_found(tx_hash))?;
        let mut updated = f(entry.clone())?;
        if updated.tx_hash != tx_hash {
            return Err(LedgerError::InvalidStateTransition {
                key: tx_hash.to_string(),
                reason: "tx_hash is immutable".to_string(),
            });
        }
        updated.version = entry.version + 1;
        *entry = updated.clone();
        Ok(updated)
    }

    /// Snapshot of every trade; order is unspecified
    pub fn trades(&self) -> Vec<Trade> {
        self.trades.iter().map(|t| t.value().clone()).collect()
    }

    pub fn trades_for_wallets(&self, addresses: &[String]) -> Vec<Trade> {
        self.trades
            .iter()
            .filter(|t| addresses.contains(&t.wallet.address))
            .map(|t| t.value().clone())
            .collect()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Put a replayed snapshot back without uniqueness checks
    pub fn restore_trade(&self, trade: Trade) {
        self.trades.insert(trade.tx_hash.clone(), trade);
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub fn insert_account(&self, account: UserAccount) -> Result<()> {
        // Claim the email first so two registrations racing on the same
        // address cannot both succeed.
        match self.emails.entry(account.email.clone()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::Duplicate {
                    field: "email",
                    value: account.email,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(account.username.clone());
            }
        }

        match self.accounts.entry(account.username.clone()) {
            Entry::Occupied(_) => {
                self.emails.remove(&account.email);
                Err(LedgerError::Duplicate {
                    field: "username",
                    value: account.username,
                })
            }
            Entry::Vacant(slot) => {
                debug!("Stored account {}", account.username);
                self.index_account(&account);
                slot.insert(account);
                Ok(())
            }
        }
    }

    pub fn account(&self, username: &str) -> Result<UserAccount> {
        self.accounts
            .get(username)
            .map(|a| a.clone())
            .ok_or_else(|| LedgerError::account_not_found(username))
    }

    pub fn account_by_email(&self, email: &str) -> Result<UserAccount> {
        let email = email.trim().to_lowercase();
        let username = self
            .emails
            .get(&email)
            .map(|u| u.clone())
            .ok_or_else(|| LedgerError::account_not_found(&email))?;
        self.account(&username)
    }

    pub fn account_by_wallet(&self, address: &str) -> Result<UserAccount> {
        let username = self
            .wallets
            .get(address)
            .map(|u| u.clone())
            .ok_or_else(|| LedgerError::account_not_found(address))?;
        self.account(&username)
    }

    pub fn account_by_api_key(&self, api_key: &str) -> Result<UserAccount> {
        let username = self
            .api_keys
            .get(api_key)
            .map(|u| u.clone())
            .ok_or_else(|| LedgerError::NotFound {
                entity: "api key",
                key: "<redacted>".to_string(),
            })?;
        self.account(&username)
    }

    /// Atomically read-modify-write one account, keeping lookup indexes in step
    pub fn update_account<F>(&self, username: &str, f: F) -> Result<UserAccount>
    where
        F: FnOnce(UserAccount) -> Result<UserAccount>,
    {
        let mut entry = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| LedgerError::account_not_found(username))?;
        let before = entry.clone();
        let mut updated = f(before.clone())?;

        if updated.username != before.username || updated.email != before.email {
            return Err(LedgerError::InvalidStateTransition {
                key: username.to_string(),
                reason: "username and email are immutable".to_string(),
            });
        }
        self.claim_wallets(&before, &updated)?;
        self.release_wallets(&before, &updated);
        if before.api_access.api_key != updated.api_access.api_key {
            if let Some(key) = &before.api_access.api_key {
                self.api_keys.remove(key);
            }
            if let Some(key) = &updated.api_access.api_key {
                self.api_keys.insert(key.clone(), username.to_string());
            }
        }

        updated.version = before.version + 1;
        *entry = updated.clone();
        Ok(updated)
    }

    /// Claim the addresses newly attached to an account, all or nothing
    fn claim_wallets(&self, before: &UserAccount, updated: &UserAccount) -> Result<()> {
        let mut claimed: Vec<&str> = Vec::new();
        let mut conflict = None;
        for wallet in updated.wallets.iter().filter(|w| !before.owns_wallet(&w.address)) {
            match self.wallets.entry(wallet.address.clone()) {
                Entry::Occupied(owner) => {
                    if owner.get().as_str() != updated.username {
                        conflict = Some(wallet.address.clone());
                        break;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(updated.username.clone());
                    claimed.push(&wallet.address);
                }
            }
        }

        match conflict {
            Some(address) => {
                for address in claimed {
                    self.wallets.remove(address);
                }
                Err(LedgerError::Duplicate {
                    field: "wallet address",
                    value: address,
                })
            }
            None => Ok(()),
        }
    }

    fn release_wallets(&self, before: &UserAccount, updated: &UserAccount) {
        for wallet in before.wallets.iter().filter(|w| !updated.owns_wallet(&w.address)) {
            self.wallets
                .remove_if(&wallet.address, |_, owner| *owner == updated.username);
        }
    }

    pub fn accounts(&self) -> Vec<UserAccount> {
        self.accounts.iter().map(|a| a.value().clone()).collect()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Put a replayed snapshot back, rebuilding its indexes
    pub fn restore_account(&self, account: UserAccount) {
        if let Some(previous) = self.accounts.get(&account.username).map(|a| a.clone()) {
            self.unindex_account(&previous);
        }
        self.emails.insert(account.email.clone(), account.username.clone());
        self.index_account(&account);
        self.accounts.insert(account.username.clone(), account);
    }

    fn index_account(&self, account: &UserAccount) {
        for wallet in &account.wallets {
            self.wallets
                .insert(wallet.address.clone(), account.username.clone());
        }
        if let Some(key) = &account.api_access.api_key {
            self.api_keys.insert(key.clone(), account.username.clone());
        }
    }

    fn unindex_account(&self, account: &UserAccount) {
        for wallet in &account.wallets {
            self.wallets.remove(&wallet.address);
        }
        if let Some(key) = &account.api_access.api_key {
            self.api_keys.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::data::account::fixtures::account;
    use crate::data::trade::fixtures::{new_trade, WALLET};
    use crate::data::{ExecutionStatus, WalletConnection};
    use chrono::Utc;

    fn trade(tx_hash: &str) -> Trade {
        Trade::new(new_trade(tx_hash), &RiskConfig::default(), Utc::now()).unwrap()
    }

    #[test]
    fn test_duplicate_trade_rejected() {
        let store = LedgerStore::new();
        store.insert_trade(trade("tx1")).unwrap();
        assert!(matches!(
            store.insert_trade(trade("tx1")),
            Err(LedgerError::Duplicate { field: "tx_hash", .. })
        ));
        assert_eq!(store.trade_count(), 1);
    }

    #[test]
    fn test_failed_update_leaves_trade_untouched() {
        let store = LedgerStore::new();
        store.insert_trade(trade("tx1")).unwrap();

        let result = store.update_trade("tx1", |mut t| {
            t.execution.status = ExecutionStatus::Success;
            Err(LedgerError::validation("test", "abort"))
        });

        assert!(result.is_err());
        assert_eq!(store.trade("tx1").unwrap().execution.status, ExecutionStatus::Pending);
    }

    #[test]
    fn test_unknown_trade_is_not_found() {
        let store = LedgerStore::new();
        assert!(matches!(store.trade("nope"), Err(LedgerError::NotFound { .. })));
        assert!(matches!(
            store.update_trade("nope", Ok),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_account_uniqueness() {
        let store = LedgerStore::new();
        let now = Utc::now();
        store.insert_account(account("alice", now)).unwrap();

        assert!(matches!(
            store.insert_account(account("alice", now)),
            Err(LedgerError::Duplicate { field: "email", .. })
        ));

        let mut same_name = account("alice", now);
        same_name.email = "other@example.com".to_string();
        assert!(matches!(
            store.insert_account(same_name),
            Err(LedgerError::Duplicate { field: "username", .. })
        ));
        // the rejected registration must not leave its email claimed
        assert!(store.account_by_email("other@example.com").is_err());
        assert_eq!(store.account_by_email("ALICE@example.com").unwrap().username, "alice");
    }

    #[test]
    fn test_wallet_index_follows_updates() {
        let store = LedgerStore::new();
        let now = Utc::now();
        store.insert_account(account("alice", now)).unwrap();
        store.insert_account(account("bobby", now)).unwrap();

        let connect = |mut a: UserAccount| {
            a.wallets.push(WalletConnection {
                address: WALLET.to_string(),
                network: "public".to_string(),
                is_active: true,
                connected_at: now,
                last_used: None,
            });
            Ok(a)
        };

        store.update_account("alice", connect).unwrap();
        assert_eq!(store.account_by_wallet(WALLET).unwrap().username, "alice");

        assert!(matches!(
            store.update_account("bobby", connect),
            Err(LedgerError::Duplicate { .. })
        ));
        assert!(store.account("bobby").unwrap().wallets.is_empty());
    }

    #[test]
    fn test_commits_bump_version() {
        let store = LedgerStore::new();
        let now = Utc::now();
        store.insert_trade(trade("tx1")).unwrap();
        store.insert_account(account("alice", now)).unwrap();

        assert_eq!(store.update_trade("tx1", Ok).unwrap().version, 1);
        assert_eq!(store.update_trade("tx1", Ok).unwrap().version, 2);
        let _ = store.update_trade("tx1", |_| Err(LedgerError::validation("test", "abort")));
        assert_eq!(store.trade("tx1").unwrap().version, 2);

        assert_eq!(store.update_account("alice", Ok).unwrap().version, 1);
    }

    #[test]
    fn test_concurrent_wallet_claims_have_one_winner() {
        let now = Utc::now();
        for _ in 0..50 {
            let store = LedgerStore::new();
            store.insert_account(account("alice", now)).unwrap();
            store.insert_account(account("bobby", now)).unwrap();

            let results: Vec<Result<UserAccount>> = std::thread::scope(|scope| {
                let handles: Vec<_> = ["alice", "bobby"]
                    .into_iter()
                    .map(|name| {
                        let store = store.clone();
                        scope.spawn(move || {
                            store.update_account(name, |mut a| {
                                a.wallets.push(WalletConnection {
                                    address: WALLET.to_string(),
                                    network: "public".to_string(),
                                    is_active: true,
                                    connected_at: now,
                                    last_used: None,
                                });
                                Ok(a)
                            })
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let winners: Vec<&UserAccount> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(winners.len(), 1);
            let owner = store.account_by_wallet(WALLET).unwrap();
            assert_eq!(owner.username, winners[0].username);
            let owners = store.accounts().iter().filter(|a| a.owns_wallet(WALLET)).count();
            assert_eq!(owners, 1);
        }
    }
}
