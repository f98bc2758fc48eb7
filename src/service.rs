// Ledger service: the operations exposed to collaborators.
//
// Each operation is one atomic read-modify-write on a single entity in the
// `LedgerStore`, followed by a journal append of the new snapshot. Trade
// completion and the account stats update are separate entity writes; the
// per-account applied-trade set makes `reconcile_account_stats` safe to run
// after a crash between them.

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, Config};
use crate::data::validate::validate_account_id;
use crate::data::{
    AccountJournal, AccountStats, AccountStatus, LedgerStore, NewAccount, NewTrade, Trade,
    TradeJournal, UserAccount, WalletConnection,
};
use crate::error::{LedgerError, Result};
use crate::lifecycle::{Completion, TradeLifecycle};
use crate::reporting::FleetStatsReporter;
use crate::security::credentials::{issue_api_credentials, record_api_call, revoke_api_credentials};
use crate::security::{AccountSecurityGuard, CredentialVerifier, LoginStatus, SecretSource};
use crate::stats::{AccountStatsAggregator, TradeOutcome};

const MIN_PASSWORD_LEN: usize = 8;

pub struct LedgerService {
    store: LedgerStore,
    lifecycle: TradeLifecycle,
    guard: AccountSecurityGuard,
    api: ApiConfig,
    trade_journal: Option<TradeJournal>,
    account_journal: Option<AccountJournal>,
}

impl LedgerService {
    /// In-memory service without journals
    pub fn new(config: &Config, store: LedgerStore) -> Self {
        Self {
            store,
            lifecycle: TradeLifecycle::new(config.risk.clone()),
            guard: AccountSecurityGuard::new(config.security.clone()),
            api: config.api.clone(),
            trade_journal: None,
            account_journal: None,
        }
    }

    pub fn with_journals(mut self, trades: TradeJournal, accounts: AccountJournal) -> Self {
        self.trade_journal = Some(trades);
        self.account_journal = Some(accounts);
        self
    }

    /// Build a journaled service from config and replay existing journals
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let service = Self::new(config, LedgerStore::new()).with_journals(
            TradeJournal::new(&config.storage.trade_journal_path),
            AccountJournal::new(&config.storage.account_journal_path),
        );
        let (trades, accounts) = service.replay().await?;
        info!("Ledger opened: {} trades, {} accounts", trades, accounts);
        Ok(service)
    }

    /// Load the latest journal snapshots into the store
    pub async fn replay(&self) -> anyhow::Result<(usize, usize)> {
        let mut trade_count = 0;
        if let Some(journal) = &self.trade_journal {
            let trades = journal
                .load_latest()
                .await
                .context("Failed to replay trade journal")?;
            trade_count = trades.len();
            for trade in trades {
                self.store.restore_trade(trade);
            }
        }

        let mut account_count = 0;
        if let Some(journal) = &self.account_journal {
            let accounts = journal
                .load_latest()
                .await
                .context("Failed to replay account journal")?;
            account_count = accounts.len();
            for account in accounts {
                self.store.restore_account(account);
            }
        }
        Ok((trade_count, account_count))
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn reporter(&self) -> FleetStatsReporter {
        FleetStatsReporter::new(self.store.clone())
    }

    async fn persist_trade(&self, trade: &Trade) -> Result<()> {
        if let Some(journal) = &self.trade_journal {
            journal.append(trade).await?;
        }
        Ok(())
    }

    async fn persist_account(&self, account: &UserAccount) -> Result<()> {
        if let Some(journal) = &self.account_journal {
            journal.append(account).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Trades
    // ========================================================================

    pub fn trade(&self, tx_hash: &str) -> Result<Trade> {
        self.store.trade(tx_hash)
    }

    pub async fn submit_trade(&self, new: NewTrade, now: DateTime<Utc>) -> Result<Trade> {
        let trade = self.lifecycle.open(new, now)?;
        self.store.insert_trade(trade.clone())?;
        self.persist_trade(&trade).await?;
        Ok(trade)
    }

    pub async fn mark_submitted(&self, tx_hash: &str, now: DateTime<Utc>) -> Result<Trade> {
        let trade = self
            .store
            .update_trade(tx_hash, |t| self.lifecycle.mark_submitted(t, now))?;
        self.persist_trade(&trade).await?;
        Ok(trade)
    }

    /// Finalize a trade with the execution engine's outcome
    pub async fn complete_trade(
        &self,
        tx_hash: &str,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<Trade> {
        let trade = self
            .store
            .update_trade(tx_hash, |t| self.lifecycle.complete(t, completion, now))?;
        self.persist_trade(&trade).await?;
        Ok(trade)
    }

    /// Finalize a trade after the external deadline passed without confirmation
    pub async fn time_out_trade(&self, tx_hash: &str, now: DateTime<Utc>) -> Result<Trade> {
        let trade = self
            .store
            .update_trade(tx_hash, |t| self.lifecycle.time_out(t, now))?;
        self.persist_trade(&trade).await?;
        Ok(trade)
    }

    // ========================================================================
    // Stats
    // ========================================================================

    /// Fold an outcome into an account, once per trade
    pub async fn apply_trade_outcome(
        &self,
        username: &str,
        tx_hash: &str,
        outcome: &TradeOutcome,
        now: DateTime<Utc>,
    ) -> Result<AccountStats> {
        let account = self.store.update_account(username, |a| {
            AccountStatsAggregator::apply_to_account(a, tx_hash, outcome, now)
        })?;
        self.persist_account(&account).await?;
        Ok(account.stats)
    }

    /// Apply a terminal trade's outcome to the account owning its wallet
    pub async fn settle_trade(&self, tx_hash: &str, now: DateTime<Utc>) -> Result<AccountStats> {
        let trade = self.store.trade(tx_hash)?;
        let outcome = TradeOutcome::from_trade(&trade).ok_or_else(|| {
            LedgerError::InvalidStateTransition {
                key: tx_hash.to_string(),
                reason: format!("trade is still {}", trade.execution.status),
            }
        })?;
        let owner = self.store.account_by_wallet(&trade.wallet.address)?;
        self.apply_trade_outcome(&owner.username, tx_hash, &outcome, now)
            .await
    }

    /// Apply every terminal trade of the account not yet folded into its stats
    ///
    /// Returns how many trades were applied.
    pub async fn reconcile_account_stats(&self, username: &str, now: DateTime<Utc>) -> Result<usize> {
        let account = self.store.account(username)?;
        let addresses: Vec<String> = account.wallets.iter().map(|w| w.address.clone()).collect();

        let mut pending: Vec<Trade> = self
            .store
            .trades_for_wallets(&addresses)
            .into_iter()
            .filter(|t| t.is_terminal() && !account.applied_trades.contains(&t.tx_hash))
            .collect();
        pending.sort_by_key(|t| (t.execution.completed_at, t.tx_hash.clone()));

        let mut applied = 0;
        for trade in &pending {
            let Some(outcome) = TradeOutcome::from_trade(trade) else {
                continue;
            };
            match self
                .apply_trade_outcome(username, &trade.tx_hash, &outcome, now)
                .await
            {
                Ok(_) => applied += 1,
                // applied concurrently since the snapshot was taken
                Err(LedgerError::InvalidStateTransition { .. }) => {
                    debug!("Trade {} already applied to {}", trade.tx_hash, username)
                }
                Err(e) => return Err(e),
            }
        }

        if applied > 0 {
            info!("Reconciled {} trades into {}", applied, username);
        }
        Ok(applied)
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub fn account(&self, username: &str) -> Result<UserAccount> {
        self.store.account(username)
    }

    pub async fn register_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
        verifier: &dyn CredentialVerifier,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        let password_hash = hash_password(password, verifier)?;
        let account = UserAccount::new(
            NewAccount {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            },
            self.lifecycle.risk_config(),
            self.api.rate_limit,
            now,
        )?;
        self.store.insert_account(account.clone())?;
        self.persist_account(&account).await?;
        info!("Registered account {}", account.username);
        Ok(account)
    }

    /// Attach a wallet, or reactivate it if already known to this account
    pub async fn connect_wallet(
        &self,
        username: &str,
        address: &str,
        network: &str,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        validate_account_id(address)?;
        if network.trim().is_empty() {
            return Err(LedgerError::validation("network", "must not be empty"));
        }

        let account = self.store.update_account(username, |mut a| {
            match a.wallet_mut(address) {
                Some(wallet) => {
                    wallet.is_active = true;
                    wallet.network = network.to_string();
                }
                None => a.wallets.push(WalletConnection {
                    address: address.to_string(),
                    network: network.to_string(),
                    is_active: true,
                    connected_at: now,
                    last_used: None,
                }),
            }
            a.updated_at = now;
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        info!("Wallet {} connected to {}", address, username);
        Ok(account)
    }

    /// Deactivate a wallet; it stays on record so its trades still resolve
    pub async fn disconnect_wallet(
        &self,
        username: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        let account = self.store.update_account(username, |mut a| {
            let wallet = a.wallet_mut(address).ok_or_else(|| LedgerError::NotFound {
                entity: "wallet",
                key: address.to_string(),
            })?;
            wallet.is_active = false;
            a.updated_at = now;
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        Ok(account)
    }

    pub async fn touch_wallet(&self, address: &str, now: DateTime<Utc>) -> Result<UserAccount> {
        let owner = self.store.account_by_wallet(address)?;
        let account = self.store.update_account(&owner.username, |mut a| {
            if let Some(wallet) = a.wallet_mut(address) {
                wallet.last_used = Some(now);
            }
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        Ok(account)
    }

    /// Record a login attempt whose credentials were checked by the caller
    pub async fn record_login_attempt(
        &self,
        username: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<LoginStatus> {
        let mut status = None;
        let account = self.store.update_account(username, |mut a| {
            let (security, login_status) = self.guard.record_login_attempt(a.security, success, now);
            a.security = security;
            status = Some(login_status);
            Ok(a)
        })?;
        self.persist_account(&account).await?;

        let status = status.ok_or_else(|| LedgerError::account_not_found(username))?;
        if status.locked {
            warn!("Account {} locked until {:?}", username, status.lock_until);
        }
        Ok(status)
    }

    /// Check lock state, verify the password and record the attempt
    ///
    /// A locked, suspended or banned account is rejected before the
    /// verifier is called and its counter is left alone.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        verifier: &dyn CredentialVerifier,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> Result<UserAccount> {
        let mut verified = false;
        let account = self.store.update_account(username, |mut a| {
            self.guard.check_access(&a, now)?;
            verified = verifier.verify(password, &a.password_hash);
            a.security = if verified {
                self.guard.record_successful_login(a.security, now, ip)
            } else {
                self.guard.record_failed_login(a.security, now)
            };
            Ok(a)
        })?;
        self.persist_account(&account).await?;

        if verified {
            info!("Login succeeded for {}", username);
            Ok(account)
        } else {
            warn!(
                "Login failed for {} (attempt {})",
                username, account.security.login_attempts
            );
            Err(LedgerError::InvalidCredentials(username.to_string()))
        }
    }

    pub async fn change_password(
        &self,
        username: &str,
        new_password: &str,
        verifier: &dyn CredentialVerifier,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        let password_hash = hash_password(new_password, verifier)?;
        let account = self.store.update_account(username, |mut a| {
            a.password_hash = password_hash;
            a.security = self.guard.record_password_change(a.security, now);
            a.updated_at = now;
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        info!("Password changed for {}", username);
        Ok(account)
    }

    pub async fn set_account_status(
        &self,
        username: &str,
        status: AccountStatus,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        let account = self.store.update_account(username, |mut a| {
            a.status = status;
            a.updated_at = now;
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        info!("Account {} is now {:?}", username, status);
        Ok(account)
    }

    // ========================================================================
    // API access
    // ========================================================================

    pub async fn issue_api_key(
        &self,
        username: &str,
        source: &dyn SecretSource,
        now: DateTime<Utc>,
    ) -> Result<UserAccount> {
        let account = self.store.update_account(username, |mut a| {
            a.api_access = issue_api_credentials(a.api_access, source, &self.api);
            a.updated_at = now;
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        info!("API key issued for {}", username);
        Ok(account)
    }

    pub async fn revoke_api_key(&self, username: &str, now: DateTime<Utc>) -> Result<UserAccount> {
        let account = self.store.update_account(username, |mut a| {
            a.api_access = revoke_api_credentials(a.api_access);
            a.updated_at = now;
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        info!("API key revoked for {}", username);
        Ok(account)
    }

    pub fn find_account_by_api_key(&self, api_key: &str) -> Result<UserAccount> {
        self.store.account_by_api_key(api_key)
    }

    /// Stamp an API call against an enabled key
    pub async fn record_api_call(&self, api_key: &str, now: DateTime<Utc>) -> Result<UserAccount> {
        let owner = self.store.account_by_api_key(api_key)?;
        let account = self.store.update_account(&owner.username, |mut a| {
            if !a.api_access.enabled || a.api_access.api_key.as_deref() != Some(api_key) {
                return Err(LedgerError::validation("api_key", "API access is disabled"));
            }
            a.api_access = record_api_call(a.api_access, now);
            Ok(a)
        })?;
        self.persist_account(&account).await?;
        Ok(account)
    }
}

fn hash_password(password: &str, verifier: &dyn CredentialVerifier) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(LedgerError::validation(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    verifier
        .hash(password)
        .map_err(|e| LedgerError::validation("password", format!("hashing failed: {}", e)))
}
