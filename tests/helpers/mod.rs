// Shared fixtures for ledger integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU64, Ordering};

use stellar_arb_ledger::config::Config;
use stellar_arb_ledger::data::{BalanceSheet, LedgerStore, NewTrade, Opportunity};
use stellar_arb_ledger::security::{CredentialVerifier, SecretSource};
use stellar_arb_ledger::LedgerService;

pub const WALLET_A: &str = "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H";
pub const WALLET_B: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";
pub const PASSWORD: &str = "correct horse battery";

/// Reversible stand-in for a real password hasher
pub struct PlainVerifier;

impl CredentialVerifier for PlainVerifier {
    fn hash(&self, plaintext: &str) -> anyhow::Result<String> {
        Ok(format!("plain${}", plaintext))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        hash.strip_prefix("plain$") == Some(plaintext)
    }
}

/// Deterministic secrets: each call yields the next counter value
#[derive(Default)]
pub struct CountingSecrets {
    next: AtomicU64,
}

impl SecretSource for CountingSecrets {
    fn random_hex(&self, bytes: usize) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{:0width$x}", n, width = bytes * 2)
    }
}

pub fn service() -> LedgerService {
    LedgerService::new(&Config::default(), LedgerStore::new())
}

pub fn balances(entries: &[(&str, Decimal)]) -> BalanceSheet {
    entries.iter().map(|(a, v)| (a.to_string(), *v)).collect()
}

pub fn opportunity(assets: &[&str], expected_profit: Option<Decimal>) -> Opportunity {
    Opportunity {
        asset_loop: assets.iter().map(|a| a.to_string()).collect(),
        profit_percent: dec!(1.8),
        max_executable_amount: dec!(100),
        expected_profit,
    }
}

/// XLM -> USDC -> XLM cycle opened with 100 XLM, expecting 1.8 XLM profit
pub fn xlm_trade(tx_hash: &str, wallet: &str) -> NewTrade {
    NewTrade {
        tx_hash: tx_hash.to_string(),
        opportunity: opportunity(&["XLM", "USDC", "XLM"], Some(dec!(1.8))),
        wallet_address: wallet.to_string(),
        balance_before: Some(balances(&[("XLM", dec!(100))])),
        max_slippage: None,
        min_profit_threshold: None,
    }
}

pub async fn register(service: &LedgerService, username: &str, wallet: &str, now: DateTime<Utc>) {
    service
        .register_account(
            username,
            &format!("{}@example.com", username),
            PASSWORD,
            &PlainVerifier,
            now,
        )
        .await
        .unwrap();
    service
        .connect_wallet(username, wallet, "public", now)
        .await
        .unwrap();
}
