use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SecurityConfig;
use crate::data::{AccountStatus, SecurityState, UserAccount};
use crate::error::{LedgerError, Result};

/// Lock state reported back after a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoginStatus {
    pub locked: bool,
    pub lock_until: Option<DateTime<Utc>>,
    pub login_attempts: u32,
}

impl LoginStatus {
    fn of(security: &SecurityState, now: DateTime<Utc>) -> Self {
        let locked = is_locked_at(security, now);
        Self {
            locked,
            lock_until: if locked { security.lock_until } else { None },
            login_attempts: security.login_attempts,
        }
    }
}

/// Login-attempt counter and time-boxed lockout
///
/// All transitions take the current [`SecurityState`] by value and return the
/// next one; the caller persists it atomically with the rest of the account.
pub struct AccountSecurityGuard {
    config: SecurityConfig,
}

impl AccountSecurityGuard {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    pub fn is_locked(&self, security: &SecurityState, now: DateTime<Utc>) -> bool {
        is_locked_at(security, now)
    }

    /// Count a failed login
    ///
    /// An expired lock restarts the count at 1. Otherwise the count grows and
    /// the lock engages once it reaches the configured maximum.
    pub fn record_failed_login(&self, mut security: SecurityState, now: DateTime<Utc>) -> SecurityState {
        match security.lock_until {
            Some(lock_until) if lock_until < now => {
                debug!("Lock expired at {}, restarting attempt count", lock_until);
                security.login_attempts = 1;
                security.lock_until = None;
            }
            _ => {
                security.login_attempts = security.login_attempts.saturating_add(1);
                if security.login_attempts >= self.config.max_login_attempts
                    && security.lock_until.is_none()
                {
                    let lock_until = now + self.config.lock_duration;
                    security.lock_until = Some(lock_until);
                    warn!(
                        "Lock engaged after {} failed logins, until {}",
                        security.login_attempts, lock_until
                    );
                }
            }
        }
        security
    }

    /// Clear the counter and any lock, and stamp the login
    pub fn record_successful_login(
        &self,
        mut security: SecurityState,
        now: DateTime<Utc>,
        ip: Option<&str>,
    ) -> SecurityState {
        security.login_attempts = 0;
        security.lock_until = None;
        security.last_login_at = Some(now);
        if let Some(ip) = ip {
            security.last_login_ip = Some(ip.to_string());
        }
        security
    }

    /// Record an attempt whose credential check happened elsewhere
    ///
    /// A currently locked account is left untouched: the attempt is rejected
    /// before it can count.
    pub fn record_login_attempt(
        &self,
        security: SecurityState,
        success: bool,
        now: DateTime<Utc>,
    ) -> (SecurityState, LoginStatus) {
        if self.is_locked(&security, now) {
            let status = LoginStatus::of(&security, now);
            return (security, status);
        }
        let next = if success {
            self.record_successful_login(security, now, None)
        } else {
            self.record_failed_login(security, now)
        };
        let status = LoginStatus::of(&next, now);
        (next, status)
    }

    /// Reset lockout state after a password change
    pub fn record_password_change(&self, mut security: SecurityState, now: DateTime<Utc>) -> SecurityState {
        security.login_attempts = 0;
        security.lock_until = None;
        security.password_changed_at = Some(now);
        security
    }

    /// Reject suspended, banned and currently locked accounts
    ///
    /// Must run before any credential verification.
    pub fn check_access(&self, account: &UserAccount, now: DateTime<Utc>) -> Result<()> {
        match account.status {
            AccountStatus::Active => {}
            status => {
                info!("Login refused for {}: account is {:?}", account.username, status);
                return Err(LedgerError::validation(
                    "account.status",
                    format!("{} is {:?}", account.username, status).to_lowercase(),
                ));
            }
        }
        if let Some(lock_until) = account.security.lock_until.filter(|l| *l > now) {
            info!("Login refused for {}: locked until {}", account.username, lock_until);
            return Err(LedgerError::AccountLocked {
                account: account.username.clone(),
                lock_until,
            });
        }
        Ok(())
    }
}

fn is_locked_at(security: &SecurityState, now: DateTime<Utc>) -> bool {
    security.lock_until.is_some_and(|lock_until| lock_until > now)
}
