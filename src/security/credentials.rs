// Credential collaborators and API key issuance.
//
// Password hashing and the random source are supplied by the host
// application; this module only defines the seams and the rules for
// issuing and revoking API credentials.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt::Write as _;

use crate::config::ApiConfig;
use crate::data::ApiAccess;

/// One-way password hashing
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, plaintext: &str) -> anyhow::Result<String>;
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// Source of random secret material
pub trait SecretSource: Send + Sync {
    /// `bytes` random bytes, hex encoded
    fn random_hex(&self, bytes: usize) -> String;
}

/// Secret source backed by the operating system RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecretSource;

impl SecretSource for OsSecretSource {
    fn random_hex(&self, bytes: usize) -> String {
        let mut buf = vec![0u8; bytes];
        OsRng.fill_bytes(&mut buf);
        buf.iter().fold(String::with_capacity(bytes * 2), |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        })
    }
}

/// Replace the API key pair and enable access
pub fn issue_api_credentials(
    mut access: ApiAccess,
    source: &dyn SecretSource,
    config: &ApiConfig,
) -> ApiAccess {
    access.api_key = Some(source.random_hex(config.key_bytes));
    access.api_secret = Some(source.random_hex(config.secret_bytes));
    access.enabled = true;
    access.last_api_call = None;
    access
}

pub fn revoke_api_credentials(mut access: ApiAccess) -> ApiAccess {
    access.enabled = false;
    access.api_key = None;
    access.api_secret = None;
    access
}

pub fn record_api_call(mut access: ApiAccess, now: DateTime<Utc>) -> ApiAccess {
    access.last_api_call = Some(now);
    access
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled() -> ApiAccess {
        ApiAccess {
            enabled: false,
            api_key: None,
            api_secret: None,
            rate_limit: 100,
            last_api_call: Some(Utc::now()),
        }
    }

    #[test]
    fn test_os_source_hex_length() {
        let hex = OsSecretSource.random_hex(16);
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hex, OsSecretSource.random_hex(16));
    }

    #[test]
    fn test_issue_and_revoke() {
        let config = ApiConfig::default();
        let issued = issue_api_credentials(disabled(), &OsSecretSource, &config);

        assert!(issued.enabled);
        assert_eq!(issued.api_key.as_ref().unwrap().len(), config.key_bytes * 2);
        assert_eq!(issued.api_secret.as_ref().unwrap().len(), config.secret_bytes * 2);
        assert!(issued.last_api_call.is_none());
        assert_eq!(issued.rate_limit, 100);

        let revoked = revoke_api_credentials(issued);
        assert!(!revoked.enabled);
        assert!(revoked.api_key.is_none());
        assert!(revoked.api_secret.is_none());
    }
}
