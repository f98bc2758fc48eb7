// Boundary checks for identifiers that enter the ledger from collaborators.
//
// Asset identifiers are either the native code `XLM` or a Stellar credit
// asset written as `CODE` or `CODE:ISSUER`, where CODE is 1-12 ASCII
// alphanumerics and ISSUER is a Stellar account id.

use crate::error::{LedgerError, Result};

const ACCOUNT_ID_LEN: usize = 56;
const MAX_ASSET_CODE_LEN: usize = 12;

/// Check that `asset` is a well-formed asset identifier
pub fn validate_asset_id(asset: &str) -> Result<()> {
    let (code, issuer) = match asset.split_once(':') {
        Some((code, issuer)) => (code, Some(issuer)),
        None => (asset, None),
    };

    if code.is_empty() || code.len() > MAX_ASSET_CODE_LEN {
        return Err(LedgerError::validation(
            "asset",
            format!("'{}' code must be 1-{} characters", asset, MAX_ASSET_CODE_LEN),
        ));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LedgerError::validation(
            "asset",
            format!("'{}' code must be alphanumeric", asset),
        ));
    }
    if let Some(issuer) = issuer {
        validate_account_id(issuer).map_err(|_| {
            LedgerError::validation("asset", format!("'{}' has a malformed issuer", asset))
        })?;
    }
    Ok(())
}

/// Check that `address` looks like a Stellar public account id (G..., base32, 56 chars)
pub fn validate_account_id(address: &str) -> Result<()> {
    let well_formed = address.len() == ACCOUNT_ID_LEN
        && address.starts_with('G')
        && address
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c));

    if well_formed {
        Ok(())
    } else {
        Err(LedgerError::validation(
            "address",
            format!("'{}' is not a Stellar account id", address),
        ))
    }
}

/// Usernames are 3-30 characters of ASCII alphanumerics, '_' or '-'
pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return Err(LedgerError::validation(
            "username",
            "must be between 3 and 30 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(LedgerError::validation(
            "username",
            "may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

/// Lowercase and shape-check an email address
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(LedgerError::validation("email", format!("'{}' is not an email address", email)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";

    #[test]
    fn test_asset_ids() {
        assert!(validate_asset_id("XLM").is_ok());
        assert!(validate_asset_id(&format!("USDC:{}", ISSUER)).is_ok());
        assert!(validate_asset_id("").is_err());
        assert!(validate_asset_id("TOOLONGASSETCODE").is_err());
        assert!(validate_asset_id("US-DC").is_err());
        assert!(validate_asset_id("USDC:not-an-issuer").is_err());
    }

    #[test]
    fn test_account_ids() {
        assert!(validate_account_id(ISSUER).is_ok());
        assert!(validate_account_id(&ISSUER.to_lowercase()).is_err());
        assert!(validate_account_id(&ISSUER[..55]).is_err());
        assert!(validate_account_id(&ISSUER.replacen('G', "S", 1)).is_err());
    }

    #[test]
    fn test_usernames() {
        assert!(validate_username("arb_bot-01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
        assert!(validate_username("has space").is_err());
    }

    #[test]
    fn test_email_is_case_insensitive() {
        assert_eq!(normalize_email(" Trader@Example.COM ").unwrap(), "trader@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("@example.com").is_err());
    }
}
