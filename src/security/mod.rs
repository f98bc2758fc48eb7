pub mod credentials;
pub mod guard;

pub use credentials::{CredentialVerifier, OsSecretSource, SecretSource};
pub use guard::{AccountSecurityGuard, LoginStatus};
