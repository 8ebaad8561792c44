// Push credential lookup.
//
// The push token comes from the environment (headless deployments) or
// the OS keychain. The daemon only reads it: storing and rotating the
// token is the dashboard's job. The token is handed to the git gateway
// and must never be persisted or logged by anything in this crate.

use anyhow::{Context, Result};

const KEYCHAIN_SERVICE: &str = "cadence";
const KEYCHAIN_ACCOUNT: &str = "push-token";
const TOKEN_ENV_VAR: &str = "CADENCE_PUSH_TOKEN";

/// Resolve the optional push token: environment first, then keychain.
/// A missing token is not an error; push simply runs unauthenticated.
pub fn push_token() -> Result<Option<String>> {
    if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Ok(Some(token));
        }
    }

    keychain_token(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
}

fn keychain_token(service: &str, account: &str) -> Result<Option<String>> {
    let entry =
        keyring::Entry::new(service, account).context("failed to initialize keychain entry")?;
    match entry.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        // Headless hosts without a keychain backend degrade to no token.
        Err(keyring::Error::PlatformFailure(_)) | Err(keyring::Error::NoStorageAccess(_)) => {
            tracing::warn!("keychain unavailable, push will run without a token");
            Ok(None)
        }
        Err(error) => Err(error).context("failed to read keychain entry"),
    }
}
