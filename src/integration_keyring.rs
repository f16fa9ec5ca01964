//! Keyring helpers for upstream credentials.

use keyring::Entry;

const SERVICE_PREFIX: &str = "liner.source";

fn source_entry(source: &str, account: &str) -> Result<Entry, String> {
    Entry::new(&format!("{SERVICE_PREFIX}.{source}"), account)
        .map_err(|err| format!("failed to create keyring entry: {err}"))
}

/// Loads one upstream secret (for example `spotify` / `client_secret`) from the OS keyring.
pub fn get_source_secret(source: &str, account: &str) -> Result<Option<String>, String> {
    let entry = source_entry(source, account)?;
    match entry.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(format!("failed to get keyring secret: {err}")),
    }
}

/// Returns `configured` when set, otherwise the keyring value, otherwise empty.
pub fn resolve_secret(configured: &str, source: &str, account: &str) -> String {
    if !configured.trim().is_empty() {
        return configured.trim().to_string();
    }
    match get_source_secret(source, account) {
        Ok(Some(secret)) => secret.trim().to_string(),
        Ok(None) => String::new(),
        Err(err) => {
            log::warn!("Keyring: {} for {}.{}", err, source, account);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_secret;

    #[test]
    fn test_configured_value_wins_without_touching_keyring() {
        assert_eq!(resolve_secret("  abc  ", "spotify", "client_id"), "abc");
    }
}
