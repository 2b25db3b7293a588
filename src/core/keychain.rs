//! Keychain storage for remote credentials.
//!
//! Uses the system keychain (macOS Keychain, Linux Secret Service, Windows
//! Credential Manager). Key format: `<user>@<host>`.

use keyring::Entry;

use crate::error::{Error, Result};

const SERVICE_NAME: &str = "sitedeploy";

fn keyring_error(e: keyring::Error) -> Error {
    Error::Keychain(e.to_string())
}

fn entry(user: &str, host: &str) -> Result<Entry> {
    let key = format!("{}@{}", user, host);
    Entry::new(SERVICE_NAME, &key).map_err(keyring_error)
}

/// Store the password for a remote target.
pub fn store(user: &str, host: &str, password: &str) -> Result<()> {
    entry(user, host)?.set_password(password).map_err(keyring_error)
}

/// Retrieve the password for a remote target. Returns `None` if absent.
pub fn get(user: &str, host: &str) -> Result<Option<String>> {
    match entry(user, host)?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

/// Delete the stored password. Deleting a missing entry is not an error.
pub fn delete(user: &str, host: &str) -> Result<()> {
    match entry(user, host)?.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires keychain access and may prompt for permissions.
    // Run manually with: cargo test keychain -- --ignored

    #[test]
    #[ignore]
    fn store_get_delete_round_trip() {
        store("test-user", "test-host", "secret123").unwrap();
        assert_eq!(
            get("test-user", "test-host").unwrap(),
            Some("secret123".to_string())
        );

        delete("test-user", "test-host").unwrap();
        assert_eq!(get("test-user", "test-host").unwrap(), None);
    }
}
