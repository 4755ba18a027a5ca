//! Keychain-backed credential storage.
//!
//! Persists the token record as a single JSON payload under one keychain
//! entry, so a write is atomic from the platform's point of view. The
//! blocking keyring calls run on the blocking pool.

use async_trait::async_trait;
use keyring::Entry;
use perch_core::ports::CredentialStore;
use perch_domain::errors::{PerchError, Result};
use perch_domain::types::TokenRecord;
use tracing::{debug, warn};

use crate::errors::InfraError;

const DEFAULT_SERVICE: &str = "Perch.oauth";
const DEFAULT_ACCOUNT: &str = "default";

/// Platform keychain implementation of the [`CredentialStore`] port.
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service: service.into(), account: account.into() }
    }

    fn entry(service: &str, account: &str) -> Result<Entry> {
        Entry::new(service, account).map_err(|err| PerchError::from(InfraError::from(err)))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE, DEFAULT_ACCOUNT)
    }
}

fn encode(record: &TokenRecord) -> Result<String> {
    serde_json::to_string(record).map_err(|err| PerchError::from(InfraError::from(err)))
}

/// A payload that no longer parses is treated as absent: the only recovery
/// is a fresh authorization, not a hard failure at startup.
fn decode(payload: &str) -> Option<TokenRecord> {
    match serde_json::from_str(payload) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(error = %err, "stored credential is malformed, treating as absent");
            None
        }
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn store(&self, record: &TokenRecord) -> Result<()> {
        let service = self.service.clone();
        let account = self.account.clone();
        let payload = encode(record)?;

        tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&service, &account)?;
            entry
                .set_password(&payload)
                .map_err(|err| PerchError::from(InfraError::from(err)))
        })
        .await
        .map_err(|err| PerchError::Internal(format!("keychain task failed: {err}")))??;

        debug!(service = %self.service, "token record stored in keychain");
        Ok(())
    }

    async fn load(&self) -> Result<Option<TokenRecord>> {
        let service = self.service.clone();
        let account = self.account.clone();

        let payload = tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&service, &account)?;
            match entry.get_password() {
                Ok(payload) => Ok(Some(payload)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(err) => Err(PerchError::from(InfraError::from(err))),
            }
        })
        .await
        .map_err(|err| PerchError::Internal(format!("keychain task failed: {err}")))??;

        match payload {
            Some(payload) => {
                let record = decode(&payload);
                if record.is_some() {
                    debug!(service = %self.service, "token record loaded from keychain");
                }
                Ok(record)
            }
            None => Ok(None),
        }
    }

    async fn clear(&self) -> Result<()> {
        let service = self.service.clone();
        let account = self.account.clone();

        tokio::task::spawn_blocking(move || {
            let entry = Self::entry(&service, &account)?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(err) => Err(PerchError::from(InfraError::from(err))),
            }
        })
        .await
        .map_err(|err| PerchError::Internal(format!("keychain task failed: {err}")))??;

        debug!(service = %self.service, "token record cleared from keychain");
        Ok(())
    }
}
