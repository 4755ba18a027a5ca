//! Conversions from external infrastructure errors into domain errors.

use keyring::Error as KeyringError;
use perch_domain::PerchError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PerchError);

impl From<InfraError> for PerchError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PerchError> for InfraError {
    fn from(value: PerchError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPerchError {
    fn into_perch(self) -> PerchError;
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → PerchError */
/* -------------------------------------------------------------------------- */

impl IntoPerchError for KeyringError {
    fn into_perch(self) -> PerchError {
        match self {
            KeyringError::NoEntry => PerchError::Store("keychain entry not found".into()),
            KeyringError::BadEncoding(_) => {
                PerchError::Store("credential in keychain is not valid UTF-8".into())
            }
            KeyringError::TooLong(name, limit) => PerchError::Store(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            KeyringError::Invalid(attr, reason) => {
                PerchError::Store(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            KeyringError::Ambiguous(entries) => PerchError::Store(format!(
                "multiple keychain entries matched request ({} results)",
                entries.len()
            )),
            KeyringError::PlatformFailure(err) => {
                PerchError::Store(format!("keychain platform error: {err}"))
            }
            KeyringError::NoStorageAccess(err) => {
                PerchError::Store(format!("unable to access secure storage: {err}"))
            }
            other => PerchError::Store(format!("keychain error: {other}")),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_perch())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PerchError */
/* -------------------------------------------------------------------------- */

impl IntoPerchError for HttpError {
    fn into_perch(self) -> PerchError {
        if self.is_timeout() {
            return PerchError::Network("http request timed out".into());
        }

        if self.is_connect() {
            return PerchError::Network("http connection failure".into());
        }

        if let Some(status) = self.status() {
            return PerchError::Api {
                status: status.as_u16(),
                detail: format!(
                    "http {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("unknown status")
                ),
            };
        }

        PerchError::Network(format!("http request failed: {self}"))
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_perch())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → PerchError */
/* -------------------------------------------------------------------------- */

impl IntoPerchError for serde_json::Error {
    fn into_perch(self) -> PerchError {
        PerchError::Store(format!("serialization failed: {self}"))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(value.into_perch())
    }
}
