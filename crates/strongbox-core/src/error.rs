use thiserror::Error;

use crate::security::SecurityLevel;

/// Failure reported by an underlying crypto facility (keystore, keyring, cipher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FacilityError {
    pub message: String,
}

impl FacilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by cipher storages, the registry and the entry store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeychainError {
    /// The backend cannot guarantee the requested level; the write is rejected.
    #[error("insufficient security level for {backend} (wants {requested}; got {actual})")]
    SecurityLevelUnsatisfied {
        backend: String,
        requested: SecurityLevel,
        actual: SecurityLevel,
    },
    /// The backend's native facility is not usable on this device or session.
    #[error("crypto facility unavailable for {backend}")]
    CryptoUnavailable { backend: String },
    /// The native facility failed while encrypting or decrypting.
    #[error("{operation} failed for service {service}")]
    CryptoFailed {
        operation: &'static str,
        service: String,
        #[source]
        source: FacilityError,
    },
    /// The persisted backend name has no counterpart in this build.
    #[error("unknown cipher storage: {name}")]
    UnknownBackend { name: String },
    /// The raw text does not look like a persisted entry at all.
    #[error("malformed entry: {reason}")]
    MalformedEntry { reason: String },
    /// The entry has the right shape but its payload cannot be decoded.
    #[error("corrupt entry: {reason}")]
    CorruptEntry { reason: String },
    /// No available backend satisfies the requested level.
    #[error("no cipher storage satisfies {requested}")]
    NoSuitableBackend { requested: SecurityLevel },
    /// Underlying raw store failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

pub type Result<T, E = KeychainError> = std::result::Result<T, E>;
