use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::{
    cipher::{CipherStorage, DecryptionResult},
    entry::{self, PersistedEntry},
    error::KeychainError,
    raw_store::RawStore,
    registry::CipherStorageRegistry,
    security::SecurityLevel,
};

/// Raw-store prefix shared by every entry of `service`.
///
/// The length prefix keeps the split point unambiguous when `service` or the
/// key contain `:`.
pub fn service_prefix(service: &str) -> String {
    format!("{}:{service}:", service.len())
}

/// Raw-store key for `(service, key)`: `<len(service)>:<service>:<key>`.
pub fn entry_key(service: &str, key: &str) -> String {
    format!("{}{key}", service_prefix(service))
}

/// Encrypted credential store: raw text persistence + registry + entry codec.
///
/// Writes to the same `(service, key)` are single raw-store calls, so concurrent
/// writers resolve last-writer-wins. Callers needing read-modify-write
/// atomicity must lock per key themselves.
pub struct EntryStore<R: RawStore> {
    raw: R,
    registry: Arc<CipherStorageRegistry>,
    migration_policy: SecurityLevel,
}

impl<R: RawStore> EntryStore<R> {
    pub fn new(raw: R, registry: Arc<CipherStorageRegistry>) -> Self {
        Self {
            raw,
            registry,
            migration_policy: SecurityLevel::Any,
        }
    }

    /// Level entries must meet on read; weaker entries are re-encrypted.
    pub fn with_migration_policy(mut self, policy: SecurityLevel) -> Self {
        self.migration_policy = policy;
        self
    }

    pub fn registry(&self) -> &CipherStorageRegistry {
        &self.registry
    }

    /// Fetch and decrypt the value for `(service, key)`.
    ///
    /// Returns `Ok(None)` when nothing is stored (or the stored text is not an
    /// entry at all). Entries below the migration policy are re-encrypted and
    /// rewritten; a failed rewrite is logged and the value is still returned.
    #[instrument(skip_all, fields(service = %service, key = %key))]
    pub fn get(
        &self,
        service: &str,
        key: &str,
    ) -> Result<Option<DecryptionResult>, KeychainError> {
        let raw_key = entry_key(service, key);
        let Some(persisted) = self.stored_entry(&raw_key)? else {
            return Ok(None);
        };

        let storage = self
            .registry
            .resolve_for_decryption(&persisted.backend_name)?;
        let decrypted = storage.decrypt(service, key, &persisted.payload)?;

        match self.registry.migrate(
            storage.as_ref(),
            service,
            &decrypted,
            self.migration_policy,
        ) {
            Ok(Some(migrated)) => {
                let rewrite = entry::encode(&migrated.storage_name, &migrated.ciphertext)
                    .and_then(|text| self.raw.put_string(&raw_key, &text));
                match rewrite {
                    Ok(()) => debug!(
                        from = storage.name(),
                        to = %migrated.storage_name,
                        "entry migrated"
                    ),
                    Err(err) => warn!(backend = storage.name(), "migration rewrite failed: {err}"),
                }
            }
            Ok(None) => {}
            Err(err) => warn!(backend = storage.name(), "migration skipped: {err}"),
        }

        Ok(Some(decrypted))
    }

    /// Encrypt and store `value`, replacing any existing entry.
    #[instrument(skip_all, fields(service = %service, key = %key, level = %level))]
    pub fn set(
        &self,
        service: &str,
        key: &str,
        value: &str,
        level: SecurityLevel,
    ) -> Result<(), KeychainError> {
        let raw_key = entry_key(service, key);
        let current = match self.stored_entry(&raw_key) {
            Ok(persisted) => persisted.map(|persisted| persisted.backend_name),
            Err(KeychainError::CorruptEntry { reason }) => {
                warn!("overwriting corrupt entry: {reason}");
                None
            }
            Err(err) => return Err(err),
        };

        let storage = self
            .registry
            .select_for_encryption(level, current.as_deref())?;
        let encrypted = storage.encrypt(service, key, value, level)?;
        let text = entry::encode(&encrypted.storage_name, &encrypted.ciphertext)?;
        self.raw.put_string(&raw_key, &text)
    }

    /// Delete the stored entry. Backend key material is left alone; see
    /// [`CipherStorageRegistry::remove_keys`].
    #[instrument(skip_all, fields(service = %service, key = %key))]
    pub fn remove(&self, service: &str, key: &str) -> Result<(), KeychainError> {
        self.raw.remove(&entry_key(service, key))
    }

    /// Delete every entry stored for `service`, then drop the service's key
    /// material. Returns how many entries were removed.
    #[instrument(skip_all, fields(service = %service))]
    pub fn reset_service(&self, service: &str) -> Result<usize, KeychainError> {
        let keys = self.raw.keys_with_prefix(&service_prefix(service))?;
        for raw_key in &keys {
            self.raw.remove(raw_key)?;
        }
        self.registry.remove_keys(service)?;
        debug!(removed = keys.len(), "service reset");
        Ok(keys.len())
    }

    /// True when a decodable entry exists, without decrypting it.
    ///
    /// A corrupt entry is reported as an error, as it is by [`Self::get`].
    pub fn contains(&self, service: &str, key: &str) -> Result<bool, KeychainError> {
        Ok(self.stored_entry(&entry_key(service, key))?.is_some())
    }

    /// Decode the text under `raw_key`. Malformed text reads as absent.
    fn stored_entry(&self, raw_key: &str) -> Result<Option<PersistedEntry>, KeychainError> {
        let Some(text) = self.raw.get_string(raw_key)? else {
            return Ok(None);
        };
        match entry::decode(&text) {
            Ok(persisted) => Ok(Some(persisted)),
            Err(KeychainError::MalformedEntry { reason }) => {
                warn!("ignoring malformed entry: {reason}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
