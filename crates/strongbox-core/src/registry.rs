use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    cipher::{CipherStorage, DecryptionResult, EncryptionResult, KeyScope},
    entry::LEGACY_BACKEND_NAME,
    error::KeychainError,
    security::SecurityLevel,
};

/// Facts about the host that gate which backends can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub api_level: u32,
    pub secure_hardware: bool,
}

impl PlatformInfo {
    fn supports(&self, storage: &dyn CipherStorage) -> bool {
        storage.min_supported_platform_version() <= self.api_level
            && (!storage.supports_secure_hardware() || self.secure_hardware)
    }
}

/// One row of [`CipherStorageRegistry::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    pub name: String,
    pub security_level: SecurityLevel,
    pub supports_secure_hardware: bool,
    pub min_platform_version: u32,
    #[serde(serialize_with = "serialize_scope")]
    pub key_scope: KeyScope,
    pub available: bool,
    pub deprecated: bool,
}

fn serialize_scope<S: serde::Serializer>(scope: &KeyScope, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(scope)
}

struct Registered {
    storage: Arc<dyn CipherStorage>,
    available: bool,
}

/// Collects backends before the registry is frozen.
pub struct RegistryBuilder {
    platform: PlatformInfo,
    storages: Vec<Arc<dyn CipherStorage>>,
    deprecated: HashSet<String>,
}

impl RegistryBuilder {
    pub fn register(self, storage: impl CipherStorage + 'static) -> Self {
        self.register_arc(Arc::new(storage))
    }

    pub fn register_arc(mut self, storage: Arc<dyn CipherStorage>) -> Self {
        if self.storages.iter().any(|s| s.name() == storage.name()) {
            warn!(backend = storage.name(), "duplicate cipher storage ignored");
            return self;
        }
        self.storages.push(storage);
        self
    }

    /// Entries written by a deprecated backend migrate on their next read,
    /// and the backend is never chosen for new writes.
    pub fn deprecate(mut self, name: impl Into<String>) -> Self {
        self.deprecated.insert(name.into());
        self
    }

    pub fn build(self) -> CipherStorageRegistry {
        let platform = self.platform;
        let mut entries: Vec<Registered> = self
            .storages
            .into_iter()
            .map(|storage| {
                let available = platform.supports(storage.as_ref());
                if !available {
                    debug!(
                        backend = storage.name(),
                        min_platform = storage.min_supported_platform_version(),
                        hardware = storage.supports_secure_hardware(),
                        "cipher storage unavailable on this platform"
                    );
                }
                Registered { storage, available }
            })
            .collect();
        // strongest first; registration order breaks ties
        entries.sort_by(|a, b| {
            b.storage
                .security_level()
                .cmp(&a.storage.security_level())
        });

        CipherStorageRegistry {
            entries,
            deprecated: self.deprecated,
        }
    }
}

/// Ordered set of cipher storages with selection and migration policy.
pub struct CipherStorageRegistry {
    entries: Vec<Registered>,
    deprecated: HashSet<String>,
}

impl CipherStorageRegistry {
    pub fn builder(platform: PlatformInfo) -> RegistryBuilder {
        RegistryBuilder {
            platform,
            storages: Vec::new(),
            deprecated: HashSet::new(),
        }
    }

    pub fn is_deprecated(&self, name: &str) -> bool {
        self.deprecated.contains(name)
    }

    fn available(&self) -> impl Iterator<Item = &Arc<dyn CipherStorage>> {
        self.entries
            .iter()
            .filter(|entry| entry.available)
            .map(|entry| &entry.storage)
    }

    /// Strongest level any available backend guarantees right now.
    pub fn best_security_level(&self) -> Option<SecurityLevel> {
        self.available().map(|s| s.security_level()).max()
    }

    /// Pick the backend for a write at `requested`.
    ///
    /// Only the strongest satisfying level is considered. Among backends at that
    /// level, `current` (the backend that wrote the existing entry) wins so an
    /// unchanged entry is not moved; otherwise registration order decides.
    pub fn select_for_encryption(
        &self,
        requested: SecurityLevel,
        current: Option<&str>,
    ) -> Result<Arc<dyn CipherStorage>, KeychainError> {
        let candidates: Vec<&Arc<dyn CipherStorage>> = self
            .available()
            .filter(|s| !self.is_deprecated(s.name()))
            .filter(|s| s.security_level().satisfies(requested))
            .collect();

        let strongest = candidates
            .iter()
            .map(|s| s.security_level())
            .max()
            .ok_or(KeychainError::NoSuitableBackend { requested })?;
        let mut top = candidates
            .into_iter()
            .filter(|s| s.security_level() == strongest);

        let chosen = match current {
            Some(name) => {
                let top: Vec<_> = top.collect();
                top.iter()
                    .find(|s| s.name() == name)
                    .or_else(|| top.first())
                    .map(|s| Arc::clone(*s))
            }
            None => top.next().map(Arc::clone),
        }
        .ok_or(KeychainError::NoSuitableBackend { requested })?;

        debug!(backend = chosen.name(), %requested, "selected cipher storage");
        Ok(chosen)
    }

    /// Exact lookup of the backend that wrote an entry. An empty name means
    /// the legacy backend.
    pub fn resolve_for_decryption(
        &self,
        name: &str,
    ) -> Result<Arc<dyn CipherStorage>, KeychainError> {
        let name = if name.is_empty() {
            LEGACY_BACKEND_NAME
        } else {
            name
        };
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.storage.name() == name)
            .ok_or_else(|| KeychainError::UnknownBackend {
                name: name.to_string(),
            })?;
        if !entry.available {
            return Err(KeychainError::CryptoUnavailable {
                backend: name.to_string(),
            });
        }
        Ok(Arc::clone(&entry.storage))
    }

    /// Whether an entry written by `from` should be re-encrypted under `policy`.
    pub fn needs_migration(&self, from: &dyn CipherStorage, policy: SecurityLevel) -> bool {
        !from.security_level().satisfies(policy) || self.is_deprecated(from.name())
    }

    /// Re-encrypt a freshly decrypted value with the backend `policy` selects.
    ///
    /// Returns `None` when no migration is needed or the selection lands on the
    /// same backend. The caller persists the returned result.
    pub fn migrate(
        &self,
        from: &dyn CipherStorage,
        service: &str,
        decrypted: &DecryptionResult,
        policy: SecurityLevel,
    ) -> Result<Option<EncryptionResult>, KeychainError> {
        if !self.needs_migration(from, policy) {
            return Ok(None);
        }
        let target = self.select_for_encryption(policy, Some(from.name()))?;
        if target.name() == from.name() {
            return Ok(None);
        }

        debug!(from = from.name(), to = target.name(), service, "migrating entry");
        target
            .encrypt(service, &decrypted.key, &decrypted.value, policy)
            .map(Some)
    }

    /// Drop key material for `service` from every available backend.
    /// Shared-key backends keep their key. All backends are attempted; the
    /// first failure is returned.
    pub fn remove_keys(&self, service: &str) -> Result<(), KeychainError> {
        let mut first_err = None;
        for storage in self.available() {
            if let Err(err) = storage.remove_key(service) {
                warn!(backend = storage.name(), service, "key removal failed: {err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Introspection rows in preference order.
    pub fn describe(&self) -> Vec<BackendDescriptor> {
        self.entries
            .iter()
            .map(|entry| BackendDescriptor {
                name: entry.storage.name().to_string(),
                security_level: entry.storage.security_level(),
                supports_secure_hardware: entry.storage.supports_secure_hardware(),
                min_platform_version: entry.storage.min_supported_platform_version(),
                key_scope: entry.storage.key_scope(),
                available: entry.available,
                deprecated: self.is_deprecated(entry.storage.name()),
            })
            .collect()
    }
}
