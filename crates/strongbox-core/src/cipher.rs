use std::fmt;

use tracing::debug;

use crate::{
    error::{FacilityError, KeychainError},
    security::SecurityLevel,
};

/// Fixed namespace mixed into every entity so ciphertext is bound to this library.
pub const ENTITY_NAMESPACE: &str = "STRONGBOX";

/// Produced by a successful encrypt call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResult {
    /// Key identifier the value was encrypted for.
    pub key: String,
    /// Opaque ciphertext to persist.
    pub ciphertext: Vec<u8>,
    /// Name of the cipher storage that produced the ciphertext.
    pub storage_name: String,
}

/// Produced by a successful decrypt call.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionResult {
    pub key: String,
    pub value: String,
    /// Level actually achieved for this decryption.
    pub security_level: SecurityLevel,
}

impl fmt::Debug for DecryptionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionResult")
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .field("security_level", &self.security_level)
            .finish()
    }
}

/// Whether a backend keeps one key per service or one key for everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// One key shared across all services. Removing it would break every
    /// other service's entries, so `remove_key` is a no-op.
    Shared,
    /// A dedicated key per service.
    PerService,
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScope::Shared => f.pad("shared"),
            KeyScope::PerService => f.pad("per-service"),
        }
    }
}

/// Logical owner of a ciphertext, derived from `(namespace, service, key)`.
/// Decryption must present the same entity that encryption used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity(String);

impl Entity {
    pub fn for_entry(service: &str, key: &str) -> Self {
        // length prefix keeps ("a:b", "c") and ("a", "b:c") apart
        Entity(format!(
            "{ENTITY_NAMESPACE}:{}:{service}:{key}",
            service.len()
        ))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// An encryption backend. Implementations are created once and shared for the
/// process lifetime; they hold no per-call state.
pub trait CipherStorage: Send + Sync {
    /// Stable, unique name persisted next to every ciphertext.
    fn name(&self) -> &str;

    fn min_supported_platform_version(&self) -> u32;

    /// Level this backend guarantees right now.
    fn security_level(&self) -> SecurityLevel;

    fn supports_secure_hardware(&self) -> bool;

    fn key_scope(&self) -> KeyScope;

    /// Encrypt `value` for `(service, key)`. Fails rather than downgrading when
    /// this backend cannot guarantee `requested`.
    fn encrypt(
        &self,
        service: &str,
        key: &str,
        value: &str,
        requested: SecurityLevel,
    ) -> Result<EncryptionResult, KeychainError>;

    /// Decrypt a payload previously produced for the same `(service, key)`.
    fn decrypt(
        &self,
        service: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DecryptionResult, KeychainError>;

    /// Best-effort removal of key material held for `service`.
    /// A no-op for [`KeyScope::Shared`] backends.
    fn remove_key(&self, service: &str) -> Result<(), KeychainError>;
}

/// The native facility a backend wraps: keystore, keyring, secure element.
pub trait CryptoFacility: Send + Sync {
    fn is_available(&self) -> bool;

    /// Level the facility can currently guarantee for its key material.
    fn security_level(&self) -> SecurityLevel;

    fn encrypt(
        &self,
        key_alias: &str,
        plaintext: &[u8],
        entity: &Entity,
    ) -> Result<Vec<u8>, FacilityError>;

    fn decrypt(
        &self,
        key_alias: &str,
        ciphertext: &[u8],
        entity: &Entity,
    ) -> Result<Vec<u8>, FacilityError>;

    fn delete_key(&self, key_alias: &str) -> Result<(), FacilityError>;
}

/// Static description of a backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProfile {
    pub name: &'static str,
    pub min_platform_version: u32,
    pub security_level: SecurityLevel,
    pub supports_secure_hardware: bool,
    pub key_scope: KeyScope,
}

/// A cipher storage built from a profile and the facility it wraps.
pub struct FacilityCipherStorage<F: CryptoFacility> {
    profile: BackendProfile,
    facility: F,
}

impl<F: CryptoFacility> FacilityCipherStorage<F> {
    pub fn new(profile: BackendProfile, facility: F) -> Self {
        Self { profile, facility }
    }

    fn key_alias(&self, service: &str) -> String {
        match self.profile.key_scope {
            KeyScope::Shared => self.profile.name.to_string(),
            KeyScope::PerService => format!("{}:{service}", self.profile.name),
        }
    }

    fn ensure_available(&self) -> Result<(), KeychainError> {
        if self.facility.is_available() {
            Ok(())
        } else {
            Err(KeychainError::CryptoUnavailable {
                backend: self.profile.name.to_string(),
            })
        }
    }
}

impl<F: CryptoFacility> CipherStorage for FacilityCipherStorage<F> {
    fn name(&self) -> &str {
        self.profile.name
    }

    fn min_supported_platform_version(&self) -> u32 {
        self.profile.min_platform_version
    }

    fn security_level(&self) -> SecurityLevel {
        self.profile
            .security_level
            .weakest(self.facility.security_level())
    }

    fn supports_secure_hardware(&self) -> bool {
        self.profile.supports_secure_hardware
    }

    fn key_scope(&self) -> KeyScope {
        self.profile.key_scope
    }

    fn encrypt(
        &self,
        service: &str,
        key: &str,
        value: &str,
        requested: SecurityLevel,
    ) -> Result<EncryptionResult, KeychainError> {
        let actual = self.security_level();
        if !actual.satisfies(requested) {
            return Err(KeychainError::SecurityLevelUnsatisfied {
                backend: self.profile.name.to_string(),
                requested,
                actual,
            });
        }
        self.ensure_available()?;

        let entity = Entity::for_entry(service, key);
        let ciphertext = self
            .facility
            .encrypt(&self.key_alias(service), value.as_bytes(), &entity)
            .map_err(|source| KeychainError::CryptoFailed {
                operation: "encryption",
                service: service.to_string(),
                source,
            })?;

        Ok(EncryptionResult {
            key: key.to_string(),
            ciphertext,
            storage_name: self.profile.name.to_string(),
        })
    }

    fn decrypt(
        &self,
        service: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<DecryptionResult, KeychainError> {
        self.ensure_available()?;

        let entity = Entity::for_entry(service, key);
        let crypto_failed = |source| KeychainError::CryptoFailed {
            operation: "decryption",
            service: service.to_string(),
            source,
        };
        let plaintext = self
            .facility
            .decrypt(&self.key_alias(service), payload, &entity)
            .map_err(crypto_failed)?;
        let value = String::from_utf8(plaintext)
            .map_err(|e| crypto_failed(FacilityError::new(format!("plaintext is not utf-8: {e}"))))?;

        Ok(DecryptionResult {
            key: key.to_string(),
            value,
            security_level: self.security_level(),
        })
    }

    fn remove_key(&self, service: &str) -> Result<(), KeychainError> {
        match self.profile.key_scope {
            KeyScope::Shared => {
                debug!(
                    backend = self.profile.name,
                    service, "shared key kept; other services still depend on it"
                );
                Ok(())
            }
            KeyScope::PerService => self
                .facility
                .delete_key(&self.key_alias(service))
                .map_err(|source| KeychainError::CryptoFailed {
                    operation: "key removal",
                    service: service.to_string(),
                    source,
                }),
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::*;
    use super::*;

    #[test]
    fn round_trip_recovers_value() {
        let storage = storage("Soft", SecurityLevel::SecureSoftware);
        let encrypted = storage
            .encrypt("github", "token", "token-abc", SecurityLevel::Any)
            .expect("encrypt");
        assert_eq!(encrypted.storage_name, "Soft");
        assert_eq!(encrypted.key, "token");

        let decrypted = storage
            .decrypt("github", "token", &encrypted.ciphertext)
            .expect("decrypt");
        assert_eq!(decrypted.value, "token-abc");
        assert_eq!(decrypted.security_level, SecurityLevel::SecureSoftware);
    }

    #[test]
    fn ciphertext_is_bound_to_service() {
        let storage = storage("Soft", SecurityLevel::SecureSoftware);
        let encrypted = storage
            .encrypt("github", "token", "token-abc", SecurityLevel::Any)
            .expect("encrypt");

        let err = storage
            .decrypt("gitlab", "token", &encrypted.ciphertext)
            .expect_err("other service must not decrypt");
        assert!(matches!(
            err,
            KeychainError::CryptoFailed { ref service, .. } if service == "gitlab"
        ));
    }

    #[test]
    fn refuses_to_downgrade() {
        let storage = storage("Weak", SecurityLevel::Any);
        let err = storage
            .encrypt("svc", "k", "v", SecurityLevel::SecureHardware)
            .expect_err("must not downgrade");
        assert_eq!(
            err,
            KeychainError::SecurityLevelUnsatisfied {
                backend: "Weak".into(),
                requested: SecurityLevel::SecureHardware,
                actual: SecurityLevel::Any,
            }
        );
    }

    #[test]
    fn facility_can_degrade_effective_level() {
        let storage = FacilityCipherStorage::new(
            profile("Hw", SecurityLevel::SecureHardware, KeyScope::PerService),
            FakeFacility::new(SecurityLevel::SecureSoftware),
        );
        assert_eq!(storage.security_level(), SecurityLevel::SecureSoftware);
        assert!(storage
            .encrypt("svc", "k", "v", SecurityLevel::SecureHardware)
            .is_err());
    }

    #[test]
    fn unavailable_facility_is_reported() {
        let facility = FakeFacility::new(SecurityLevel::Any);
        facility.available.store(false, Ordering::SeqCst);
        let storage = FacilityCipherStorage::new(
            profile("Off", SecurityLevel::Any, KeyScope::Shared),
            facility,
        );

        let err = storage
            .encrypt("svc", "k", "v", SecurityLevel::Any)
            .expect_err("unavailable");
        assert!(matches!(err, KeychainError::CryptoUnavailable { .. }));
        let err = storage.decrypt("svc", "k", b"x").expect_err("unavailable");
        assert!(matches!(err, KeychainError::CryptoUnavailable { .. }));
    }

    #[test]
    fn shared_key_removal_is_noop() {
        let facility = FakeFacility::new(SecurityLevel::Any);
        let storage = FacilityCipherStorage::new(
            profile("Shared", SecurityLevel::Any, KeyScope::Shared),
            facility.clone(),
        );
        let encrypted = storage
            .encrypt("other", "k", "still-here", SecurityLevel::Any)
            .expect("encrypt");

        storage.remove_key("svc").expect("remove");
        assert!(facility.deleted.lock().expect("lock").is_empty());
        let decrypted = storage
            .decrypt("other", "k", &encrypted.ciphertext)
            .expect("other service still decrypts");
        assert_eq!(decrypted.value, "still-here");
    }

    #[test]
    fn per_service_key_removal_deletes_alias() {
        let facility = FakeFacility::new(SecurityLevel::SecureSoftware);
        let storage = FacilityCipherStorage::new(
            profile("Per", SecurityLevel::SecureSoftware, KeyScope::PerService),
            facility.clone(),
        );
        storage.remove_key("svc").expect("remove");
        assert!(facility.deleted.lock().expect("lock").contains("Per:svc"));
    }

    #[test]
    fn entity_separates_ambiguous_pairs() {
        assert_ne!(Entity::for_entry("a:b", "c"), Entity::for_entry("a", "b:c"));
        assert_eq!(Entity::for_entry("s", "k"), Entity::for_entry("s", "k"));
    }

    #[test]
    fn debug_output_redacts_value() {
        let result = DecryptionResult {
            key: "k".into(),
            value: "hunter2".into(),
            security_level: SecurityLevel::Any,
        };
        assert!(!format!("{result:?}").contains("hunter2"));
    }
}
