//! Built-in cipher storages. Each one is an [`AesGcmFacility`] behind a profile;
//! what differs is the guaranteed level, platform gating and key scope.

use strongbox_core::{
    cipher::{BackendProfile, FacilityCipherStorage, KeyScope},
    entry::LEGACY_BACKEND_NAME,
    registry::RegistryBuilder,
    SecurityLevel,
};

use crate::{aes_facility::AesGcmFacility, key_provider::KeyProvider};

/// Legacy backend: one key for every service, so its keys are never removed.
pub const CONCEAL: BackendProfile = BackendProfile {
    name: LEGACY_BACKEND_NAME,
    min_platform_version: 16,
    security_level: SecurityLevel::Any,
    supports_secure_hardware: false,
    key_scope: KeyScope::Shared,
};

/// Per-service keys held by the OS keystore.
pub const KEYSTORE_AES_GCM: BackendProfile = BackendProfile {
    name: "KeystoreAESGCM",
    min_platform_version: 23,
    security_level: SecurityLevel::SecureSoftware,
    supports_secure_hardware: false,
    key_scope: KeyScope::PerService,
};

/// Per-service keys that never leave secure hardware.
pub const STRONGBOX_AES_GCM: BackendProfile = BackendProfile {
    name: "StrongBoxAESGCM",
    min_platform_version: 28,
    security_level: SecurityLevel::SecureHardware,
    supports_secure_hardware: true,
    key_scope: KeyScope::PerService,
};

pub type AesCipherStorage<P> = FacilityCipherStorage<AesGcmFacility<P>>;

pub fn conceal<P: KeyProvider>(key_provider: P) -> AesCipherStorage<P> {
    FacilityCipherStorage::new(CONCEAL, AesGcmFacility::new(key_provider))
}

pub fn keystore<P: KeyProvider>(key_provider: P) -> AesCipherStorage<P> {
    FacilityCipherStorage::new(KEYSTORE_AES_GCM, AesGcmFacility::new(key_provider))
}

pub fn strongbox<P: KeyProvider>(key_provider: P) -> AesCipherStorage<P> {
    FacilityCipherStorage::new(STRONGBOX_AES_GCM, AesGcmFacility::new(key_provider))
}

/// Register the software backends against one key provider. The hardware
/// backend needs its own provider and is added with [`strongbox`].
pub fn register_software<P>(builder: RegistryBuilder, key_provider: P) -> RegistryBuilder
where
    P: KeyProvider + Clone + 'static,
{
    builder
        .register(conceal(key_provider.clone()))
        .register(keystore(key_provider))
}

#[cfg(test)]
mod tests {
    use strongbox_core::{
        error::KeychainError,
        registry::{CipherStorageRegistry, PlatformInfo},
        CipherStorage,
    };

    use super::*;
    use crate::key_provider::InMemoryKeyProvider;

    const MODERN: PlatformInfo = PlatformInfo {
        api_level: 34,
        secure_hardware: true,
    };

    #[test]
    fn effective_level_is_capped_by_key_provider() {
        let weak = keystore(InMemoryKeyProvider::default());
        assert_eq!(weak.security_level(), SecurityLevel::Any);

        let soft = keystore(InMemoryKeyProvider::with_level(SecurityLevel::SecureSoftware));
        assert_eq!(soft.security_level(), SecurityLevel::SecureSoftware);

        // a hardware-grade provider cannot lift the software profile
        let capped = keystore(InMemoryKeyProvider::with_level(SecurityLevel::SecureHardware));
        assert_eq!(capped.security_level(), SecurityLevel::SecureSoftware);
    }

    #[test]
    fn conceal_shares_one_key_and_keeps_it() {
        let provider = InMemoryKeyProvider::default();
        let storage = conceal(provider.clone());
        let a = storage
            .encrypt("svc-a", "k", "va", SecurityLevel::Any)
            .expect("encrypt a");
        storage
            .encrypt("svc-b", "k", "vb", SecurityLevel::Any)
            .expect("encrypt b");
        assert!(provider.contains(LEGACY_BACKEND_NAME));

        storage.remove_key("svc-b").expect("remove");
        let still = storage.decrypt("svc-a", "k", &a.ciphertext).expect("decrypt");
        assert_eq!(still.value, "va");
        assert!(provider.contains(LEGACY_BACKEND_NAME));
    }

    #[test]
    fn keystore_removes_per_service_key() {
        let provider = InMemoryKeyProvider::with_level(SecurityLevel::SecureSoftware);
        let storage = keystore(provider.clone());
        let sealed = storage
            .encrypt("svc", "k", "v", SecurityLevel::SecureSoftware)
            .expect("encrypt");
        assert!(provider.contains("KeystoreAESGCM:svc"));

        storage.remove_key("svc").expect("remove");
        assert!(!provider.contains("KeystoreAESGCM:svc"));
        let err = storage
            .decrypt("svc", "k", &sealed.ciphertext)
            .expect_err("key is gone");
        assert!(matches!(err, KeychainError::CryptoFailed { .. }));
    }

    #[test]
    fn builtin_registry_prefers_hardware_when_present() {
        let software = InMemoryKeyProvider::with_level(SecurityLevel::SecureSoftware);
        let hardware = InMemoryKeyProvider::with_level(SecurityLevel::SecureHardware);
        let registry = register_software(CipherStorageRegistry::builder(MODERN), software)
            .register(strongbox(hardware))
            .build();

        assert_eq!(
            registry.best_security_level(),
            Some(SecurityLevel::SecureHardware)
        );
        let names: Vec<String> = registry.describe().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["StrongBoxAESGCM", "KeystoreAESGCM", "FacebookConceal"]);
    }

    #[test]
    fn hardware_backend_needs_hardware_platform() {
        let no_hardware = PlatformInfo {
            api_level: 34,
            secure_hardware: false,
        };
        let registry = register_software(
            CipherStorageRegistry::builder(no_hardware),
            InMemoryKeyProvider::with_level(SecurityLevel::SecureSoftware),
        )
        .register(strongbox(InMemoryKeyProvider::with_level(
            SecurityLevel::SecureHardware,
        )))
        .build();

        assert_eq!(
            registry.best_security_level(),
            Some(SecurityLevel::SecureSoftware)
        );
        let err = registry
            .select_for_encryption(SecurityLevel::SecureHardware, None)
            .err()
            .expect("no hardware");
        assert!(matches!(err, KeychainError::NoSuitableBackend { .. }));
    }
}
