use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use strongbox_core::{
    registry::{CipherStorageRegistry, PlatformInfo},
    store::EntryStore,
};
use strongbox_storage::{
    backends,
    file_store::FileRawStore,
    key_provider::{KeyProvider, KeyringProvider},
};
use tracing::debug;

pub const DEFAULT_KEYRING_SERVICE: &str = "strongbox";

/// Platform level desktop hosts report; every built-in software backend runs on it.
pub const HOST_API_LEVEL: u32 = 34;

/// Resolve the default data directory for Strongbox.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("strongbox"))
}

/// Desktop hosts have no secure element we can drive, so the hardware backend
/// is never available here.
pub fn platform_from_config(config: &Config) -> PlatformInfo {
    PlatformInfo {
        api_level: config
            .platform
            .as_ref()
            .and_then(|p| p.api_level)
            .unwrap_or(HOST_API_LEVEL),
        secure_hardware: false,
    }
}

/// Build the registry of built-in backends against `key_provider`.
pub fn registry_from_config<P>(config: &Config, key_provider: P) -> CipherStorageRegistry
where
    P: KeyProvider + Clone + 'static,
{
    let platform = platform_from_config(config);
    let builder = config.deprecated_backends.iter().fold(
        CipherStorageRegistry::builder(platform),
        |builder, name| builder.deprecate(name.clone()),
    );
    backends::register_software(builder, key_provider).build()
}

/// Build an entry store from config, with keys held by the OS keychain.
pub fn store_from_config(config: &Config) -> Result<EntryStore<FileRawStore>> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    let service = config
        .keyring_service
        .as_deref()
        .unwrap_or(DEFAULT_KEYRING_SERVICE);
    debug!(?root, service, "initializing entry store");

    let key_provider = Arc::new(KeyringProvider::new(service));
    Ok(assemble(config, root, key_provider))
}

fn assemble<P>(config: &Config, root: PathBuf, key_provider: P) -> EntryStore<FileRawStore>
where
    P: KeyProvider + Clone + 'static,
{
    let registry = registry_from_config(config, key_provider);
    EntryStore::new(FileRawStore::new(root), Arc::new(registry))
        .with_migration_policy(config.migration_policy.unwrap_or_default())
}

/// Helper for tests to construct a store rooted at a temp dir with in-memory keys.
#[cfg(test)]
pub fn test_store(config: &Config, root: impl Into<PathBuf>) -> EntryStore<FileRawStore> {
    use strongbox_core::SecurityLevel;
    use strongbox_storage::key_provider::InMemoryKeyProvider;

    assemble(
        config,
        root.into(),
        InMemoryKeyProvider::with_level(SecurityLevel::SecureSoftware),
    )
}
