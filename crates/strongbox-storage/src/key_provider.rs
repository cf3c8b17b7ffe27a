use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use strongbox_core::SecurityLevel;
use thiserror::Error;

/// Key material used by a cipher facility.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Alias the key is stored under (never log key bytes).
    pub alias: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Holds symmetric keys by alias (OS keychain in production; memory in tests).
pub trait KeyProvider: Send + Sync {
    fn load(&self, alias: &str) -> Result<Option<KeyMaterial>, KeyError>;

    fn store(&self, material: &KeyMaterial) -> Result<(), KeyError>;

    /// Remove the key for `alias` (idempotent).
    fn delete(&self, alias: &str) -> Result<(), KeyError>;

    /// Protection the provider gives its keys.
    fn security_level(&self) -> SecurityLevel;

    fn is_available(&self) -> bool {
        true
    }

    fn get_or_create(&self, alias: &str) -> Result<KeyMaterial, KeyError> {
        if let Some(existing) = self.load(alias)? {
            return Ok(existing);
        }
        let material = generate_key(alias);
        self.store(&material)?;
        Ok(material)
    }
}

impl<T> KeyProvider for Arc<T>
where
    T: KeyProvider + ?Sized,
{
    fn load(&self, alias: &str) -> Result<Option<KeyMaterial>, KeyError> {
        (**self).load(alias)
    }

    fn store(&self, material: &KeyMaterial) -> Result<(), KeyError> {
        (**self).store(material)
    }

    fn delete(&self, alias: &str) -> Result<(), KeyError> {
        (**self).delete(alias)
    }

    fn security_level(&self) -> SecurityLevel {
        (**self).security_level()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn get_or_create(&self, alias: &str) -> Result<KeyMaterial, KeyError> {
        (**self).get_or_create(alias)
    }
}

/// OS keyring-backed provider. Uses the `keyring` crate; the alias is the account.
pub struct KeyringProvider {
    service: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, alias: &str) -> Result<keyring::Entry, KeyError> {
        keyring::Entry::new(&self.service, alias).map_err(|e| KeyError::Keyring(e.to_string()))
    }
}

impl KeyProvider for KeyringProvider {
    fn load(&self, alias: &str) -> Result<Option<KeyMaterial>, KeyError> {
        match self.entry(alias)?.get_password() {
            Ok(secret) => decode_key(alias, &secret).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }

    fn store(&self, material: &KeyMaterial) -> Result<(), KeyError> {
        self.entry(&material.alias)?
            .set_password(&encode_key(material))
            .map_err(|e| KeyError::Keyring(e.to_string()))
    }

    fn delete(&self, alias: &str) -> Result<(), KeyError> {
        match self.entry(alias)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::SecureSoftware
    }

    fn is_available(&self) -> bool {
        keyring::Entry::new(&self.service, "availability-probe").is_ok()
    }
}

/// In-memory key provider for tests and ephemeral sessions.
/// Clones share the same keys.
#[derive(Debug, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<HashMap<String, KeyMaterial>>>,
    level: SecurityLevel,
}

impl Default for InMemoryKeyProvider {
    fn default() -> Self {
        Self::with_level(SecurityLevel::Any)
    }
}

impl InMemoryKeyProvider {
    /// Report `level` for the keys held here (useful to simulate secure hardware).
    pub fn with_level(level: SecurityLevel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            level,
        }
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.inner
            .lock()
            .map(|map| map.contains_key(alias))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, KeyMaterial>>, KeyError> {
        self.inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn load(&self, alias: &str) -> Result<Option<KeyMaterial>, KeyError> {
        Ok(self.lock()?.get(alias).cloned())
    }

    fn store(&self, material: &KeyMaterial) -> Result<(), KeyError> {
        self.lock()?
            .insert(material.alias.clone(), material.clone());
        Ok(())
    }

    fn delete(&self, alias: &str) -> Result<(), KeyError> {
        self.lock()?.remove(alias);
        Ok(())
    }

    fn security_level(&self) -> SecurityLevel {
        self.level
    }

    fn get_or_create(&self, alias: &str) -> Result<KeyMaterial, KeyError> {
        let mut guard = self.lock()?;
        let material = guard
            .entry(alias.to_string())
            .or_insert_with(|| generate_key(alias));
        Ok(material.clone())
    }
}

fn generate_key(alias: &str) -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        alias: alias.to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(alias: &str, secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != 32 {
        return Err(KeyError::Decode(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial {
        alias: alias.to_string(),
        bytes: out,
    })
}
