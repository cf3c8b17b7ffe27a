use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use strongbox_core::{
    cipher::{CryptoFacility, Entity},
    error::FacilityError,
    SecurityLevel,
};

use crate::key_provider::{KeyMaterial, KeyProvider};

const NONCE_LEN: usize = 12;

/// AES-256-GCM facility with keys held by a [`KeyProvider`].
///
/// Output is `nonce || ciphertext+tag`. The entity is authenticated as
/// associated data, so a ciphertext only opens for the `(service, key)` it was
/// sealed for.
pub struct AesGcmFacility<P: KeyProvider> {
    key_provider: P,
}

impl<P: KeyProvider> AesGcmFacility<P> {
    pub fn new(key_provider: P) -> Self {
        Self { key_provider }
    }
}

impl<P: KeyProvider> CryptoFacility for AesGcmFacility<P> {
    fn is_available(&self) -> bool {
        self.key_provider.is_available()
    }

    fn security_level(&self) -> SecurityLevel {
        self.key_provider.security_level()
    }

    fn encrypt(
        &self,
        key_alias: &str,
        plaintext: &[u8],
        entity: &Entity,
    ) -> Result<Vec<u8>, FacilityError> {
        let material = self
            .key_provider
            .get_or_create(key_alias)
            .map_err(|e| FacilityError::new(format!("key provider: {e}")))?;
        let cipher = build_cipher(&material)?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: entity.as_bytes(),
                },
            )
            .map_err(|e| FacilityError::new(format!("encrypt failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(
        &self,
        key_alias: &str,
        ciphertext: &[u8],
        entity: &Entity,
    ) -> Result<Vec<u8>, FacilityError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(FacilityError::new("ciphertext too short"));
        }
        let material = self
            .key_provider
            .load(key_alias)
            .map_err(|e| FacilityError::new(format!("key provider: {e}")))?
            .ok_or_else(|| FacilityError::new(format!("no key for {key_alias}")))?;
        let cipher = build_cipher(&material)?;

        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: entity.as_bytes(),
                },
            )
            .map_err(|e| FacilityError::new(format!("decrypt failed: {e}")))
    }

    fn delete_key(&self, key_alias: &str) -> Result<(), FacilityError> {
        self.key_provider
            .delete(key_alias)
            .map_err(|e| FacilityError::new(format!("key provider: {e}")))
    }
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, FacilityError> {
    Aes256Gcm::new_from_slice(&material.bytes)
        .map_err(|e| FacilityError::new(format!("cipher init failed: {e}")))
}
