//! On-disk entry format: `<backend name>:<base64(ciphertext)>`.
//!
//! Base64 uses the standard alphabet with `=` padding and no line wrapping on
//! write. ASCII whitespace is ignored on read so line-wrapped records from older
//! writers still decode.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::KeychainError;

/// Separates the backend name from the payload. Never valid inside a name.
pub const SEPARATOR: char = ':';

/// Backend assumed for records written before names were persisted.
pub const LEGACY_BACKEND_NAME: &str = "FacebookConceal";

/// A decoded persisted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEntry {
    pub backend_name: String,
    pub payload: Vec<u8>,
}

/// Encode an entry for the raw store.
pub fn encode(backend_name: &str, payload: &[u8]) -> Result<String, KeychainError> {
    if backend_name.is_empty() {
        return Err(KeychainError::MalformedEntry {
            reason: "backend name must not be empty".to_string(),
        });
    }
    if backend_name.contains(SEPARATOR) {
        return Err(KeychainError::MalformedEntry {
            reason: format!("backend name {backend_name:?} contains '{SEPARATOR}'"),
        });
    }
    Ok(format!(
        "{backend_name}{SEPARATOR}{}",
        STANDARD.encode(payload)
    ))
}

/// Decode raw text from the raw store.
///
/// Splits on the first separator only. An empty name, or no separator at all,
/// yields [`LEGACY_BACKEND_NAME`].
pub fn decode(text: &str) -> Result<PersistedEntry, KeychainError> {
    if text.trim().is_empty() {
        return Err(KeychainError::MalformedEntry {
            reason: "empty record".to_string(),
        });
    }

    match text.split_once(SEPARATOR) {
        Some((name, encoded)) => {
            let backend_name = if name.is_empty() {
                LEGACY_BACKEND_NAME
            } else {
                name
            };
            let payload = decode_payload(encoded).map_err(|reason| {
                KeychainError::CorruptEntry { reason }
            })?;
            Ok(PersistedEntry {
                backend_name: backend_name.to_string(),
                payload,
            })
        }
        // bare payload from before names were persisted
        None => {
            let payload = decode_payload(text).map_err(|reason| {
                KeychainError::MalformedEntry { reason }
            })?;
            Ok(PersistedEntry {
                backend_name: LEGACY_BACKEND_NAME.to_string(),
                payload,
            })
        }
    }
}

fn decode_payload(encoded: &str) -> Result<Vec<u8>, String> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| format!("payload is not valid base64: {e}"))
}
