//! Core abstractions for Strongbox: security levels, cipher storage contracts,
//! backend selection and the persisted entry format.
//! This crate never touches the OS; concrete facilities live in `strongbox-storage`.

pub mod cipher;
pub mod entry;
pub mod error;
pub mod raw_store;
pub mod registry;
pub mod security;
pub mod store;

pub use cipher::{CipherStorage, DecryptionResult, EncryptionResult};
pub use error::KeychainError;
pub use security::SecurityLevel;
