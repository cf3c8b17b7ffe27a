//! Concrete Strongbox collaborators: key providers, the AES-GCM facility,
//! the built-in cipher storages and a file-backed raw store.
//! Keys come from the OS keyring in production and from memory in tests.

pub mod aes_facility;
pub mod backends;
pub mod file_store;
pub mod key_provider;
