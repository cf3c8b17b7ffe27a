use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::error::KeychainError;

/// Plain string key-value persistence scoped to one namespace.
///
/// Implementations only need read-your-writes within a process; each call is a
/// single write, so concurrent writers to the same key resolve last-writer-wins.
pub trait RawStore: Send + Sync {
    /// Fetch the text stored under `key`, or `None` when absent.
    fn get_string(&self, key: &str) -> Result<Option<String>, KeychainError>;

    /// Store `text` under `key`, replacing any existing value.
    fn put_string(&self, key: &str, text: &str) -> Result<(), KeychainError>;

    /// Remove `key` (idempotent).
    fn remove(&self, key: &str) -> Result<(), KeychainError>;

    /// Every stored key starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KeychainError>;
}

impl<T> RawStore for Arc<T>
where
    T: RawStore + ?Sized,
{
    fn get_string(&self, key: &str) -> Result<Option<String>, KeychainError> {
        (**self).get_string(key)
    }

    fn put_string(&self, key: &str, text: &str) -> Result<(), KeychainError> {
        (**self).put_string(key, text)
    }

    fn remove(&self, key: &str) -> Result<(), KeychainError> {
        (**self).remove(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KeychainError> {
        (**self).keys_with_prefix(prefix)
    }
}

/// In-memory raw store for tests and ephemeral sessions.
/// Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRawStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RawStore for InMemoryRawStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, KeychainError> {
        let map = self.inner.lock().map_err(lock_err)?;
        Ok(map.get(key).cloned())
    }

    fn put_string(&self, key: &str, text: &str) -> Result<(), KeychainError> {
        let mut map = self.inner.lock().map_err(lock_err)?;
        map.insert(key.to_string(), text.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KeychainError> {
        let mut map = self.inner.lock().map_err(lock_err)?;
        map.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KeychainError> {
        let map = self.inner.lock().map_err(lock_err)?;
        let mut keys: Vec<String> = map
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn lock_err<E: std::fmt::Display>(err: E) -> KeychainError {
    KeychainError::Storage {
        reason: format!("lock poisoned: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_overwrites_in_place() {
        let store = InMemoryRawStore::new();
        store.put_string("k", "one").expect("put");
        store.put_string("k", "two").expect("put again");

        assert_eq!(store.get_string("k").expect("get").as_deref(), Some("two"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = InMemoryRawStore::new();
        store.put_string("k", "v").expect("put");
        store.remove("k").expect("remove");
        store.remove("k").expect("remove again");

        assert_eq!(store.get_string("k").expect("get"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn keys_with_prefix_filters_and_sorts() {
        let store = InMemoryRawStore::new();
        store.put_string("b:2", "x").expect("put");
        store.put_string("a:1", "x").expect("put");
        store.put_string("b:1", "x").expect("put");

        assert_eq!(
            store.keys_with_prefix("b:").expect("list"),
            vec!["b:1".to_string(), "b:2".to_string()]
        );
        assert!(store.keys_with_prefix("c:").expect("list").is_empty());
    }

    #[test]
    fn clones_share_state() {
        let store = InMemoryRawStore::new();
        let other = store.clone();
        store.put_string("shared", "yes").expect("put");
        assert_eq!(
            other.get_string("shared").expect("get").as_deref(),
            Some("yes")
        );
    }
}
