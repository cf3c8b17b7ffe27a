use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use strongbox_core::{error::KeychainError, raw_store::RawStore};
use tempfile::NamedTempFile;
use tracing::instrument;

/// Default namespace directory under the data root.
pub const NAMESPACE: &str = "strongbox-entries";

/// Longest file name common filesystems accept (`NAME_MAX`).
const MAX_FILE_NAME_LEN: usize = 255;

/// Longest raw key whose encoded file name fits in `MAX_FILE_NAME_LEN`.
pub const MAX_KEY_LEN: usize = MAX_FILE_NAME_LEN * 3 / 4;

/// File-backed raw store: one file per key under `root/namespace`.
/// Writes go through a temp file and an atomic rename.
pub struct FileRawStore {
    root: PathBuf,
}

impl FileRawStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self::with_namespace(data_dir, NAMESPACE)
    }

    pub fn with_namespace(data_dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            root: data_dir.as_ref().join(namespace),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, KeychainError> {
        Ok(self.root.join(sanitize_key(key)?))
    }
}

impl RawStore for FileRawStore {
    #[instrument(skip_all)]
    fn get_string(&self, key: &str) -> Result<Option<String>, KeychainError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_err(err)),
        }
    }

    #[instrument(skip_all)]
    fn put_string(&self, key: &str, text: &str) -> Result<(), KeychainError> {
        write_atomic(&self.path_for(key)?, text)
    }

    #[instrument(skip_all)]
    fn remove(&self, key: &str) -> Result<(), KeychainError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }

    #[instrument(skip_all)]
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KeychainError> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_err(err)),
        };

        let mut keys = Vec::new();
        for dir_entry in dir {
            let dir_entry = dir_entry.map_err(storage_err)?;
            // in-flight temp files and strays do not decode to a key
            let Some(key) = dir_entry.file_name().to_str().and_then(restore_key) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn write_atomic(path: &Path, text: &str) -> Result<(), KeychainError> {
    let parent = path.parent().ok_or_else(|| KeychainError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(text.as_bytes()).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn sanitize_key(key: &str) -> Result<String, KeychainError> {
    if key.len() > MAX_KEY_LEN {
        return Err(KeychainError::Storage {
            reason: format!(
                "key is {} bytes; the file store accepts at most {MAX_KEY_LEN}",
                key.len()
            ),
        });
    }
    Ok(URL_SAFE_NO_PAD.encode(key))
}

fn restore_key(file_name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(file_name).ok()?;
    String::from_utf8(bytes).ok()
}

fn storage_err<E: ToString>(err: E) -> KeychainError {
    KeychainError::Storage {
        reason: err.to_string(),
    }
}
