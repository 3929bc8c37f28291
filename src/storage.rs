use parking_lot::Mutex;

use crate::errors::StorageError;

/// Key the access token is stored under in every durable backend.
pub const TOKEN_KEY: &str = "access_token";

/// Durable home of the access token. Only login writes it and only logout or an
/// unauthorized response clears it; every authenticated request reads it.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>, StorageError>;

    fn store(&self, token: &str) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;
}

/// Token storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self { slot: Mutex::new(Some(token.into())) }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.slot.lock().clone())
    }

    fn store(&self, token: &str) -> Result<(), StorageError> {
        *self.slot.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.slot.lock() = None;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileTokenStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use serde_json::{Map, Value};
    use tracing::debug;

    use super::{TokenStorage, TOKEN_KEY};
    use crate::errors::StorageError;

    const FILE_NAME: &str = "session.json";

    /// JSON key/value file (`<dir>/session.json`) holding the token under
    /// [`TOKEN_KEY`]. Unknown keys are preserved on write.
    #[derive(Debug, Clone)]
    pub struct FileTokenStorage {
        path: PathBuf,
    }

    impl FileTokenStorage {
        pub fn new(dir: impl AsRef<Path>) -> Self {
            Self { path: dir.as_ref().join(FILE_NAME) }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn read_map(&self) -> Result<Map<String, Value>, StorageError> {
            let raw = match fs::read_to_string(&self.path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
                Err(e) => return Err(StorageError::Io(e.to_string())),
            };
            if raw.trim().is_empty() {
                return Ok(Map::new());
            }
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err(StorageError::Corrupt(format!("{} is not a JSON object", self.path.display()))),
                Err(e) => Err(StorageError::Corrupt(e.to_string())),
            }
        }

        fn write_map(&self, map: &Map<String, Value>) -> Result<(), StorageError> {
            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir).map_err(|e| StorageError::Io(e.to_string()))?;
            }
            let raw = serde_json::to_string_pretty(map).map_err(|e| StorageError::Corrupt(e.to_string()))?;
            fs::write(&self.path, raw).map_err(|e| StorageError::Io(e.to_string()))
        }
    }

    impl TokenStorage for FileTokenStorage {
        fn load(&self) -> Result<Option<String>, StorageError> {
            Ok(self
                .read_map()?
                .get(TOKEN_KEY)
                .and_then(Value::as_str)
                .map(str::to_string))
        }

        fn store(&self, token: &str) -> Result<(), StorageError> {
            let mut map = self.read_map().unwrap_or_default();
            map.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
            self.write_map(&map)?;
            debug!("Stored access token in {}", self.path.display());
            Ok(())
        }

        fn clear(&self) -> Result<(), StorageError> {
            if !self.path.exists() {
                return Ok(());
            }
            // A corrupt file is replaced by an empty object rather than left behind.
            let (mut map, corrupt) = match self.read_map() {
                Ok(map) => (map, false),
                Err(StorageError::Corrupt(_)) => (Map::new(), true),
                Err(e) => return Err(e),
            };
            if map.remove(TOKEN_KEY).is_some() || corrupt {
                self.write_map(&map)?;
            }
            Ok(())
        }
    }
}
