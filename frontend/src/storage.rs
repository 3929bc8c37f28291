use web_sys::Storage;

use trackitnow::storage::{TokenStorage, TOKEN_KEY};
use trackitnow::StorageError;

/// Keeps the access token in `window.localStorage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTokenStorage;

fn local_storage() -> Result<Storage, StorageError> {
    web_sys::window()
        .ok_or_else(|| StorageError::Unavailable("no window".into()))?
        .local_storage()
        .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?
        .ok_or_else(|| StorageError::Unavailable("localStorage disabled".into()))
}

impl TokenStorage for LocalTokenStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        local_storage()?.get_item(TOKEN_KEY).map_err(|e| StorageError::Io(format!("{e:?}")))
    }

    fn store(&self, token: &str) -> Result<(), StorageError> {
        local_storage()?.set_item(TOKEN_KEY, token).map_err(|e| StorageError::Io(format!("{e:?}")))
    }

    fn clear(&self) -> Result<(), StorageError> {
        local_storage()?.remove_item(TOKEN_KEY).map_err(|e| StorageError::Io(format!("{e:?}")))
    }
}
